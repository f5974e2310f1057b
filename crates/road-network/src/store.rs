//! Artifact persistence and the resumable build pipeline

use crate::raw::RawNetwork;
use crate::routes::{RouteIndex, RouteIndexRecord};
use crate::segment::SegmentGraph;
use crate::settlement::{SettlementBuilder, SettlementGraph, DEFAULT_PERIMETER_KM};
use crate::tiles::{TileIndex, DEFAULT_TILE_SIZE_DEG};
use crate::{NetworkError, Result, RoadNetwork};
use chrono::{DateTime, Utc};
use geo_location::EARTH_RADIUS_KM;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Named build outputs, in build order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Segments,
    Tiles,
    Settlements,
    Routes,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Segments,
        Artifact::Tiles,
        Artifact::Settlements,
        Artifact::Routes,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Segments => "segments.json",
            Artifact::Tiles => "tiles.json",
            Artifact::Settlements => "settlements.json",
            Artifact::Routes => "routes.json",
        }
    }
}

/// One manifest line per written artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub items: usize,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: BTreeMap<Artifact, ManifestEntry>,
}

/// Directory of JSON artifacts plus `manifest.json`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) an artifact directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    /// Write through a temporary file so a crash never leaves half an artifact
    pub fn save<T: Serialize>(&self, artifact: Artifact, value: &T, items: usize) -> Result<()> {
        let path = self.path(artifact);
        write_atomic(&path, value)?;

        let mut manifest = self.manifest()?;
        manifest.artifacts.insert(
            artifact,
            ManifestEntry {
                file: artifact.file_name().to_string(),
                items,
                written_at: Utc::now(),
            },
        );
        write_atomic(&self.dir.join(MANIFEST_FILE), &manifest)?;

        info!("Saved {} ({} items)", path.display(), items);
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<T> {
        let path = self.path(artifact);
        if !path.is_file() {
            return Err(NetworkError::MissingArtifact(path.display().to_string()));
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Current manifest; empty when nothing has been written yet
    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(Manifest::default());
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Build parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub perimeter_km: f64,
    pub tile_size_deg: f64,
    pub contract_chains: bool,
    pub earth_radius_km: f64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            perimeter_km: DEFAULT_PERIMETER_KM,
            tile_size_deg: DEFAULT_TILE_SIZE_DEG,
            contract_chains: true,
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }
}

impl BuildConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn builder(&self) -> SettlementBuilder {
        SettlementBuilder {
            perimeter_km: self.perimeter_km,
            earth_radius_km: self.earth_radius_km,
            contract_chains: self.contract_chains,
        }
    }
}

/// Resumable build: each step runs only when its artifact is missing.
///
/// Segments and tiles are built from raw data. Settlements also rewrite
/// the segment artifact, since claiming flags absorbed nodes.
pub struct BuildPipeline<'s> {
    store: &'s ArtifactStore,
    config: BuildConfig,
}

impl<'s> BuildPipeline<'s> {
    pub fn new(store: &'s ArtifactStore, config: BuildConfig) -> Self {
        Self { store, config }
    }

    /// Run every missing step; `raw` is only called if a step needs it
    pub fn run<F>(&self, raw: F) -> Result<RoadNetwork>
    where
        F: FnOnce() -> Result<RawNetwork>,
    {
        let mut raw = LazyRaw::new(raw);

        let segments: SegmentGraph = if self.store.exists(Artifact::Segments) {
            info!("Reusing segment graph");
            self.store.load(Artifact::Segments)?
        } else {
            info!("Building segment graph");
            let graph = raw.get()?.segment_graph()?;
            self.store.save(Artifact::Segments, &graph, graph.node_count())?;
            graph
        };

        let tiles: TileIndex = if self.store.exists(Artifact::Tiles) {
            info!("Reusing tile index");
            self.store.load(Artifact::Tiles)?
        } else {
            info!("Building tile index");
            let tiles = TileIndex::build(&segments, self.config.tile_size_deg)?;
            self.store.save(Artifact::Tiles, &tiles, tiles.len())?;
            tiles
        };

        let (segments, settlements): (SegmentGraph, SettlementGraph) =
            if self.store.exists(Artifact::Settlements) {
                info!("Reusing settlement graph");
                (segments, self.store.load(Artifact::Settlements)?)
            } else {
                info!("Building settlement graph");
                let sites = raw.get()?.settlement_sites()?;
                let build = self.config.builder().build(&sites, segments, &tiles)?;
                self.store
                    .save(Artifact::Segments, &build.segments, build.segments.node_count())?;
                self.store.save(
                    Artifact::Settlements,
                    &build.settlements,
                    build.settlements.node_count(),
                )?;
                (build.segments, build.settlements)
            };

        let routes = if self.store.exists(Artifact::Routes) {
            info!("Reusing route index");
            let record: RouteIndexRecord = self.store.load(Artifact::Routes)?;
            RouteIndex::from_record(&settlements, record)?
        } else {
            info!("Building route index");
            let routes = RouteIndex::build(&segments, &settlements);
            self.store.save(Artifact::Routes, &routes.to_record(), routes.len())?;
            routes
        };

        let network = RoadNetwork::with_routes(segments, tiles, settlements, routes);
        let stats = network.stats();
        info!(
            "Network ready: {} road nodes, {} tiles, {} settlements, {} routes",
            stats.segment_nodes, stats.tiles, stats.settlements, stats.settlement_edges
        );
        Ok(network)
    }
}

/// Raw data loaded at most once, on first use
struct LazyRaw<F> {
    loader: Option<F>,
    value: Option<RawNetwork>,
}

impl<F: FnOnce() -> Result<RawNetwork>> LazyRaw<F> {
    fn new(loader: F) -> Self {
        Self {
            loader: Some(loader),
            value: None,
        }
    }

    fn get(&mut self) -> Result<&RawNetwork> {
        if self.value.is_none() {
            let loader = self.loader.take().ok_or_else(|| {
                NetworkError::MalformedInput("raw network loader already failed".to_string())
            })?;
            self.value = Some(loader()?);
        }
        self.value
            .as_ref()
            .ok_or_else(|| NetworkError::MalformedInput("raw network unavailable".to_string()))
    }
}

impl RoadNetwork {
    /// Load a fully built network; every artifact must be present except
    /// the route index, which is recomputed and saved when missing
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let segments: SegmentGraph = store.load(Artifact::Segments)?;
        let tiles: TileIndex = store.load(Artifact::Tiles)?;
        let settlements: SettlementGraph = store.load(Artifact::Settlements)?;

        if !store.exists(Artifact::Routes) {
            warn!("Route index missing, rebuilding from the segment graph");
            let network = RoadNetwork::new(segments, tiles, settlements);
            let routes = network.routes();
            store.save(Artifact::Routes, &routes.to_record(), routes.len())?;
            return Ok(network);
        }
        let record: RouteIndexRecord = store.load(Artifact::Routes)?;
        let routes = RouteIndex::from_record(&settlements, record)?;
        Ok(RoadNetwork::with_routes(segments, tiles, settlements, routes))
    }
}
