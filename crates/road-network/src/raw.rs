//! Raw network data loading from JSON files

use crate::segment::{SegmentEdge, SegmentGraph, SegmentNode};
use crate::settlement::SettlementSite;
use crate::{NetworkError, Result, SegmentNodeId, SettlementId};
use geo_location::GeoLocation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub const SETTLEMENTS_FILE: &str = "settlements.json";
pub const WAYPOINTS_FILE: &str = "waypoints.json";
pub const ROADS_FILE: &str = "roads.json";

/// Waypoint ids show up as strings or integers depending on the export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl From<&RawId> for SegmentNodeId {
    fn from(raw: &RawId) -> Self {
        match raw {
            RawId::Number(n) => SegmentNodeId::new(n.to_string()),
            RawId::Text(s) => SegmentNodeId::new(s.clone()),
        }
    }
}

/// Raw settlement from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSettlement {
    pub id: u64,
    #[serde(alias = "city")]
    pub name: String,
    pub population: u64,
    pub lat: f64,
    pub lng: f64,
}

/// Raw road waypoint from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWaypoint {
    pub id: RawId,
    pub lat: f64,
    pub lng: f64,
}

/// Raw road segment from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRoadEdge {
    pub from_id: RawId,
    pub to_id: RawId,
    pub length: f64,
}

/// Everything the build pipeline starts from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNetwork {
    pub settlements: Vec<RawSettlement>,
    pub waypoints: Vec<RawWaypoint>,
    pub roads: Vec<RawRoadEdge>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    info!("Loading {:?}", path);
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| NetworkError::MalformedInput(format!("{}: {}", path.display(), e)))
}

impl RawNetwork {
    /// Load `settlements.json`, `waypoints.json` and `roads.json` from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let network = Self {
            settlements: read_json(&dir.join(SETTLEMENTS_FILE))?,
            waypoints: read_json(&dir.join(WAYPOINTS_FILE))?,
            roads: read_json(&dir.join(ROADS_FILE))?,
        };
        info!(
            "Loaded {} settlements, {} waypoints, {} roads",
            network.settlements.len(),
            network.waypoints.len(),
            network.roads.len()
        );
        Ok(network)
    }

    /// Validated segment graph; fails on the first bad record
    pub fn segment_graph(&self) -> Result<SegmentGraph> {
        let nodes = self
            .waypoints
            .iter()
            .map(|w| {
                let id = SegmentNodeId::from(&w.id);
                let position = GeoLocation::new(w.lat, w.lng)
                    .map_err(|e| NetworkError::MalformedInput(format!("waypoint {}: {}", id, e)))?;
                Ok(SegmentNode::new(id, position))
            })
            .collect::<Result<Vec<_>>>()?;

        let edges = self
            .roads
            .iter()
            .map(|r| SegmentEdge::new(SegmentNodeId::from(&r.from_id), SegmentNodeId::from(&r.to_id), r.length))
            .collect();

        SegmentGraph::build(nodes, edges)
    }

    /// Validated settlement records; ids must be unique
    pub fn settlement_sites(&self) -> Result<Vec<SettlementSite>> {
        let mut seen = HashSet::new();
        self.settlements
            .iter()
            .map(|s| {
                if !seen.insert(s.id) {
                    return Err(NetworkError::MalformedInput(format!(
                        "duplicate settlement id {}",
                        s.id
                    )));
                }
                let position = GeoLocation::new(s.lat, s.lng).map_err(|e| {
                    NetworkError::MalformedInput(format!("settlement {}: {}", s.id, e))
                })?;
                Ok(SettlementSite {
                    id: SettlementId(s.id),
                    name: s.name.clone(),
                    population: s.population,
                    position,
                })
            })
            .collect()
    }
}
