//! Road Risk CLI
//!
//! Builds the road network artifacts from raw data and scores settlements
//! against a disaster.
//!
//! Usage:
//!   road-risk build --raw data/raw --artifacts data/artifacts
//!   road-risk simulate --artifacts data/artifacts --request quake.json
//!   road-risk stats --artifacts data/artifacts

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hazard::DisasterRequest;
use risk_sim::{RiskConfig, RiskOrchestrator};
use road_network::{ArtifactStore, BuildConfig, BuildPipeline, RawNetwork, RoadNetwork};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "road-risk", about = "Disaster risk over road networks")]
struct Args {
    /// Debug logging for the workspace crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build (or resume building) the network artifacts
    Build {
        /// Directory holding settlements.json, waypoints.json and roads.json
        #[arg(short, long)]
        raw: PathBuf,

        /// Artifact directory
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Build configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Settlement perimeter in km
        #[arg(long)]
        perimeter_km: Option<f64>,

        /// Tile edge in degrees
        #[arg(long)]
        tile_size_deg: Option<f64>,

        /// Skip chain contraction before route search
        #[arg(long)]
        no_contract: bool,
    },

    /// Score every settlement against a disaster request
    Simulate {
        /// Artifact directory
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Disaster request JSON, `-` for stdin
        #[arg(short, long)]
        request: PathBuf,

        /// Risk configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of trials
        #[arg(short, long)]
        trials: Option<usize>,

        /// Run trials on all cores
        #[arg(long)]
        parallel: bool,

        /// Output file, stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarise the built network
    Stats {
        /// Artifact directory
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "road_risk=debug,road_network=debug,risk_sim=debug,info"
    } else {
        "road_risk=info,info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match args.command {
        Command::Build {
            raw,
            artifacts,
            config,
            perimeter_km,
            tile_size_deg,
            no_contract,
        } => {
            let mut config = match config {
                Some(path) => BuildConfig::from_file(&path)
                    .with_context(|| format!("reading build config {}", path.display()))?,
                None => BuildConfig::default(),
            };
            if let Some(km) = perimeter_km {
                config.perimeter_km = km;
            }
            if let Some(deg) = tile_size_deg {
                config.tile_size_deg = deg;
            }
            if no_contract {
                config.contract_chains = false;
            }
            build(&raw, &artifacts, config)
        }
        Command::Simulate {
            artifacts,
            request,
            config,
            trials,
            parallel,
            output,
        } => {
            let mut config = match config {
                Some(path) => RiskConfig::from_file(&path)
                    .with_context(|| format!("reading risk config {}", path.display()))?,
                None => RiskConfig::default(),
            };
            if let Some(trials) = trials {
                config.trials = trials;
            }
            config.parallel |= parallel;
            simulate(&artifacts, &request, config, output.as_deref())
        }
        Command::Stats { artifacts } => stats(&artifacts),
    }
}

fn open_store(dir: &Path) -> Result<ArtifactStore> {
    ArtifactStore::open(dir).with_context(|| format!("opening artifact directory {}", dir.display()))
}

fn build(raw: &Path, artifacts: &Path, config: BuildConfig) -> Result<()> {
    let store = open_store(artifacts)?;
    info!("Building network from {} into {}", raw.display(), artifacts.display());

    let network = BuildPipeline::new(&store, config)
        .run(|| RawNetwork::load(raw))
        .with_context(|| format!("building network from {}", raw.display()))?;

    let stats = network.stats();
    info!(
        "Network ready: {} settlements, {} routes, {} isolated",
        stats.settlements, stats.settlement_edges, stats.isolated_settlements
    );
    Ok(())
}

fn simulate(artifacts: &Path, request: &Path, config: RiskConfig, output: Option<&Path>) -> Result<()> {
    let request: DisasterRequest = if request == Path::new("-") {
        serde_json::from_reader(io::stdin().lock()).context("parsing disaster request from stdin")?
    } else {
        let file = File::open(request)
            .with_context(|| format!("opening disaster request {}", request.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing disaster request {}", request.display()))?
    };

    let store = open_store(artifacts)?;
    let network = RoadNetwork::load(&store)
        .with_context(|| format!("loading network from {}", artifacts.display()))?;

    let orchestrator = RiskOrchestrator::new(Arc::new(network), config)?;
    let risks = orchestrator.get_risk_metric_for_cities(request)?;
    info!("Scored {} settlements", risks.len());

    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &risks)?;
            writer.flush()?;
            info!("Wrote risks to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &risks)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn stats(artifacts: &Path) -> Result<()> {
    let store = open_store(artifacts)?;
    let manifest = store.manifest()?;
    let network = RoadNetwork::load(&store)
        .with_context(|| format!("loading network from {}", artifacts.display()))?;

    let summary = serde_json::json!({
        "network": network.stats(),
        "manifest": manifest,
    });
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &summary)?;
    writeln!(stdout)?;
    Ok(())
}
