//! Risk Simulation
//!
//! Drives repeated stochastic realisations of a disaster over a shared
//! [`RoadNetwork`](road_network::RoadNetwork) and averages per-settlement
//! metrics into a vulnerability score.

use thiserror::Error;

pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod simulator;

pub use config::RiskConfig;
pub use metrics::{HubConnectivity, Metric, NodeDegree};
pub use orchestrator::{CityRisk, RiskOrchestrator};
pub use simulator::{
    MetricMeans, MonteCarloSimulator, SimulationResult, SimulatorState, TrialOutcome,
};

/// Simulation errors
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Hazard error: {0}")]
    Hazard(#[from] hazard::HazardError),
    #[error("Network error: {0}")]
    Network(#[from] road_network::NetworkError),
    #[error("Simulator not prepared")]
    NotPrepared,
    /// `completed` counts trials that finished before the run stopped
    #[error("Simulation cancelled after {completed} of {requested} trials")]
    Cancelled { completed: usize, requested: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
