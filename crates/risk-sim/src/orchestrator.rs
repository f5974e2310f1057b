//! Per-city vulnerability for a single disaster request

use crate::config::RiskConfig;
use crate::metrics::Metric;
use crate::simulator::{MonteCarloSimulator, SimulationResult};
use crate::Result;
use geo_location::GeoLocation;
use hazard::{Disaster, DisasterRequest, GaussianEarthquake};
use road_network::RoadNetwork;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Epicentre of the zero-intensity baseline quake
pub const BASELINE_LAT: f64 = 34.049245940;
pub const BASELINE_LON: f64 = -118.223876950;

/// Risk of one settlement, in settlement node order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRisk {
    pub city: String,
    pub population: u64,
    pub lat: f64,
    pub lng: f64,
    /// `100 · (1 − mean hub connectivity)`
    pub vulnerability: f64,
    /// The same score with no disaster at all
    pub baseline_vulnerability: f64,
}

pub struct RiskOrchestrator {
    network: Arc<RoadNetwork>,
    config: RiskConfig,
    baseline: Vec<f64>,
}

impl RiskOrchestrator {
    /// Computes the no-disaster baseline up front
    pub fn new(network: Arc<RoadNetwork>, config: RiskConfig) -> Result<Self> {
        let quake = GaussianEarthquake::new(GeoLocation::saturating(BASELINE_LAT, BASELINE_LON), 10.0, 0.0);
        let mut orchestrator = Self {
            network,
            config,
            baseline: Vec::new(),
        };
        let result = orchestrator.simulate(Disaster::Earthquake(quake), 1)?;
        orchestrator.baseline = vulnerability(&result);
        info!(
            "Baseline computed for {} settlements",
            orchestrator.baseline.len()
        );
        Ok(orchestrator)
    }

    pub fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    /// Simulate `request` and score every settlement
    pub fn get_risk_metric_for_cities(&self, request: DisasterRequest) -> Result<Vec<CityRisk>> {
        let disaster = request.into_disaster()?;
        info!("Simulating {} over {} trials", disaster.kind(), self.config.trials);

        let result = self.simulate(disaster, self.config.trials)?;
        let scores = vulnerability(&result);

        Ok(self
            .network
            .settlements()
            .nodes()
            .zip(scores)
            .zip(&self.baseline)
            .map(|((node, vulnerability), baseline)| CityRisk {
                city: node.name.clone(),
                population: node.population,
                lat: node.position.latitude(),
                lng: node.position.longitude(),
                vulnerability,
                baseline_vulnerability: *baseline,
            })
            .collect())
    }

    fn simulate(&self, disaster: Disaster, trials: usize) -> Result<SimulationResult> {
        let metrics: Vec<Box<dyn Metric>> = vec![Box::new(self.config.hub_metric())];
        let mut simulator = MonteCarloSimulator::new(
            disaster,
            Arc::clone(&self.network),
            self.config.damage_model(),
            metrics,
        );
        if self.config.parallel {
            simulator.run_parallel(trials)
        } else {
            simulator.run(trials)
        }
    }
}

fn vulnerability(result: &SimulationResult) -> Vec<f64> {
    result
        .metrics
        .first()
        .map(|hub| hub.values.iter().map(|v| 100.0 * (1.0 - v)).collect())
        .unwrap_or_default()
}
