//! Simulation parameters

use crate::metrics::{HubConnectivity, DEFAULT_HUB_DISTANCE_KM, DEFAULT_HUB_POPULATION};
use crate::Result;
use geo_location::EARTH_RADIUS_KM;
use hazard::damage::{DEFAULT_QUALITY_BIAS, DEFAULT_SUSCEPTIBILITY_FACTOR};
use hazard::BernoulliDamageModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const DEFAULT_TRIALS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub quality_bias: f64,
    pub susceptibility_factor: f64,
    pub hub_population: u64,
    pub hub_distance_km: f64,
    pub trials: usize,
    pub earth_radius_km: f64,
    /// Spread trials over the rayon pool
    pub parallel: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            quality_bias: DEFAULT_QUALITY_BIAS,
            susceptibility_factor: DEFAULT_SUSCEPTIBILITY_FACTOR,
            hub_population: DEFAULT_HUB_POPULATION,
            hub_distance_km: DEFAULT_HUB_DISTANCE_KM,
            trials: DEFAULT_TRIALS,
            earth_radius_km: EARTH_RADIUS_KM,
            parallel: false,
        }
    }
}

impl RiskConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn damage_model(&self) -> BernoulliDamageModel {
        BernoulliDamageModel::new(self.quality_bias, self.susceptibility_factor)
    }

    pub fn hub_metric(&self) -> HubConnectivity {
        HubConnectivity {
            population_threshold: self.hub_population,
            distance_km: self.hub_distance_km,
            earth_radius_km: self.earth_radius_km,
        }
    }
}
