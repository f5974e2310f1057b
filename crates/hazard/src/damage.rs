//! Bernoulli damage: each point fails independently given its magnitude

use crate::DamageModel;
use geo_location::GeoLocation;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUALITY_BIAS: f64 = -16.30;
pub const DEFAULT_SUSCEPTIBILITY_FACTOR: f64 = 1.8;

/// `p = logistic(quality_bias + susceptibility_factor · m)`; a point is
/// damaged when its uniform draw falls below `p`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BernoulliDamageModel {
    pub quality_bias: f64,
    pub susceptibility_factor: f64,
}

impl Default for BernoulliDamageModel {
    fn default() -> Self {
        Self {
            quality_bias: DEFAULT_QUALITY_BIAS,
            susceptibility_factor: DEFAULT_SUSCEPTIBILITY_FACTOR,
        }
    }
}

impl BernoulliDamageModel {
    pub fn new(quality_bias: f64, susceptibility_factor: f64) -> Self {
        Self {
            quality_bias,
            susceptibility_factor,
        }
    }

    /// Damage probability at magnitude `m`
    pub fn probability(&self, magnitude: f64) -> f64 {
        let x = self.quality_bias + self.susceptibility_factor * magnitude;
        1.0 / (1.0 + (-x).exp())
    }
}

impl DamageModel for BernoulliDamageModel {
    fn sample_damage(&self, _points: &[GeoLocation], magnitudes: &[f64], seed: u64) -> Vec<bool> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        magnitudes
            .iter()
            .map(|m| rng.gen::<f64>() < self.probability(*m))
            .collect()
    }
}
