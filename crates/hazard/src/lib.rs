//! Hazard - disaster intensity fields and damage sampling
//!
//! Two capability traits sit between the simulator and the physics:
//!
//! - [`DisasterModel`]: deterministic magnitude at a set of locations
//! - [`DamageModel`]: seeded damage draw from those magnitudes
//!
//! Reference implementations are a Gaussian earthquake, a linear
//! hurricane track and a logistic Bernoulli damage model.

use geo_location::GeoLocation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod damage;
pub mod earthquake;
pub mod hurricane;

pub use damage::BernoulliDamageModel;
pub use earthquake::GaussianEarthquake;
pub use hurricane::{HurricaneWaypoint, LinearHurricane};

/// Hazard errors
#[derive(Error, Debug)]
pub enum HazardError {
    #[error("Unsupported disaster kind: {0}")]
    UnsupportedDisasterKind(String),
    #[error("Invalid disaster parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, HazardError>;

/// Spatial intensity field of one disaster
pub trait DisasterModel {
    /// Magnitude at each point, same order and length as `points`
    fn magnitudes_at(&self, points: &[GeoLocation]) -> Vec<f64>;
}

/// Turns magnitudes into damaged / intact flags
pub trait DamageModel {
    /// One flag per point; identical inputs and seed give identical flags
    fn sample_damage(&self, points: &[GeoLocation], magnitudes: &[f64], seed: u64) -> Vec<bool>;
}

/// Total work done by a quake of moment magnitude `m`, in joules
pub fn energy_from_magnitude(magnitude: f64) -> f64 {
    10f64.powf(1.5 * (magnitude + 10.7) - 7.0)
}

/// A disaster as submitted by a caller: `{"type": ..., "params": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub params: serde_json::Value,
}

impl DisasterRequest {
    pub fn earthquake(quake: &GaussianEarthquake) -> Self {
        Self {
            kind: "earthquake".to_string(),
            params: serde_json::json!({
                "center": quake.center,
                "radius": quake.radius_km,
                "intensity": quake.intensity,
            }),
        }
    }

    /// Resolve the request into a concrete model
    pub fn into_disaster(self) -> Result<Disaster> {
        let invalid = |e: serde_json::Error| HazardError::InvalidParameters(e.to_string());
        let disaster = match self.kind.as_str() {
            "earthquake" => {
                Disaster::Earthquake(serde_json::from_value(self.params).map_err(invalid)?)
            }
            "hurricane" => Disaster::Hurricane(serde_json::from_value(self.params).map_err(invalid)?),
            other => return Err(HazardError::UnsupportedDisasterKind(other.to_string())),
        };
        disaster.validate()?;
        Ok(disaster)
    }
}

/// Every supported disaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Disaster {
    Earthquake(GaussianEarthquake),
    Hurricane(LinearHurricane),
}

impl Disaster {
    pub fn kind(&self) -> &'static str {
        match self {
            Disaster::Earthquake(_) => "earthquake",
            Disaster::Hurricane(_) => "hurricane",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Disaster::Earthquake(quake) => quake.validate(),
            Disaster::Hurricane(hurricane) => hurricane.validate(),
        }
    }
}

impl DisasterModel for Disaster {
    fn magnitudes_at(&self, points: &[GeoLocation]) -> Vec<f64> {
        match self {
            Disaster::Earthquake(quake) => quake.magnitudes_at(points),
            Disaster::Hurricane(hurricane) => hurricane.magnitudes_at(points),
        }
    }
}

pub(crate) fn check_radius(radius_km: f64) -> Result<()> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(HazardError::InvalidParameters(format!(
            "radius must be positive, got {}",
            radius_km
        )))
    }
}

pub(crate) fn check_intensity(intensity: f64) -> Result<()> {
    if intensity.is_finite() && intensity >= 0.0 {
        Ok(())
    } else {
        Err(HazardError::InvalidParameters(format!(
            "intensity must be non-negative, got {}",
            intensity
        )))
    }
}
