//! Gaussian earthquake: magnitude falls off with distance from the epicentre

use crate::{check_intensity, check_radius, DisasterModel, Result};
use geo_location::{GeoLocation, EARTH_RADIUS_KM};
use serde::{Deserialize, Serialize};

pub(crate) fn default_earth_radius() -> f64 {
    EARTH_RADIUS_KM
}

/// `intensity · exp(−d² / (2 · radius²))` with `d` the great-circle distance
pub(crate) fn gaussian(distance_km: f64, intensity: f64, radius_km: f64) -> f64 {
    intensity * (-(distance_km * distance_km) / (2.0 * radius_km * radius_km)).exp()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianEarthquake {
    pub center: GeoLocation,
    /// Standard deviation of the fall-off, km
    #[serde(rename = "radius")]
    pub radius_km: f64,
    /// Magnitude at the epicentre
    pub intensity: f64,
    #[serde(default = "default_earth_radius")]
    pub earth_radius_km: f64,
}

impl GaussianEarthquake {
    pub fn new(center: GeoLocation, radius_km: f64, intensity: f64) -> Self {
        Self {
            center,
            radius_km,
            intensity,
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_radius(self.radius_km)?;
        check_intensity(self.intensity)
    }

    pub fn magnitude_at(&self, point: &GeoLocation) -> f64 {
        let distance = self.center.distance_to(point, self.earth_radius_km);
        gaussian(distance, self.intensity, self.radius_km)
    }
}

impl DisasterModel for GaussianEarthquake {
    fn magnitudes_at(&self, points: &[GeoLocation]) -> Vec<f64> {
        points.iter().map(|p| self.magnitude_at(p)).collect()
    }
}
