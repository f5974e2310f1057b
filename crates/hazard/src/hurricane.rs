//! Linear hurricane: Gaussian footprints along a straight track

use crate::earthquake::{default_earth_radius, gaussian};
use crate::{check_intensity, check_radius, DisasterModel, Result};
use geo_location::{GeoLocation, EARTH_RADIUS_KM};
use serde::{Deserialize, Serialize};

/// Number of track intervals; the track has one more centre than this
pub const TRACK_INTERVALS: usize = 10;

/// One end of the track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HurricaneWaypoint {
    pub center: GeoLocation,
    #[serde(rename = "radius")]
    pub radius_km: f64,
    pub intensity: f64,
}

impl HurricaneWaypoint {
    pub fn new(center: GeoLocation, radius_km: f64, intensity: f64) -> Self {
        Self {
            center,
            radius_km,
            intensity,
        }
    }
}

/// Centre, radius and intensity are interpolated linearly between the
/// ends; the magnitude at a point is the strongest footprint covering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearHurricane {
    pub start: HurricaneWaypoint,
    pub end: HurricaneWaypoint,
    #[serde(default = "default_earth_radius")]
    pub earth_radius_km: f64,
}

impl LinearHurricane {
    pub fn new(start: HurricaneWaypoint, end: HurricaneWaypoint) -> Self {
        Self {
            start,
            end,
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for end in [&self.start, &self.end] {
            check_radius(end.radius_km)?;
            check_intensity(end.intensity)?;
        }
        Ok(())
    }

    /// The interpolated footprints, start first
    pub fn track(&self) -> Vec<HurricaneWaypoint> {
        let steps = TRACK_INTERVALS as f64;
        let lerp = |a: f64, b: f64, i: usize| a + i as f64 * (b - a) / steps;

        (0..=TRACK_INTERVALS)
            .map(|i| HurricaneWaypoint {
                center: GeoLocation::saturating(
                    lerp(self.start.center.latitude(), self.end.center.latitude(), i),
                    lerp(self.start.center.longitude(), self.end.center.longitude(), i),
                ),
                radius_km: lerp(self.start.radius_km, self.end.radius_km, i),
                intensity: lerp(self.start.intensity, self.end.intensity, i),
            })
            .collect()
    }
}

impl DisasterModel for LinearHurricane {
    fn magnitudes_at(&self, points: &[GeoLocation]) -> Vec<f64> {
        let track = self.track();
        points
            .iter()
            .map(|p| {
                track
                    .iter()
                    .map(|w| {
                        let d = w.center.distance_to(p, self.earth_radius_km);
                        gaussian(d, w.intensity, w.radius_km)
                    })
                    .fold(0.0, f64::max)
            })
            .collect()
    }
}
