//! Geo Location
//!
//! Points on the Earth's surface and the handful of spatial queries the
//! road-network model needs:
//!
//! - Great-circle (haversine) distance
//! - Bounding box of a perimeter radius around a point
//! - Point-in-box and segment/box intersection tests
//!
//! The Earth radius is never a global: callers pass it in, normally
//! [`EARTH_RADIUS_KM`].

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Mean Earth radius in km
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MIN_LAT: f64 = -PI / 2.0;
const MAX_LAT: f64 = PI / 2.0;
const MIN_LON: f64 = -PI;
const MAX_LON: f64 = PI;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Coordinate out of range: lat {latitude}, lon {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
    #[error("Invalid distance: {0}")]
    InvalidDistance(f64),
}

pub type Result<T> = std::result::Result<T, GeoError>;

/// A point on the Earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLocation", into = "RawLocation")]
pub struct GeoLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawLocation {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawLocation> for GeoLocation {
    type Error = GeoError;

    fn try_from(raw: RawLocation) -> Result<Self> {
        GeoLocation::new(raw.lat, raw.lng)
    }
}

impl From<GeoLocation> for RawLocation {
    fn from(location: GeoLocation) -> Self {
        RawLocation {
            lat: location.latitude,
            lng: location.longitude,
        }
    }
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(GeoError::OutOfRange {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    fn lat_rad(&self) -> f64 {
        self.latitude.to_radians()
    }

    fn lon_rad(&self) -> f64 {
        self.longitude.to_radians()
    }

    /// Haversine distance in km on a sphere of `radius_km`
    pub fn distance_to(&self, other: &GeoLocation, radius_km: f64) -> f64 {
        let dlat = other.lat_rad() - self.lat_rad();
        let dlon = other.lon_rad() - self.lon_rad();

        let a = (dlat / 2.0).sin().powi(2)
            + self.lat_rad().cos() * other.lat_rad().cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        radius_km * c
    }

    /// Smallest box containing every point within `distance_km` of this one.
    ///
    /// Near the poles the box widens to the full longitude range. Across the
    /// antimeridian the south-west longitude is greater than the north-east one.
    pub fn bounding_box(&self, distance_km: f64, radius_km: f64) -> Result<GeoBox> {
        if !(distance_km >= 0.0) || !distance_km.is_finite() {
            return Err(GeoError::InvalidDistance(distance_km));
        }

        let rad_dist = distance_km / radius_km;
        let lat = self.lat_rad();
        let lon = self.lon_rad();

        let mut min_lat = lat - rad_dist;
        let mut max_lat = lat + rad_dist;

        let (min_lon, max_lon) = if min_lat > MIN_LAT && max_lat < MAX_LAT {
            let delta_lon = (rad_dist.sin() / lat.cos()).clamp(-1.0, 1.0).asin();
            let mut lo = lon - delta_lon;
            if lo < MIN_LON {
                lo += 2.0 * PI;
            }
            let mut hi = lon + delta_lon;
            if hi > MAX_LON {
                hi -= 2.0 * PI;
            }
            (lo.to_degrees(), hi.to_degrees())
        } else {
            min_lat = min_lat.max(MIN_LAT);
            max_lat = max_lat.min(MAX_LAT);
            (-180.0, 180.0)
        };

        Ok(GeoBox {
            south_west: GeoLocation::saturating(min_lat.to_degrees(), min_lon),
            north_east: GeoLocation::saturating(max_lat.to_degrees(), max_lon),
        })
    }

    /// Clamps into the valid range instead of failing. Used for derived
    /// corners where rounding can overshoot by an ulp.
    pub fn saturating(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: longitude.clamp(-180.0, 180.0),
        }
    }

    pub fn within(&self, bounds: &GeoBox) -> bool {
        bounds.contains(self)
    }
}

/// Axis-aligned box in latitude/longitude space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub south_west: GeoLocation,
    pub north_east: GeoLocation,
}

impl GeoBox {
    pub fn new(south_west: GeoLocation, north_east: GeoLocation) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    fn wraps_antimeridian(&self) -> bool {
        self.south_west.longitude > self.north_east.longitude
    }

    pub fn contains(&self, point: &GeoLocation) -> bool {
        let lat_ok = point.latitude >= self.south_west.latitude
            && point.latitude <= self.north_east.latitude;
        if !lat_ok {
            return false;
        }
        if self.wraps_antimeridian() {
            point.longitude >= self.south_west.longitude
                || point.longitude <= self.north_east.longitude
        } else {
            point.longitude >= self.south_west.longitude
                && point.longitude <= self.north_east.longitude
        }
    }

    pub fn center(&self) -> GeoLocation {
        let lat = (self.south_west.latitude + self.north_east.latitude) / 2.0;
        let mut lon = (self.south_west.longitude + self.north_east.longitude) / 2.0;
        if self.wraps_antimeridian() {
            lon += if lon > 0.0 { -180.0 } else { 180.0 };
        }
        GeoLocation {
            latitude: lat,
            longitude: lon,
        }
    }

    /// Does the straight segment `a`–`b` (planar in degrees) touch this box?
    pub fn intersects_segment(&self, a: &GeoLocation, b: &GeoLocation) -> bool {
        if self.wraps_antimeridian() {
            let east = (self.south_west.longitude, 180.0);
            let west = (-180.0, self.north_east.longitude);
            return [east, west].iter().any(|&(lo, hi)| {
                clip_segment(
                    a,
                    b,
                    (lo, self.south_west.latitude),
                    (hi, self.north_east.latitude),
                )
            });
        }
        clip_segment(
            a,
            b,
            (self.south_west.longitude, self.south_west.latitude),
            (self.north_east.longitude, self.north_east.latitude),
        )
    }
}

/// Liang-Barsky clip; `min`/`max` are (lon, lat) corners
fn clip_segment(a: &GeoLocation, b: &GeoLocation, min: (f64, f64), max: (f64, f64)) -> bool {
    let (x0, y0) = (a.longitude, a.latitude);
    let dx = b.longitude - x0;
    let dy = b.latitude - y0;

    let p = [-dx, dx, -dy, dy];
    let q = [x0 - min.0, max.0 - x0, y0 - min.1, max.1 - y0];

    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (pi, qi) in p.iter().zip(q.iter()) {
        if *pi == 0.0 {
            if *qi < 0.0 {
                return false;
            }
            continue;
        }
        let r = qi / pi;
        if *pi < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }
    true
}
