//! Strategies for property-based testing

use geo_location::GeoLocation;
use proptest::prelude::*;
use road_network::{RawId, RawNetwork, RawRoadEdge, RawSettlement, RawWaypoint};

/// Spacing of generated road grids in degrees (~3.3 km at the equator).
/// Wider than a 2 km perimeter box, so a settlement on a grid point claims
/// exactly that point.
pub const GRID_SPACING_DEG: f64 = 0.03;

const GRID_ORIGIN: (f64, f64) = (10.0, 20.0);

// ============================================================================
// Location Generators
// ============================================================================

/// Latitude in degrees
pub fn latitude() -> impl Strategy<Value = f64> {
    -90.0..=90.0
}

/// Longitude in degrees
pub fn longitude() -> impl Strategy<Value = f64> {
    -180.0..=180.0
}

/// Any valid location
pub fn geo_location() -> impl Strategy<Value = GeoLocation> {
    (latitude(), longitude()).prop_filter_map("valid location", |(lat, lon)| {
        GeoLocation::new(lat, lon).ok()
    })
}

/// Location away from the poles and the antimeridian
pub fn temperate_location() -> impl Strategy<Value = GeoLocation> {
    (-60.0..=60.0, -170.0..=170.0).prop_filter_map("valid location", |(lat, lon)| {
        GeoLocation::new(lat, lon).ok()
    })
}

/// Location within `spread` degrees of `center`
pub fn location_near(center: GeoLocation, spread: f64) -> impl Strategy<Value = GeoLocation> {
    (-spread..=spread, -spread..=spread).prop_filter_map("valid location", move |(dlat, dlon)| {
        GeoLocation::new(center.latitude() + dlat, center.longitude() + dlon).ok()
    })
}

/// Perimeter radius in km
pub fn perimeter_km() -> impl Strategy<Value = f64> {
    0.0..=50.0
}

// ============================================================================
// Network Generators
// ============================================================================

/// Grid position of a generated waypoint
pub fn grid_position(row: usize, col: usize) -> (f64, f64) {
    (
        GRID_ORIGIN.0 + row as f64 * GRID_SPACING_DEG,
        GRID_ORIGIN.1 + col as f64 * GRID_SPACING_DEG,
    )
}

/// Random road grid of up to `max_side` x `max_side` waypoints.
///
/// Each grid link is kept with probability 3/4. One to four settlements
/// sit on random grid points; two settlements may share a point.
pub fn road_grid(max_side: usize) -> impl Strategy<Value = RawNetwork> {
    let max_side = max_side.max(2);
    (2..=max_side, 2..=max_side)
        .prop_flat_map(|(rows, cols)| {
            let links = rows * (cols - 1) + (rows - 1) * cols;
            (
                Just((rows, cols)),
                proptest::collection::vec(proptest::bool::weighted(0.75), links),
                proptest::collection::vec((0..rows, 0..cols, 0u64..=500_000), 1..=4),
            )
        })
        .prop_map(|((rows, cols), keep, towns)| grid_network(rows, cols, &keep, &towns))
}

fn grid_network(rows: usize, cols: usize, keep: &[bool], towns: &[(usize, usize, u64)]) -> RawNetwork {
    let id = |r: usize, c: usize| RawId::Number((r * cols + c) as i64);

    let mut waypoints = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let (lat, lng) = grid_position(r, c);
            waypoints.push(RawWaypoint { id: id(r, c), lat, lng });
        }
    }

    let mut links = Vec::with_capacity(keep.len());
    for r in 0..rows {
        for c in 0..cols - 1 {
            links.push((id(r, c), id(r, c + 1)));
        }
    }
    for r in 0..rows - 1 {
        for c in 0..cols {
            links.push((id(r, c), id(r + 1, c)));
        }
    }
    let roads = links
        .into_iter()
        .zip(keep)
        .filter(|(_, kept)| **kept)
        .map(|((from_id, to_id), _)| RawRoadEdge {
            from_id,
            to_id,
            length: GRID_SPACING_DEG * 111.0,
        })
        .collect();

    let settlements = towns
        .iter()
        .enumerate()
        .map(|(i, (r, c, population))| {
            let (lat, lng) = grid_position(*r, *c);
            RawSettlement {
                id: i as u64 + 1,
                name: format!("Town {}", i + 1),
                population: *population,
                lat,
                lng,
            }
        })
        .collect();

    RawNetwork {
        settlements,
        waypoints,
        roads,
    }
}

// ============================================================================
// Damage Generators
// ============================================================================

/// Damage flags; callers cycle it over however many tiles they have
pub fn damage_mask(len: usize) -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), len)
}

/// Disaster magnitudes on the Richter-like scale the damage model expects
pub fn magnitude() -> impl Strategy<Value = f64> {
    0.0..=10.0
}

/// Trial seed
pub fn seed() -> impl Strategy<Value = u64> {
    any::<u64>()
}
