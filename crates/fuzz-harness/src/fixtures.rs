//! Hand-built networks with known answers

use road_network::{RawId, RawNetwork, RawRoadEdge, RawSettlement, RawWaypoint};

/// Tile size that puts every fixture waypoint in its own tile
pub const FIXTURE_TILE_SIZE_DEG: f64 = 1.0;

/// City X (pop 200000) next to waypoint A, town Y (pop 1000) next to C,
/// on the road A(0,0) - B(0,1) - C(0,2).
pub fn line_scenario() -> RawNetwork {
    RawNetwork {
        settlements: vec![
            settlement(1, "X", 200_000, 0.001, 0.001),
            settlement(2, "Y", 1000, 0.001, 2.001),
        ],
        waypoints: vec![
            waypoint("A", 0.0, 0.0),
            waypoint("B", 0.0, 1.0),
            waypoint("C", 0.0, 2.0),
        ],
        roads: vec![road("A", "B", 111.2), road("B", "C", 111.2)],
    }
}

/// The line scenario plus a roadless village Z far from everything
pub fn line_scenario_with_isolated() -> RawNetwork {
    let mut raw = line_scenario();
    raw.settlements.push(settlement(3, "Z", 50, 5.0, 5.0));
    raw
}

/// Two cities joined by a three-hop highway with a five-hop detour.
///
/// Hub H (pop 150000) sits on `h`, town T (pop 8000) on `t`; the highway is
/// h - m1 - m2 - t and the detour goes h - d1 - d2 - d3 - d4 - t.
pub fn detour_scenario() -> RawNetwork {
    RawNetwork {
        settlements: vec![
            settlement(1, "H", 150_000, 0.0, 0.0),
            settlement(2, "T", 8000, 0.0, 3.0),
        ],
        waypoints: vec![
            waypoint("h", 0.0, 0.0),
            waypoint("m1", 0.0, 1.0),
            waypoint("m2", 0.0, 2.0),
            waypoint("t", 0.0, 3.0),
            waypoint("d1", 2.0, 0.0),
            waypoint("d2", 2.0, 1.0),
            waypoint("d3", 2.0, 2.0),
            waypoint("d4", 2.0, 3.0),
        ],
        roads: vec![
            road("h", "m1", 111.2),
            road("m1", "m2", 111.2),
            road("m2", "t", 111.2),
            road("h", "d1", 222.4),
            road("d1", "d2", 111.2),
            road("d2", "d3", 111.2),
            road("d3", "d4", 111.2),
            road("d4", "t", 222.4),
        ],
    }
}

pub fn settlement(id: u64, name: &str, population: u64, lat: f64, lng: f64) -> RawSettlement {
    RawSettlement {
        id,
        name: name.to_string(),
        population,
        lat,
        lng,
    }
}

pub fn waypoint(id: &str, lat: f64, lng: f64) -> RawWaypoint {
    RawWaypoint {
        id: RawId::Text(id.to_string()),
        lat,
        lng,
    }
}

pub fn road(from: &str, to: &str, length: f64) -> RawRoadEdge {
    RawRoadEdge {
        from_id: RawId::Text(from.to_string()),
        to_id: RawId::Text(to.to_string()),
        length,
    }
}
