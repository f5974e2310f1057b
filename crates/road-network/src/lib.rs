//! Road Network - three-layer model of roads and settlements
//!
//! Keeps one road network in memory as three consistent views:
//!
//! - Segment view ("blue"): road waypoints joined by straight segments
//! - Tile view: a uniform lat/lon grid bucketing the segment view
//! - Settlement view ("red"): settlements joined by cached shortest
//!   paths through the segment view
//!
//! On top of these sit the route index (which red edges depend on which
//! blue nodes), the damage projector that maps destroyed tiles onto the
//! red layer, and a resumable artifact pipeline for the expensive build.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod damage;
pub mod raw;
pub mod routes;
pub mod segment;
pub mod settlement;
pub mod store;
pub mod tiles;

pub use damage::{DamageProjection, DamageProjector};
pub use geo_location::{GeoBox, GeoLocation, EARTH_RADIUS_KM};
pub use raw::{RawId, RawNetwork, RawRoadEdge, RawSettlement, RawWaypoint};
pub use routes::{RouteBaseline, RouteIndex, RouteIndexRecord};
pub use segment::{SegmentEdge, SegmentEdgeKey, SegmentGraph, SegmentNode};
pub use settlement::{
    RouteKey, SettlementBuild, SettlementBuilder, SettlementEdge, SettlementGraph, SettlementNode,
    SettlementSite,
};
pub use store::{Artifact, ArtifactStore, BuildConfig, BuildPipeline, Manifest, ManifestEntry};
pub use tiles::{Tile, TileId, TileIndex};

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Settlement not found: {0}")]
    SettlementNotFound(SettlementId),
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Identifier of a blue node, as given by the raw waypoint data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentNodeId(String);

impl SegmentNodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the node that stands in for a whole settlement
    pub fn representative(settlement: SettlementId) -> Self {
        Self(format!("settlement-{}", settlement.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentNodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SegmentNodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a red node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementId(pub u64);

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The consistent blue/tile/red triple plus the derived route index.
///
/// Shared read-only between simulation trials; projections never touch it.
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    segments: SegmentGraph,
    tiles: TileIndex,
    settlements: SettlementGraph,
    routes: RouteIndex,
}

impl RoadNetwork {
    /// Assemble a network, deriving the route index from the segment view
    pub fn new(segments: SegmentGraph, tiles: TileIndex, settlements: SettlementGraph) -> Self {
        let routes = RouteIndex::build(&segments, &settlements);
        Self::with_routes(segments, tiles, settlements, routes)
    }

    pub fn with_routes(
        segments: SegmentGraph,
        tiles: TileIndex,
        settlements: SettlementGraph,
        routes: RouteIndex,
    ) -> Self {
        Self {
            segments,
            tiles,
            settlements,
            routes,
        }
    }

    pub fn segments(&self) -> &SegmentGraph {
        &self.segments
    }

    pub fn tiles(&self) -> &TileIndex {
        &self.tiles
    }

    pub fn settlements(&self) -> &SettlementGraph {
        &self.settlements
    }

    pub fn routes(&self) -> &RouteIndex {
        &self.routes
    }

    pub fn projector(&self) -> DamageProjector<'_> {
        DamageProjector::new(self)
    }

    pub fn stats(&self) -> NetworkStats {
        let isolated_settlements = self
            .settlements
            .node_ids()
            .filter(|id| self.settlements.degree(*id) == 0)
            .count();

        NetworkStats {
            segment_nodes: self.segments.node_count(),
            segment_edges: self.segments.edge_count(),
            tiles: self.tiles.len(),
            settlements: self.settlements.node_count(),
            settlement_edges: self.settlements.edge_count(),
            isolated_settlements,
        }
    }
}

/// Network statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub segment_nodes: usize,
    pub segment_edges: usize,
    pub tiles: usize,
    pub settlements: usize,
    pub settlement_edges: usize,
    pub isolated_settlements: usize,
}
