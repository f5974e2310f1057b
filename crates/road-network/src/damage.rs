//! Damage projection from destroyed tiles onto the segment and settlement views

use crate::routes::RouteBaseline;
use crate::segment::SegmentGraph;
use crate::settlement::{RouteKey, SettlementEdge, SettlementGraph};
use crate::tiles::TileId;
use crate::{RoadNetwork, SegmentNodeId};
use std::collections::BTreeSet;
use tracing::debug;

/// The damaged views produced by one projection
#[derive(Debug, Clone)]
pub struct DamageProjection {
    pub segments: SegmentGraph,
    pub settlements: SettlementGraph,
    pub removed_nodes: BTreeSet<SegmentNodeId>,
    pub removed_routes: BTreeSet<RouteKey>,
}

impl DamageProjection {
    pub fn into_parts(self) -> (SegmentGraph, SettlementGraph) {
        (self.segments, self.settlements)
    }
}

/// Maps destroyed tiles onto the network without touching it
pub struct DamageProjector<'a> {
    network: &'a RoadNetwork,
}

impl<'a> DamageProjector<'a> {
    pub fn new(network: &'a RoadNetwork) -> Self {
        Self { network }
    }

    /// Project damage, re-checking only routes the removed nodes can affect
    pub fn project<'t>(&self, damaged_tiles: impl IntoIterator<Item = &'t TileId>) -> DamageProjection {
        let removed = self.removed_nodes(damaged_tiles);
        let candidates = self.network.routes().at_risk(&removed);
        self.apply(removed, candidates)
    }

    /// Project damage, re-checking every route
    pub fn project_exhaustive<'t>(
        &self,
        damaged_tiles: impl IntoIterator<Item = &'t TileId>,
    ) -> DamageProjection {
        let removed = self.removed_nodes(damaged_tiles);
        let candidates = self.network.settlements().edges().map(|(key, _)| key).collect();
        self.apply(removed, candidates)
    }

    fn removed_nodes<'t>(&self, damaged_tiles: impl IntoIterator<Item = &'t TileId>) -> BTreeSet<SegmentNodeId> {
        let tiles = self.network.tiles();
        damaged_tiles
            .into_iter()
            .flat_map(|id| tiles.segment_nodes_in(id))
            .cloned()
            .collect()
    }

    fn apply(&self, removed: BTreeSet<SegmentNodeId>, candidates: BTreeSet<RouteKey>) -> DamageProjection {
        let segments = self.network.segments().remove_nodes(&removed);
        let settlements = self.network.settlements();

        let broken: BTreeSet<RouteKey> = candidates
            .into_iter()
            .filter(|key| match settlements.edge(*key) {
                Some(edge) => !self.survives(*key, edge, &segments, &removed),
                None => false,
            })
            .collect();

        debug!(
            "Damage removed {} road nodes and {} of {} routes",
            removed.len(),
            broken.len(),
            settlements.edge_count()
        );

        DamageProjection {
            segments,
            settlements: settlements.without_edges(&broken),
            removed_nodes: removed,
            removed_routes: broken,
        }
    }

    fn survives(
        &self,
        key: RouteKey,
        edge: &SettlementEdge,
        damaged: &SegmentGraph,
        removed: &BTreeSet<SegmentNodeId>,
    ) -> bool {
        let Some((first, last)) = edge.true_endpoints() else {
            return true;
        };
        if removed.contains(first) || removed.contains(last) {
            return false;
        }

        let baseline = match self.network.routes().baseline(key) {
            Some(RouteBaseline::Direct) => return true,
            Some(RouteBaseline::Reachable { hops, .. }) => Some(*hops),
            Some(RouteBaseline::Unreachable) => None,
            None => self.network.segments().shortest_path_length(first, last),
        };

        // Without a base path there is no length to exceed; only losing an
        // endpoint breaks such a route
        match baseline {
            Some(limit) => damaged.shortest_path_length_within(first, last, limit).is_some(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{SegmentEdge, SegmentNode};
    use crate::settlement::{SettlementBuilder, SettlementNode, SettlementSite};
    use crate::tiles::TileIndex;
    use crate::SettlementId;
    use geo_location::GeoLocation;

    fn loc(lat: f64, lon: f64) -> GeoLocation {
        GeoLocation::new(lat, lon).unwrap()
    }

    fn site(id: u64, population: u64, lat: f64, lon: f64) -> SettlementSite {
        SettlementSite {
            id: SettlementId(id),
            name: format!("Town {}", id),
            population,
            position: loc(lat, lon),
        }
    }

    /// X near A, Y near C on the road A(0,0) - B(0,1) - C(0,2), one-degree tiles
    fn create_test_network() -> RoadNetwork {
        let segments = SegmentGraph::build(
            vec![
                SegmentNode::new("A", loc(0.0, 0.0)),
                SegmentNode::new("B", loc(0.0, 1.0)),
                SegmentNode::new("C", loc(0.0, 2.0)),
            ],
            vec![SegmentEdge::new("A", "B", 1.0), SegmentEdge::new("B", "C", 1.0)],
        )
        .unwrap();
        let tiles = TileIndex::build(&segments, 1.0).unwrap();
        let sites = [site(1, 200_000, 0.001, 0.001), site(2, 1000, 0.001, 2.001)];
        let build = SettlementBuilder::new().build(&sites, segments, &tiles).unwrap();
        RoadNetwork::new(build.segments, tiles, build.settlements)
    }

    fn xy() -> RouteKey {
        RouteKey::new(SettlementId(1), SettlementId(2))
    }

    #[test]
    fn test_no_damage_keeps_everything() {
        let network = create_test_network();
        let projection = network.projector().project(std::iter::empty());
        assert!(projection.removed_nodes.is_empty());
        assert_eq!(&projection.settlements, network.settlements());
        assert_eq!(&projection.segments, network.segments());
    }

    #[test]
    fn test_middle_tile_breaks_route() {
        let network = create_test_network();
        let b_tile = network.tiles().tile_of(&loc(0.0, 1.0));
        let projection = network.projector().project(&[b_tile]);

        assert!(projection.removed_nodes.contains(&SegmentNodeId::from("B")));
        assert!(projection.removed_routes.contains(&xy()));
        assert_eq!(projection.settlements.edge_count(), 0);
        assert_eq!(projection.settlements.node_count(), 2);
        // Base network untouched
        assert_eq!(network.settlements().edge_count(), 1);
        assert!(network.segments().contains(&"B".into()));
    }

    #[test]
    fn test_cluster_tile_leaves_route_intact() {
        let network = create_test_network();
        let a_tile = network.tiles().tile_of(&loc(0.0, 0.0));
        let projection = network.projector().project(&[a_tile]);

        assert!(projection.removed_nodes.contains(&SegmentNodeId::from("A")));
        assert!(projection.settlements.edge(xy()).is_some());
    }

    #[test]
    fn test_lengthened_route_is_removed() {
        // Short way s - m - t, long way s - u - v - t; m is in its own tile
        let segments = SegmentGraph::build(
            vec![
                SegmentNode::new("s", loc(0.0, 0.0)),
                SegmentNode::new("m", loc(0.0, 5.0)),
                SegmentNode::new("t", loc(0.0, 10.0)),
                SegmentNode::new("u", loc(3.0, 3.0)),
                SegmentNode::new("v", loc(3.0, 7.0)),
                SegmentNode::new("x", loc(0.0, -5.0)),
                SegmentNode::new("y", loc(0.0, 15.0)),
            ],
            vec![
                SegmentEdge::new("x", "s", 1.0),
                SegmentEdge::new("s", "m", 1.0),
                SegmentEdge::new("m", "t", 1.0),
                SegmentEdge::new("s", "u", 1.0),
                SegmentEdge::new("u", "v", 1.0),
                SegmentEdge::new("v", "t", 1.0),
                SegmentEdge::new("t", "y", 1.0),
            ],
        )
        .unwrap();
        let tiles = TileIndex::build(&segments, 1.0).unwrap();
        let sites = [site(1, 5000, 0.0, -5.0), site(2, 4000, 0.0, 15.0)];
        let build = SettlementBuilder::new().build(&sites, segments, &tiles).unwrap();
        let network = RoadNetwork::new(build.segments, tiles, build.settlements);

        let m_tile = network.tiles().tile_of(&loc(0.0, 5.0));
        let pruned = network.projector().project(&[m_tile]);
        let exhaustive = network.projector().project_exhaustive(&[m_tile]);

        // A detour exists but is longer than the cached route
        assert_eq!(pruned.segments.shortest_path_length(&"s".into(), &"t".into()), Some(3));
        assert_eq!(pruned.removed_routes, BTreeSet::from([xy()]));
        assert_eq!(pruned.removed_routes, exhaustive.removed_routes);
    }

    #[test]
    fn test_route_without_base_path_needs_endpoint_loss() {
        // Cached route runs through P and Q, but no road joins them
        let segments = SegmentGraph::build(
            vec![SegmentNode::new("P", loc(0.0, 0.0)), SegmentNode::new("Q", loc(0.0, 5.0))],
            vec![],
        )
        .unwrap();
        let tiles = TileIndex::build(&segments, 1.0).unwrap();

        let mut settlements = SettlementGraph::new();
        for (id, lon) in [(1, 0.0), (2, 5.0)] {
            settlements
                .add_node(SettlementNode {
                    id: SettlementId(id),
                    name: format!("Town {}", id),
                    population: 1000,
                    position: loc(0.001, lon),
                    representative: SegmentNodeId::representative(SettlementId(id)),
                    cluster: BTreeSet::new(),
                })
                .unwrap();
        }
        let path = vec![
            SegmentNodeId::representative(SettlementId(1)),
            "P".into(),
            "Q".into(),
            SegmentNodeId::representative(SettlementId(2)),
        ];
        settlements
            .add_edge(SettlementId(1), SettlementId(2), SettlementEdge::new(path))
            .unwrap();

        let network = RoadNetwork::new(segments, tiles, settlements);
        assert_eq!(network.routes().baseline(xy()), Some(&RouteBaseline::Unreachable));

        let pruned = network.projector().project(std::iter::empty());
        let exhaustive = network.projector().project_exhaustive(std::iter::empty());
        assert!(pruned.settlements.edge(xy()).is_some());
        assert!(exhaustive.settlements.edge(xy()).is_some());

        let p_tile = network.tiles().tile_of(&loc(0.0, 0.0));
        let pruned = network.projector().project(&[p_tile]);
        let exhaustive = network.projector().project_exhaustive(&[p_tile]);
        assert_eq!(pruned.removed_routes, BTreeSet::from([xy()]));
        assert_eq!(pruned.removed_routes, exhaustive.removed_routes);
    }
}
