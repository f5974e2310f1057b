//! Settlement graph construction: perimeter merging and pairwise routes

use super::contraction::RoutingGraph;
use super::{SettlementEdge, SettlementGraph, SettlementNode, SettlementSite};
use crate::segment::{SegmentGraph, SegmentNode};
use crate::tiles::TileIndex;
use crate::{NetworkError, Result, SegmentNodeId, SettlementId};
use geo_location::EARTH_RADIUS_KM;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Default perimeter radius a settlement claims road nodes within
pub const DEFAULT_PERIMETER_KM: f64 = 2.0;

/// Output of a settlement build
#[derive(Debug, Clone)]
pub struct SettlementBuild {
    /// Base segment graph with absorbed nodes flagged
    pub segments: SegmentGraph,
    /// Segment graph with every cluster collapsed into its representative
    pub merged: SegmentGraph,
    pub settlements: SettlementGraph,
}

#[derive(Debug, Clone)]
pub struct SettlementBuilder {
    pub perimeter_km: f64,
    pub earth_radius_km: f64,
    pub contract_chains: bool,
}

impl Default for SettlementBuilder {
    fn default() -> Self {
        Self {
            perimeter_km: DEFAULT_PERIMETER_KM,
            earth_radius_km: EARTH_RADIUS_KM,
            contract_chains: true,
        }
    }
}

impl SettlementBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn perimeter_km(mut self, km: f64) -> Self {
        self.perimeter_km = km;
        self
    }

    pub fn contract_chains(mut self, enabled: bool) -> Self {
        self.contract_chains = enabled;
        self
    }

    /// Merge perimeters and compute the red edges.
    ///
    /// Settlements claim nodes largest population first; a node already
    /// claimed stays with its first owner.
    pub fn build(
        &self,
        sites: &[SettlementSite],
        segments: SegmentGraph,
        tiles: &TileIndex,
    ) -> Result<SettlementBuild> {
        let mut order: Vec<&SettlementSite> = sites.iter().collect();
        order.sort_by(|a, b| b.population.cmp(&a.population).then(a.id.cmp(&b.id)));

        let mut base = segments;
        let mut merged = base.copy();
        let mut settlements = SettlementGraph::new();
        let mut claimed: HashSet<SegmentNodeId> = HashSet::new();

        for site in &order {
            let cluster = self.claim(site, &base, tiles, &claimed)?;
            let representative = SegmentNodeId::representative(site.id);
            if merged.contains(&representative) {
                return Err(NetworkError::MalformedInput(format!(
                    "waypoint id {} collides with settlement {}",
                    representative, site.id
                )));
            }

            merged.add_node(SegmentNode {
                id: representative.clone(),
                position: site.position,
                mapped_to_city: true,
            })?;
            for member in &cluster {
                let reroutes: Vec<(SegmentNodeId, f64)> = merged
                    .neighbors(member)
                    .into_iter()
                    .filter(|(n, _)| !cluster.contains(*n))
                    .map(|(n, length)| (n.clone(), length))
                    .collect();
                for (neighbor, length) in reroutes {
                    merged.connect(&representative, &neighbor, length)?;
                }
            }
            for member in &cluster {
                merged.remove_node_in_place(member);
                base.mark_mapped(member);
                claimed.insert(member.clone());
            }

            debug!(
                "Settlement {} ({}) absorbed {} road nodes",
                site.id,
                site.name,
                cluster.len()
            );
            settlements.add_node(SettlementNode {
                id: site.id,
                name: site.name.clone(),
                population: site.population,
                position: site.position,
                representative,
                cluster,
            })?;
        }

        info!(
            "Merged {} settlements, {} of {} road nodes absorbed",
            settlements.node_count(),
            claimed.len(),
            base.node_count()
        );

        self.connect_pairs(&merged, &mut settlements)?;

        Ok(SettlementBuild {
            segments: base,
            merged,
            settlements,
        })
    }

    /// Unclaimed base nodes inside the site's perimeter box
    fn claim(
        &self,
        site: &SettlementSite,
        base: &SegmentGraph,
        tiles: &TileIndex,
        claimed: &HashSet<SegmentNodeId>,
    ) -> Result<BTreeSet<SegmentNodeId>> {
        let bounds = site
            .position
            .bounding_box(self.perimeter_km, self.earth_radius_km)
            .map_err(|e| NetworkError::MalformedInput(format!("settlement {}: {}", site.id, e)))?;

        let candidates: Vec<&SegmentNodeId> = match tiles.tiles_overlapping(&bounds) {
            Some(found) => found.into_iter().flat_map(|t| t.segment_nodes.iter()).collect(),
            None => base.nodes().map(|n| &n.id).collect(),
        };

        Ok(candidates
            .into_iter()
            .filter(|id| !claimed.contains(*id))
            .filter(|id| {
                base.node(id)
                    .is_some_and(|node| node.position.within(&bounds))
            })
            .cloned()
            .collect())
    }

    /// One route search per representative; each pair is stored once
    fn connect_pairs(&self, merged: &SegmentGraph, settlements: &mut SettlementGraph) -> Result<()> {
        let representatives: Vec<(SettlementId, SegmentNodeId)> = settlements
            .nodes()
            .map(|n| (n.id, n.representative.clone()))
            .collect();
        let terminals: HashSet<SegmentNodeId> =
            representatives.iter().map(|(_, rep)| rep.clone()).collect();

        let mut routing = RoutingGraph::new(merged, &terminals);
        if self.contract_chains {
            let before = routing.node_count();
            routing.contract();
            info!(
                "Contracted routing graph from {} to {} nodes",
                before,
                routing.node_count()
            );
        }

        let owner: HashMap<&SegmentNodeId, (usize, SettlementId)> =
            representatives
                .iter()
                .enumerate()
                .map(|(pos, (id, rep))| (rep, (pos, *id)))
                .collect();

        let mut routes = 0usize;
        let mut isolated = 0usize;
        for (pos, (id, rep)) in representatives.iter().enumerate() {
            if merged.degree(rep) == 0 {
                isolated += 1;
                continue;
            }
            for (target, path) in routing.routes_from(rep) {
                let Some(&(target_pos, target_id)) = owner.get(&target) else {
                    continue;
                };
                if target_pos <= pos {
                    continue;
                }
                settlements.add_edge(*id, target_id, SettlementEdge::new(path))?;
                routes += 1;
            }
            if (pos + 1) % 100 == 0 {
                debug!("Routed {}/{} settlements", pos + 1, representatives.len());
            }
        }

        info!(
            "Built {} settlement routes ({} settlements without roads)",
            routes, isolated
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentEdge;
    use crate::RouteKey;
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

    /// A(0,0) - B(0,1) - C(0,2)
    fn line() -> SegmentGraph {
        SegmentGraph::build(
            vec![
                SegmentNode::new("A", loc(0.0, 0.0)),
                SegmentNode::new("B", loc(0.0, 1.0)),
                SegmentNode::new("C", loc(0.0, 2.0)),
            ],
            vec![SegmentEdge::new("A", "B", 1.0), SegmentEdge::new("B", "C", 1.0)],
        )
        .unwrap()
    }

    fn build(sites: &[SettlementSite], segments: SegmentGraph) -> SettlementBuild {
        let tiles = TileIndex::build(&segments, 1.0).unwrap();
        SettlementBuilder::new().build(sites, segments, &tiles).unwrap()
    }

    #[test]
    fn test_perimeter_merge_and_route() {
        let sites = [site(1, 200_000, 0.001, 0.001), site(2, 1000, 0.001, 2.001)];
        let result = build(&sites, line());

        let x = result.settlements.node(SettlementId(1)).unwrap();
        assert_eq!(x.cluster, BTreeSet::from([SegmentNodeId::from("A")]));
        assert!(result.segments.node(&"A".into()).unwrap().mapped_to_city);
        assert!(!result.segments.node(&"B".into()).unwrap().mapped_to_city);
        assert!(!result.merged.contains(&"A".into()));

        let edge = result
            .settlements
            .edge(RouteKey::new(SettlementId(1), SettlementId(2)))
            .unwrap();
        let ids: Vec<_> = edge.path.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["settlement-1", "B", "settlement-2"]);
    }

    #[test]
    fn test_larger_population_wins_contention() {
        // Both perimeters cover A; the bigger town claims it
        let sites = [site(1, 500, 0.0, 0.005), site(2, 9000, 0.0, -0.005)];
        let result = build(&sites, line());

        let small = result.settlements.node(SettlementId(1)).unwrap();
        let big = result.settlements.node(SettlementId(2)).unwrap();
        assert!(small.cluster.is_empty());
        assert!(big.cluster.contains(&SegmentNodeId::from("A")));
    }

    #[test]
    fn test_settlement_without_roads_gets_no_edge() {
        let sites = [
            site(1, 200_000, 0.0, 0.0),
            site(2, 50, 45.0, 45.0),
            site(3, 1000, 0.0, 2.0),
        ];
        let result = build(&sites, line());

        assert_eq!(result.settlements.node_count(), 3);
        assert_eq!(result.settlements.degree(SettlementId(2)), 0);
        assert_eq!(result.settlements.edge_count(), 1);
    }

    #[test]
    fn test_route_never_crosses_third_settlement() {
        // A town sitting on B splits the line in two routes
        let sites = [
            site(1, 3000, 0.0, 0.0),
            site(2, 2000, 0.0, 1.0),
            site(3, 1000, 0.0, 2.0),
        ];
        let result = build(&sites, line());

        assert_eq!(result.settlements.edge_count(), 2);
        assert!(result
            .settlements
            .edge(RouteKey::new(SettlementId(1), SettlementId(3)))
            .is_none());
        let direct = result
            .settlements
            .edge(RouteKey::new(SettlementId(1), SettlementId(2)))
            .unwrap();
        assert!(direct.is_direct());
    }

    #[test]
    fn test_representative_collision_rejected() {
        let segments = SegmentGraph::build(
            vec![SegmentNode::new("settlement-1", loc(10.0, 10.0))],
            vec![],
        )
        .unwrap();
        let tiles = TileIndex::build(&segments, 1.0).unwrap();
        let err = SettlementBuilder::new()
            .build(&[site(1, 10, 0.0, 0.0)], segments, &tiles)
            .unwrap_err();
        assert!(matches!(err, NetworkError::MalformedInput(_)));
    }

    #[test]
    fn test_contraction_preserves_route_lengths() {
        // Ladder with spurs so both pruning and splicing kick in
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for i in 0..8 {
            nodes.push(SegmentNode::new(format!("top{}", i), loc(0.1, i as f64 * 0.1)));
            nodes.push(SegmentNode::new(format!("bot{}", i), loc(-0.1, i as f64 * 0.1)));
            nodes.push(SegmentNode::new(format!("spur{}", i), loc(0.3, i as f64 * 0.1)));
            edges.push(SegmentEdge::new(format!("top{}", i), format!("spur{}", i), 1.0));
            if i % 3 == 0 {
                edges.push(SegmentEdge::new(format!("top{}", i), format!("bot{}", i), 1.0));
            }
            if i > 0 {
                edges.push(SegmentEdge::new(format!("top{}", i - 1), format!("top{}", i), 1.0));
                edges.push(SegmentEdge::new(format!("bot{}", i - 1), format!("bot{}", i), 1.0));
            }
        }
        let segments = SegmentGraph::build(nodes, edges).unwrap();
        let tiles = TileIndex::build(&segments, 0.05).unwrap();
        let sites = [
            site(1, 100, 0.1, 0.0),
            site(2, 200, -0.1, 0.7),
            site(3, 300, 0.1, 0.4),
        ];
        let builder = SettlementBuilder::new().perimeter_km(1.0);

        let plain = builder
            .clone()
            .contract_chains(false)
            .build(&sites, segments.clone(), &tiles)
            .unwrap();
        let contracted = builder.build(&sites, segments, &tiles).unwrap();

        let lengths = |graph: &SettlementGraph| {
            graph
                .edges()
                .map(|(key, edge)| (key, edge.hops()))
                .collect::<BTreeSet<_>>()
        };
        assert_eq!(lengths(&plain.settlements), lengths(&contracted.settlements));
        assert!(plain.settlements.edge_count() > 0);
    }
}
