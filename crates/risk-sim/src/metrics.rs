//! Per-settlement metrics evaluated on a damaged settlement graph

use geo_location::EARTH_RADIUS_KM;
use road_network::SettlementGraph;
use std::collections::HashMap;

pub const DEFAULT_HUB_POPULATION: u64 = 10_000;
pub const DEFAULT_HUB_DISTANCE_KM: f64 = 300.0;

/// A metric yields one value per settlement, in settlement node order.
///
/// Implementations must return a value for every node, whatever the graph
/// looks like.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, graph: &SettlementGraph, city_damaged: &[bool]) -> Vec<f64>;
}

/// 1.0 when an intact hub other than the node itself is reachable and
/// within the distance threshold, 0.0 otherwise.
///
/// A hub is a settlement with at least `population_threshold` people whose
/// city-damage flag is clear. A damaged settlement scores 0.0.
///
/// Component labelling is O(V+E). Each node then measures its distance to
/// the hubs of its own component only, so the distance checks cost O(V·H) in
/// the worst case, with H the largest per-component hub count.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConnectivity {
    pub population_threshold: u64,
    pub distance_km: f64,
    pub earth_radius_km: f64,
}

impl Default for HubConnectivity {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_POPULATION, DEFAULT_HUB_DISTANCE_KM)
    }
}

impl HubConnectivity {
    pub fn new(population_threshold: u64, distance_km: f64) -> Self {
        Self {
            population_threshold,
            distance_km,
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }
}

impl Metric for HubConnectivity {
    fn name(&self) -> &str {
        "hub_connectivity"
    }

    fn evaluate(&self, graph: &SettlementGraph, city_damaged: &[bool]) -> Vec<f64> {
        let nodes: Vec<_> = graph.nodes().collect();
        let labels = graph.components();
        let damaged = |i: usize| city_damaged.get(i).copied().unwrap_or(false);

        let mut hubs_by_component: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.population >= self.population_threshold && !damaged(i) {
                hubs_by_component.entry(labels[i]).or_default().push(i);
            }
        }

        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                if damaged(i) {
                    return 0.0;
                }
                let connected = hubs_by_component
                    .get(&labels[i])
                    .map(|hubs| {
                        hubs.iter().any(|&h| {
                            h != i
                                && nodes[h].position.distance_to(&node.position, self.earth_radius_km)
                                    <= self.distance_km
                        })
                    })
                    .unwrap_or(false);
                if connected {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Surviving routes per settlement
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeDegree;

impl Metric for NodeDegree {
    fn name(&self) -> &str {
        "node_degree"
    }

    fn evaluate(&self, graph: &SettlementGraph, _city_damaged: &[bool]) -> Vec<f64> {
        graph.node_ids().map(|id| graph.degree(id) as f64).collect()
    }
}
