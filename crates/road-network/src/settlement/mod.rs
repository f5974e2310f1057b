//! Settlement view: settlements joined by cached routes through the segment view

mod builder;
mod contraction;

pub use builder::{SettlementBuild, SettlementBuilder, DEFAULT_PERIMETER_KM};

use crate::{NetworkError, Result, SegmentNodeId, SettlementId};
use geo_location::GeoLocation;
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdgeReferences, NodeIndexable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Validated settlement record, before it is placed on the road network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSite {
    pub id: SettlementId,
    pub name: String,
    pub population: u64,
    pub position: GeoLocation,
}

/// A red node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementNode {
    pub id: SettlementId,
    pub name: String,
    pub population: u64,
    pub position: GeoLocation,
    /// Blue node standing in for the settlement in the merged graph
    pub representative: SegmentNodeId,
    /// Base blue nodes absorbed into the representative
    #[serde(default)]
    pub cluster: BTreeSet<SegmentNodeId>,
}

/// A red edge: the cached blue route between two representatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEdge {
    pub path: Vec<SegmentNodeId>,
}

impl SettlementEdge {
    pub fn new(path: Vec<SegmentNodeId>) -> Self {
        Self { path }
    }

    /// Representatives adjacent in the merged graph; never invalidated
    pub fn is_direct(&self) -> bool {
        self.path.len() <= 2
    }

    /// First and last blue nodes after leaving the representatives
    pub fn true_endpoints(&self) -> Option<(&SegmentNodeId, &SegmentNodeId)> {
        if self.is_direct() {
            return None;
        }
        Some((&self.path[1], &self.path[self.path.len() - 2]))
    }

    /// Path without the two representatives
    pub fn interior(&self) -> &[SegmentNodeId] {
        if self.is_direct() {
            return &[];
        }
        &self.path[1..self.path.len() - 1]
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Order-independent identity of a red edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey(SettlementId, SettlementId);

impl RouteKey {
    pub fn new(a: SettlementId, b: SettlementId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn endpoints(&self) -> (SettlementId, SettlementId) {
        (self.0, self.1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettlementEdgeRecord {
    a: SettlementId,
    b: SettlementId,
    path: Vec<SegmentNodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettlementGraphRecord {
    nodes: Vec<SettlementNode>,
    edges: Vec<SettlementEdgeRecord>,
}

/// The red graph. Node order is insertion order and is the order every
/// per-settlement result vector follows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "SettlementGraphRecord", into = "SettlementGraphRecord")]
pub struct SettlementGraph {
    graph: StableUnGraph<SettlementNode, SettlementEdge>,
    index: HashMap<SettlementId, NodeIndex>,
}

impl TryFrom<SettlementGraphRecord> for SettlementGraph {
    type Error = NetworkError;

    fn try_from(record: SettlementGraphRecord) -> Result<Self> {
        let mut graph = SettlementGraph::new();
        for node in record.nodes {
            graph.add_node(node)?;
        }
        for edge in record.edges {
            graph.add_edge(edge.a, edge.b, SettlementEdge::new(edge.path))?;
        }
        Ok(graph)
    }
}

impl From<SettlementGraph> for SettlementGraphRecord {
    fn from(graph: SettlementGraph) -> Self {
        graph.to_record()
    }
}

impl PartialEq for SettlementGraph {
    fn eq(&self, other: &Self) -> bool {
        let nodes_equal = self.nodes().eq(other.nodes());
        let mine: BTreeSet<_> = self.edges().map(|(k, e)| (k, e.path.clone())).collect();
        let theirs: BTreeSet<_> = other.edges().map(|(k, e)| (k, e.path.clone())).collect();
        nodes_equal && mine == theirs
    }
}

impl SettlementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: SettlementNode) -> Result<NodeIndex> {
        if self.index.contains_key(&node.id) {
            return Err(NetworkError::MalformedInput(format!(
                "duplicate settlement id {}",
                node.id
            )));
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(idx)
    }

    /// Add a route; a second route for the same pair replaces the first
    pub fn add_edge(&mut self, a: SettlementId, b: SettlementId, edge: SettlementEdge) -> Result<()> {
        let a_idx = *self.index.get(&a).ok_or(NetworkError::SettlementNotFound(a))?;
        let b_idx = *self.index.get(&b).ok_or(NetworkError::SettlementNotFound(b))?;
        if a_idx == b_idx {
            return Err(NetworkError::MalformedInput(format!(
                "route from settlement {} to itself",
                a
            )));
        }
        self.graph.update_edge(a_idx, b_idx, edge);
        Ok(())
    }

    pub fn node(&self, id: SettlementId) -> Option<&SettlementNode> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SettlementNode> {
        self.graph.node_weights()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = SettlementId> + '_ {
        self.nodes().map(|n| n.id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> impl Iterator<Item = (RouteKey, &SettlementEdge)> {
        self.graph.edge_references().map(move |e| {
            let key = RouteKey::new(self.graph[e.source()].id, self.graph[e.target()].id);
            (key, e.weight())
        })
    }

    pub fn edge(&self, key: RouteKey) -> Option<&SettlementEdge> {
        let (a, b) = key.endpoints();
        let edge = self.graph.find_edge(*self.index.get(&a)?, *self.index.get(&b)?)?;
        self.graph.edge_weight(edge)
    }

    pub fn degree(&self, id: SettlementId) -> usize {
        self.index
            .get(&id)
            .map(|idx| self.graph.edges(*idx).count())
            .unwrap_or(0)
    }

    pub fn neighbors(&self, id: SettlementId) -> Vec<SettlementId> {
        let Some(idx) = self.index.get(&id) else {
            return Vec::new();
        };
        self.graph.neighbors(*idx).map(|n| self.graph[n].id).collect()
    }

    /// Copy with the given routes dropped; the node set is unchanged
    pub fn without_edges(&self, removed: &BTreeSet<RouteKey>) -> Self {
        let mut copy = self.clone();
        for key in removed {
            let (a, b) = key.endpoints();
            if let (Some(a_idx), Some(b_idx)) = (copy.index.get(&a), copy.index.get(&b)) {
                if let Some(edge) = copy.graph.find_edge(*a_idx, *b_idx) {
                    copy.graph.remove_edge(edge);
                }
            }
        }
        copy
    }

    /// Connected-component label per node, in node order.
    ///
    /// Labels are the position of the component's representative node, so
    /// two nodes share a component iff their labels are equal.
    pub fn components(&self) -> Vec<usize> {
        let mut position = vec![usize::MAX; self.graph.node_bound()];
        for (pos, idx) in self.graph.node_indices().enumerate() {
            position[idx.index()] = pos;
        }

        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            sets.union(position[edge.source().index()], position[edge.target().index()]);
        }
        (0..self.graph.node_count()).map(|pos| sets.find(pos)).collect()
    }

    fn to_record(&self) -> SettlementGraphRecord {
        SettlementGraphRecord {
            nodes: self.nodes().cloned().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| SettlementEdgeRecord {
                    a: self.graph[e.source()].id,
                    b: self.graph[e.target()].id,
                    path: e.weight().path.clone(),
                })
                .collect(),
        }
    }
}
