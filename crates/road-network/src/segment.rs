//! Segment view: road waypoints joined by straight road segments

use crate::{NetworkError, Result, SegmentNodeId};
use geo_location::{GeoBox, GeoLocation};
use petgraph::algo::astar;
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences, VisitMap, Visitable};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A blue node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentNode {
    pub id: SegmentNodeId,
    pub position: GeoLocation,
    /// Set once the node is absorbed into a settlement's representative
    #[serde(default)]
    pub mapped_to_city: bool,
}

impl SegmentNode {
    pub fn new(id: impl Into<SegmentNodeId>, position: GeoLocation) -> Self {
        Self {
            id: id.into(),
            position,
            mapped_to_city: false,
        }
    }
}

/// A blue edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEdge {
    pub a: SegmentNodeId,
    pub b: SegmentNodeId,
    pub length: f64,
}

impl SegmentEdge {
    pub fn new(a: impl Into<SegmentNodeId>, b: impl Into<SegmentNodeId>, length: f64) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            length,
        }
    }

    pub fn key(&self) -> SegmentEdgeKey {
        SegmentEdgeKey::new(self.a.clone(), self.b.clone())
    }
}

/// Order-independent identity of a blue edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentEdgeKey(SegmentNodeId, SegmentNodeId);

impl SegmentEdgeKey {
    pub fn new(a: SegmentNodeId, b: SegmentNodeId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn endpoints(&self) -> (&SegmentNodeId, &SegmentNodeId) {
        (&self.0, &self.1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentGraphRecord {
    nodes: Vec<SegmentNode>,
    edges: Vec<SegmentEdge>,
}

/// The blue graph.
///
/// Node and edge iteration follow storage order, which is also the order
/// the graph is persisted in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "SegmentGraphRecord", into = "SegmentGraphRecord")]
pub struct SegmentGraph {
    graph: StableUnGraph<SegmentNode, f64>,
    node_index: HashMap<SegmentNodeId, NodeIndex>,
}

impl TryFrom<SegmentGraphRecord> for SegmentGraph {
    type Error = NetworkError;

    fn try_from(record: SegmentGraphRecord) -> Result<Self> {
        SegmentGraph::build(record.nodes, record.edges)
    }
}

impl From<SegmentGraph> for SegmentGraphRecord {
    fn from(graph: SegmentGraph) -> Self {
        graph.to_record()
    }
}

impl PartialEq for SegmentGraph {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.to_record(), other.to_record());
        a.nodes == b.nodes && a.edges == b.edges
    }
}

impl SegmentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk load.
    ///
    /// Fails on duplicate node ids, dangling edge endpoints and invalid
    /// lengths. Self-loops are dropped; repeated edges keep the shorter length.
    pub fn build(nodes: Vec<SegmentNode>, edges: Vec<SegmentEdge>) -> Result<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            if !edge.length.is_finite() || edge.length < 0.0 {
                return Err(NetworkError::MalformedInput(format!(
                    "road {} - {} has invalid length {}",
                    edge.a, edge.b, edge.length
                )));
            }
            graph.connect(&edge.a, &edge.b, edge.length)?;
        }
        Ok(graph)
    }

    pub(crate) fn add_node(&mut self, node: SegmentNode) -> Result<NodeIndex> {
        if self.node_index.contains_key(&node.id) {
            return Err(NetworkError::MalformedInput(format!(
                "duplicate waypoint id {}",
                node.id
            )));
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        Ok(idx)
    }

    /// Add or shorten the edge between two existing nodes
    pub(crate) fn connect(&mut self, a: &SegmentNodeId, b: &SegmentNodeId, length: f64) -> Result<()> {
        let a_idx = self.require(a)?;
        let b_idx = self.require(b)?;
        if a_idx == b_idx {
            return Ok(());
        }
        match self.graph.find_edge(a_idx, b_idx) {
            Some(edge) => {
                if let Some(existing) = self.graph.edge_weight_mut(edge) {
                    if length < *existing {
                        *existing = length;
                    }
                }
            }
            None => {
                self.graph.add_edge(a_idx, b_idx, length);
            }
        }
        Ok(())
    }

    fn require(&self, id: &SegmentNodeId) -> Result<NodeIndex> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| NetworkError::MalformedInput(format!("road references unknown waypoint {}", id)))
    }

    pub(crate) fn remove_node_in_place(&mut self, id: &SegmentNodeId) -> Option<SegmentNode> {
        let idx = self.node_index.remove(id)?;
        self.graph.remove_node(idx)
    }

    pub(crate) fn mark_mapped(&mut self, id: &SegmentNodeId) {
        if let Some(idx) = self.node_index.get(id) {
            self.graph[*idx].mapped_to_city = true;
        }
    }

    /// Independent clone
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// New graph without the given nodes and their incident edges
    pub fn remove_nodes<'a>(&self, ids: impl IntoIterator<Item = &'a SegmentNodeId>) -> Self {
        let mut copy = self.copy();
        for id in ids {
            copy.remove_node_in_place(id);
        }
        copy
    }

    pub fn contains(&self, id: &SegmentNodeId) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &SegmentNodeId) -> Option<&SegmentNode> {
        self.node_index.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SegmentNode> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&SegmentNode, &SegmentNode, f64)> {
        self.graph.edge_references().map(move |e| {
            (&self.graph[e.source()], &self.graph[e.target()], *e.weight())
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn degree(&self, id: &SegmentNodeId) -> usize {
        self.node_index
            .get(id)
            .map(|idx| self.graph.edges(*idx).count())
            .unwrap_or(0)
    }

    /// Neighbours with the connecting segment length
    pub fn neighbors(&self, id: &SegmentNodeId) -> Vec<(&SegmentNodeId, f64)> {
        let Some(idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges(*idx)
            .map(|e| {
                let other = if e.source() == *idx { e.target() } else { e.source() };
                (&self.graph[other].id, *e.weight())
            })
            .collect()
    }

    /// Box around every node position
    pub fn bounds(&self) -> Option<GeoBox> {
        let mut positions = self.nodes().map(|n| n.position);
        let first = positions.next()?;
        let (mut min_lat, mut max_lat) = (first.latitude(), first.latitude());
        let (mut min_lon, mut max_lon) = (first.longitude(), first.longitude());
        for p in positions {
            min_lat = min_lat.min(p.latitude());
            max_lat = max_lat.max(p.latitude());
            min_lon = min_lon.min(p.longitude());
            max_lon = max_lon.max(p.longitude());
        }
        Some(GeoBox::new(
            GeoLocation::saturating(min_lat, min_lon),
            GeoLocation::saturating(max_lat, max_lon),
        ))
    }

    /// Unweighted hop count; `None` when unreachable or either end is absent
    pub fn shortest_path_length(&self, a: &SegmentNodeId, b: &SegmentNodeId) -> Option<u32> {
        self.bfs_hops(a, b, None)
    }

    /// Like [`Self::shortest_path_length`] but gives up beyond `limit` hops
    pub fn shortest_path_length_within(
        &self,
        a: &SegmentNodeId,
        b: &SegmentNodeId,
        limit: u32,
    ) -> Option<u32> {
        self.bfs_hops(a, b, Some(limit))
    }

    fn bfs_hops(&self, a: &SegmentNodeId, b: &SegmentNodeId, limit: Option<u32>) -> Option<u32> {
        let start = *self.node_index.get(a)?;
        let goal = *self.node_index.get(b)?;
        if start == goal {
            return Some(0);
        }

        let mut visited = self.graph.visit_map();
        visited.visit(start);
        let mut queue = VecDeque::from([(start, 0u32)]);

        while let Some((node, hops)) = queue.pop_front() {
            if limit.is_some_and(|l| hops >= l) {
                continue;
            }
            for next in self.graph.neighbors(node) {
                if next == goal {
                    return Some(hops + 1);
                }
                if visited.visit(next) {
                    queue.push_back((next, hops + 1));
                }
            }
        }
        None
    }

    /// One shortest path (fewest hops) as node ids, both ends included
    pub fn shortest_path(&self, a: &SegmentNodeId, b: &SegmentNodeId) -> Option<Vec<SegmentNodeId>> {
        let start = *self.node_index.get(a)?;
        let goal = *self.node_index.get(b)?;

        let (_, path) = astar(&self.graph, start, |n| n == goal, |_| 1u32, |_| 0)?;
        Some(path.into_iter().map(|idx| self.graph[idx].id.clone()).collect())
    }

    pub(crate) fn inner(&self) -> &StableUnGraph<SegmentNode, f64> {
        &self.graph
    }

    fn to_record(&self) -> SegmentGraphRecord {
        SegmentGraphRecord {
            nodes: self.nodes().cloned().collect(),
            edges: self
                .edges()
                .map(|(a, b, length)| SegmentEdge::new(a.id.clone(), b.id.clone(), length))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64) -> GeoLocation {
        GeoLocation::new(lat, lon).unwrap()
    }

    /// a - b - c - d with a shortcut a - d, plus isolated e
    fn create_test_graph() -> SegmentGraph {
        let nodes = vec![
            SegmentNode::new("a", loc(0.0, 0.0)),
            SegmentNode::new("b", loc(0.0, 0.1)),
            SegmentNode::new("c", loc(0.0, 0.2)),
            SegmentNode::new("d", loc(0.0, 0.3)),
            SegmentNode::new("e", loc(1.0, 1.0)),
        ];
        let edges = vec![
            SegmentEdge::new("a", "b", 1.0),
            SegmentEdge::new("b", "c", 1.0),
            SegmentEdge::new("c", "d", 1.0),
            SegmentEdge::new("a", "d", 5.0),
        ];
        SegmentGraph::build(nodes, edges).unwrap()
    }

    #[test]
    fn test_build_counts() {
        let graph = create_test_graph();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.degree(&"a".into()), 2);
        assert_eq!(graph.degree(&"e".into()), 0);
    }

    #[test]
    fn test_build_rejects_dangling_edge() {
        let nodes = vec![SegmentNode::new("a", loc(0.0, 0.0))];
        let edges = vec![SegmentEdge::new("a", "ghost", 1.0)];
        let err = SegmentGraph::build(nodes, edges).unwrap_err();
        assert!(matches!(err, NetworkError::MalformedInput(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_node() {
        let nodes = vec![
            SegmentNode::new("a", loc(0.0, 0.0)),
            SegmentNode::new("a", loc(1.0, 0.0)),
        ];
        assert!(SegmentGraph::build(nodes, vec![]).is_err());
    }

    #[test]
    fn test_repeated_edge_keeps_shorter() {
        let nodes = vec![
            SegmentNode::new("a", loc(0.0, 0.0)),
            SegmentNode::new("b", loc(0.0, 1.0)),
        ];
        let edges = vec![
            SegmentEdge::new("a", "b", 4.0),
            SegmentEdge::new("b", "a", 2.0),
            SegmentEdge::new("a", "a", 1.0),
        ];
        let graph = SegmentGraph::build(nodes, edges).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors(&"a".into()), vec![(&SegmentNodeId::from("b"), 2.0)]);
    }

    #[test]
    fn test_shortest_path_length_is_hop_count() {
        let graph = create_test_graph();
        // The a-d shortcut is long but only one hop
        assert_eq!(graph.shortest_path_length(&"a".into(), &"d".into()), Some(1));
        assert_eq!(graph.shortest_path_length(&"b".into(), &"d".into()), Some(2));
        assert_eq!(graph.shortest_path_length(&"c".into(), &"c".into()), Some(0));
        assert_eq!(graph.shortest_path_length(&"a".into(), &"e".into()), None);
        assert_eq!(graph.shortest_path_length(&"a".into(), &"zz".into()), None);
    }

    #[test]
    fn test_bounded_search() {
        let graph = create_test_graph();
        let b = SegmentNodeId::from("b");
        let d = SegmentNodeId::from("d");
        assert_eq!(graph.shortest_path_length_within(&b, &d, 2), Some(2));
        assert_eq!(graph.shortest_path_length_within(&b, &d, 1), None);
    }

    #[test]
    fn test_remove_nodes_leaves_receiver_untouched() {
        let graph = create_test_graph();
        let removed = [SegmentNodeId::from("c")];
        let damaged = graph.remove_nodes(removed.iter());

        assert_eq!(graph.node_count(), 5);
        assert_eq!(damaged.node_count(), 4);
        assert_eq!(damaged.edge_count(), 2);
        assert!(!damaged.contains(&"c".into()));
        assert_eq!(damaged.shortest_path_length(&"b".into(), &"d".into()), Some(2));
        assert_eq!(damaged.shortest_path_length(&"b".into(), &"c".into()), None);
    }

    #[test]
    fn test_shortest_path_nodes() {
        let graph = create_test_graph();
        let path = graph.shortest_path(&"b".into(), &"d".into()).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.first().unwrap().as_str(), "b");
        assert_eq!(path.last().unwrap().as_str(), "d");
        assert!(graph.shortest_path(&"a".into(), &"e".into()).is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let graph = create_test_graph();
        let json = serde_json::to_string(&graph).unwrap();
        let parsed: SegmentGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
    }

    #[test]
    fn test_bounds() {
        let graph = create_test_graph();
        let bounds = graph.bounds().unwrap();
        assert_eq!(bounds.south_west, loc(0.0, 0.0));
        assert_eq!(bounds.north_east, loc(1.0, 1.0));
        assert!(SegmentGraph::new().bounds().is_none());
    }
}
