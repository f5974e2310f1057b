//! Routing graph for the pairwise route search.
//!
//! Terminals (settlement representatives) are kept as they are. Other nodes
//! with degree ≤ 1 are pruned and degree-2 chains are spliced into spans
//! that remember the nodes they replaced, so expanded paths are hop-exact.

use crate::segment::SegmentGraph;
use crate::SegmentNodeId;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub(crate) struct Span {
    hops: u32,
    /// Replaced nodes, listed walking away from `start`
    interior: Vec<SegmentNodeId>,
    start: NodeIndex,
}

impl Span {
    fn interior_from(&self, from: NodeIndex) -> Vec<SegmentNodeId> {
        if from == self.start {
            self.interior.clone()
        } else {
            self.interior.iter().rev().cloned().collect()
        }
    }
}

pub(crate) struct RoutingGraph {
    graph: StableUnGraph<SegmentNodeId, Span>,
    index: HashMap<SegmentNodeId, NodeIndex>,
    terminals: HashSet<NodeIndex>,
}

impl RoutingGraph {
    pub(crate) fn new(merged: &SegmentGraph, terminals: &HashSet<SegmentNodeId>) -> Self {
        let base = merged.inner();
        let mut graph = StableUnGraph::with_capacity(base.node_count(), base.edge_count());
        let mut index = HashMap::with_capacity(base.node_count());
        let mut mapped = HashMap::with_capacity(base.node_count());

        for idx in base.node_indices() {
            let id = base[idx].id.clone();
            let new_idx = graph.add_node(id.clone());
            index.insert(id, new_idx);
            mapped.insert(idx, new_idx);
        }
        for edge in base.edge_references() {
            let a = mapped[&edge.source()];
            let b = mapped[&edge.target()];
            graph.add_edge(
                a,
                b,
                Span {
                    hops: 1,
                    interior: Vec::new(),
                    start: a,
                },
            );
        }

        let terminals = terminals.iter().filter_map(|id| index.get(id).copied()).collect();
        Self {
            graph,
            index,
            terminals,
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn degree(&self, id: &SegmentNodeId) -> usize {
        self.index
            .get(id)
            .map(|idx| self.graph.edges(*idx).count())
            .unwrap_or(0)
    }

    /// Prune dead ends and splice chains until neither applies
    pub(crate) fn contract(&mut self) {
        let mut work: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| !self.terminals.contains(n))
            .collect();

        while let Some(node) = work.pop() {
            if !self.graph.contains_node(node) || self.terminals.contains(&node) {
                continue;
            }
            let incident: Vec<(EdgeIndex, NodeIndex)> = self
                .graph
                .edges(node)
                .map(|e| (e.id(), other_end(e.source(), e.target(), node)))
                .collect();

            match incident.as_slice() {
                [] => self.remove(node),
                [(_, neighbor)] => {
                    let neighbor = *neighbor;
                    self.remove(node);
                    work.push(neighbor);
                }
                [(first, u), (second, v)] if u != v => {
                    let (first, second, u, v) = (*first, *second, *u, *v);
                    self.splice(node, (first, u), (second, v));
                    work.push(u);
                    work.push(v);
                }
                _ => {}
            }
        }
    }

    fn remove(&mut self, node: NodeIndex) {
        if let Some(id) = self.graph.remove_node(node) {
            self.index.remove(&id);
        }
    }

    fn splice(&mut self, node: NodeIndex, left: (EdgeIndex, NodeIndex), right: (EdgeIndex, NodeIndex)) {
        let (Some(to_left), Some(to_right)) = (
            self.graph.edge_weight(left.0).cloned(),
            self.graph.edge_weight(right.0).cloned(),
        ) else {
            return;
        };
        let (u, v) = (left.1, right.1);

        // u -> ... -> node -> ... -> v
        let mut interior = to_left.interior_from(u);
        interior.push(self.graph[node].clone());
        interior.extend(to_right.interior_from(node));
        let span = Span {
            hops: to_left.hops + to_right.hops,
            interior,
            start: u,
        };

        self.remove(node);
        match self.graph.find_edge(u, v) {
            Some(existing) => {
                let shorter = self
                    .graph
                    .edge_weight(existing)
                    .is_some_and(|current| span.hops < current.hops);
                if shorter {
                    self.graph[existing] = span;
                }
            }
            None => {
                self.graph.add_edge(u, v, span);
            }
        }
    }

    /// Fewest-hop routes from `source` to every other reachable terminal,
    /// never passing through a third terminal. Paths are fully expanded.
    pub(crate) fn routes_from(&self, source: &SegmentNodeId) -> Vec<(SegmentNodeId, Vec<SegmentNodeId>)> {
        let Some(&start) = self.index.get(source) else {
            return Vec::new();
        };

        let mut dist: HashMap<NodeIndex, u32> = HashMap::from([(start, 0)]);
        let mut prev: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> = HashMap::new();
        let mut heap = BinaryHeap::from([Reverse((0u32, start))]);
        let mut reached = Vec::new();

        while let Some(Reverse((d, node))) = heap.pop() {
            if dist.get(&node).is_some_and(|best| d > *best) {
                continue;
            }
            if node != start && self.terminals.contains(&node) {
                reached.push(node);
                continue;
            }
            for edge in self.graph.edges(node) {
                let next = other_end(edge.source(), edge.target(), node);
                let candidate = d + edge.weight().hops;
                let better = dist.get(&next).map_or(true, |best| candidate < *best);
                if better {
                    dist.insert(next, candidate);
                    prev.insert(next, (node, edge.id()));
                    heap.push(Reverse((candidate, next)));
                }
            }
        }

        reached.sort();
        reached
            .into_iter()
            .filter_map(|target| {
                let path = self.expand(start, target, &prev)?;
                Some((self.graph[target].clone(), path))
            })
            .collect()
    }

    fn expand(
        &self,
        start: NodeIndex,
        target: NodeIndex,
        prev: &HashMap<NodeIndex, (NodeIndex, EdgeIndex)>,
    ) -> Option<Vec<SegmentNodeId>> {
        // Walk back to the source, then emit forwards
        let mut legs = Vec::new();
        let mut node = target;
        while node != start {
            let (before, edge) = *prev.get(&node)?;
            legs.push((before, edge));
            node = before;
        }
        legs.reverse();

        let mut path = vec![self.graph[start].clone()];
        for (from, edge) in legs {
            let span = self.graph.edge_weight(edge)?;
            let (a, b) = self.graph.edge_endpoints(edge)?;
            let to = other_end(a, b, from);
            path.extend(span.interior_from(from));
            path.push(self.graph[to].clone());
        }
        Some(path)
    }
}

fn other_end(source: NodeIndex, target: NodeIndex, from: NodeIndex) -> NodeIndex {
    if source == from {
        target
    } else {
        source
    }
}
