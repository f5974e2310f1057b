//! Route index: which red edges depend on which blue nodes

use crate::segment::SegmentGraph;
use crate::settlement::{RouteKey, SettlementGraph};
use crate::{NetworkError, Result, SegmentNodeId, SettlementId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Cached length of a red edge in the base segment graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteBaseline {
    /// Representatives are adjacent; the route cannot be broken
    Direct,
    /// Hop count between the true endpoints and one shortest path realising it
    Reachable { hops: u32, witness: Vec<SegmentNodeId> },
    /// True endpoints were already disconnected in the base graph
    Unreachable,
}

impl RouteBaseline {
    fn compute(segments: &SegmentGraph, first: &SegmentNodeId, last: &SegmentNodeId) -> Self {
        match segments.shortest_path(first, last) {
            Some(witness) => RouteBaseline::Reachable {
                hops: witness.len().saturating_sub(1) as u32,
                witness,
            },
            None => RouteBaseline::Unreachable,
        }
    }

    pub fn hops(&self) -> Option<u32> {
        match self {
            RouteBaseline::Reachable { hops, .. } => Some(*hops),
            _ => None,
        }
    }

    fn witness(&self) -> &[SegmentNodeId] {
        match self {
            RouteBaseline::Reachable { witness, .. } => witness,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteIndexEntry {
    pub a: SettlementId,
    pub b: SettlementId,
    pub baseline: RouteBaseline,
}

/// Persisted form; the node lookup is rebuilt on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteIndexRecord {
    pub entries: Vec<RouteIndexEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteIndex {
    by_node: HashMap<SegmentNodeId, BTreeSet<RouteKey>>,
    baselines: BTreeMap<RouteKey, RouteBaseline>,
}

impl RouteIndex {
    /// Compute baselines for every red edge against the base segment graph
    pub fn build(segments: &SegmentGraph, settlements: &SettlementGraph) -> Self {
        let baselines = settlements
            .edges()
            .map(|(key, edge)| {
                let baseline = match edge.true_endpoints() {
                    None => RouteBaseline::Direct,
                    Some((first, last)) => RouteBaseline::compute(segments, first, last),
                };
                (key, baseline)
            })
            .collect();

        let index = Self::assemble(settlements, baselines);
        debug!(
            "Indexed {} routes over {} road nodes",
            index.baselines.len(),
            index.by_node.len()
        );
        index
    }

    /// Restore a persisted index; every red edge must have a baseline
    pub fn from_record(settlements: &SettlementGraph, record: RouteIndexRecord) -> Result<Self> {
        let baselines: BTreeMap<RouteKey, RouteBaseline> = record
            .entries
            .into_iter()
            .map(|entry| (RouteKey::new(entry.a, entry.b), entry.baseline))
            .collect();

        for (key, _) in settlements.edges() {
            if !baselines.contains_key(&key) {
                let (a, b) = key.endpoints();
                return Err(NetworkError::MalformedInput(format!(
                    "route index has no baseline for route {} - {}",
                    a, b
                )));
            }
        }
        Ok(Self::assemble(settlements, baselines))
    }

    pub fn to_record(&self) -> RouteIndexRecord {
        RouteIndexRecord {
            entries: self
                .baselines
                .iter()
                .map(|(key, baseline)| {
                    let (a, b) = key.endpoints();
                    RouteIndexEntry {
                        a,
                        b,
                        baseline: baseline.clone(),
                    }
                })
                .collect(),
        }
    }

    fn assemble(settlements: &SettlementGraph, baselines: BTreeMap<RouteKey, RouteBaseline>) -> Self {
        let mut by_node: HashMap<SegmentNodeId, BTreeSet<RouteKey>> = HashMap::new();
        for (key, edge) in settlements.edges() {
            let witness = baselines.get(&key).map(|b| b.witness()).unwrap_or(&[]);
            for id in edge.interior().iter().chain(witness) {
                by_node.entry(id.clone()).or_default().insert(key);
            }
        }
        Self { by_node, baselines }
    }

    pub fn baseline(&self, key: RouteKey) -> Option<&RouteBaseline> {
        self.baselines.get(&key)
    }

    pub fn routes_through(&self, id: &SegmentNodeId) -> Option<&BTreeSet<RouteKey>> {
        self.by_node.get(id)
    }

    /// Red edges whose cached path or witness touches a removed node
    pub fn at_risk<'a>(&self, removed: impl IntoIterator<Item = &'a SegmentNodeId>) -> BTreeSet<RouteKey> {
        removed
            .into_iter()
            .filter_map(|id| self.by_node.get(id))
            .flatten()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}
