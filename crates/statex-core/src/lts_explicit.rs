use crate::lts::{Builder, EdgeFlags, Fingerprint};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitEdge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub context_switch: bool,
}

impl ExplicitEdge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            error: false,
            context_switch: false,
        }
    }

    pub fn switching(mut self) -> Self {
        self.context_switch = true;
        self
    }

    pub fn erroneous(mut self) -> Self {
        self.error = true;
        self
    }

    fn flags(&self) -> EdgeFlags {
        EdgeFlags {
            error: self.error,
            context_switch: self.context_switch,
        }
    }
}

/// A finite transition system written out edge by edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitGraph {
    pub initial: Vec<NodeId>,
    pub edges: Vec<ExplicitEdge>,
    #[serde(default)]
    pub accepting: Vec<NodeId>,
    #[serde(default)]
    pub goals: Vec<NodeId>,
    /// Reduced successor sets, by source node.
    #[serde(default)]
    pub ample: BTreeMap<NodeId, Vec<NodeId>>,
}

impl ExplicitGraph {
    pub fn new(initial: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            initial: initial.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn edge(mut self, edge: ExplicitEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn plain_edges(mut self, pairs: &[(NodeId, NodeId)]) -> Self {
        self.edges
            .extend(pairs.iter().map(|&(from, to)| ExplicitEdge::new(from, to)));
        self
    }

    pub fn accepting(mut self, nodes: &[NodeId]) -> Self {
        self.accepting.extend_from_slice(nodes);
        self
    }

    pub fn goals(mut self, nodes: &[NodeId]) -> Self {
        self.goals.extend_from_slice(nodes);
        self
    }

    pub fn ample(mut self, node: NodeId, successors: &[NodeId]) -> Self {
        self.ample.insert(node, successors.to_vec());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("ample set of node {node} names {successor}, which is not a successor")]
    UnknownAmpleSuccessor { node: NodeId, successor: NodeId },
}

type Successors = Vec<(NodeId, EdgeFlags)>;

/// [`Builder`] over an [`ExplicitGraph`]. Clones share the graph.
#[derive(Debug, Clone)]
pub struct ExplicitBuilder {
    graph: Arc<Indexed>,
}

#[derive(Debug)]
struct Indexed {
    initial: Vec<NodeId>,
    successors: FxHashMap<NodeId, Successors>,
    ample: FxHashMap<NodeId, Successors>,
    accepting: FxHashSet<NodeId>,
    goals: FxHashSet<NodeId>,
}

impl ExplicitBuilder {
    pub fn new(graph: &ExplicitGraph) -> Result<Self, GraphError> {
        let mut successors: FxHashMap<NodeId, Successors> = FxHashMap::default();
        for edge in &graph.edges {
            successors
                .entry(edge.from)
                .or_default()
                .push((edge.to, edge.flags()));
        }

        let mut ample = FxHashMap::default();
        for (&node, targets) in &graph.ample {
            let all = successors.get(&node).map(Vec::as_slice).unwrap_or_default();
            let mut reduced = Vec::with_capacity(targets.len());
            for &target in targets {
                let matching: Vec<_> = all.iter().filter(|(to, _)| *to == target).copied().collect();
                if matching.is_empty() {
                    return Err(GraphError::UnknownAmpleSuccessor {
                        node,
                        successor: target,
                    });
                }
                reduced.extend(matching);
            }
            ample.insert(node, reduced);
        }

        Ok(Self {
            graph: Arc::new(Indexed {
                initial: graph.initial.clone(),
                successors,
                ample,
                accepting: graph.accepting.iter().copied().collect(),
                goals: graph.goals.iter().copied().collect(),
            }),
        })
    }
}

impl Builder for ExplicitBuilder {
    type State = NodeId;
    type Label = EdgeFlags;

    fn initials(&mut self) -> impl Iterator<Item = NodeId> {
        self.graph.initial.iter().copied()
    }

    fn edges(&mut self, from: &NodeId) -> impl Iterator<Item = (NodeId, EdgeFlags)> {
        self.graph
            .successors
            .get(from)
            .into_iter()
            .flat_map(|successors| successors.iter().copied())
    }

    fn hash(&self, state: &NodeId) -> Fingerprint {
        splitmix64(u64::from(*state))
    }

    fn equal(&self, left: &NodeId, right: &NodeId) -> bool {
        left == right
    }

    fn ample_edges(&mut self, from: &NodeId) -> Option<Vec<(NodeId, EdgeFlags)>> {
        self.graph.ample.get(from).cloned()
    }

    fn is_accepting(&self, state: &NodeId) -> bool {
        self.graph.accepting.contains(state)
    }

    fn is_goal(&self, state: &NodeId) -> bool {
        self.graph.goals.contains(state)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ample_sets_must_name_existing_successors() {
        let graph = ExplicitGraph::new([0]).plain_edges(&[(0, 1)]).ample(0, &[2]);
        assert_eq!(
            ExplicitBuilder::new(&graph).unwrap_err(),
            GraphError::UnknownAmpleSuccessor {
                node: 0,
                successor: 2
            }
        );
    }

    #[test]
    fn edges_keep_their_flags() {
        let graph = ExplicitGraph::new([0])
            .edge(ExplicitEdge::new(0, 1).switching())
            .edge(ExplicitEdge::new(0, 2).erroneous());
        let mut builder = ExplicitBuilder::new(&graph).expect("valid graph");
        let edges: Vec<_> = builder.edges(&0).collect();
        assert_eq!(
            edges,
            vec![(1, EdgeFlags::context_switch()), (2, EdgeFlags::error())]
        );
        assert_eq!(builder.edges(&7).count(), 0);
    }

    #[test]
    fn parses_the_json_layout() {
        let graph: ExplicitGraph = serde_json::from_str(
            r#"{"initial":[1],"edges":[{"from":1,"to":2,"context_switch":true}],"ample":{"1":[2]}}"#,
        )
        .expect("valid json");
        assert_eq!(graph.edges, vec![ExplicitEdge::new(1, 2).switching()]);
        assert_eq!(graph.ample.get(&1), Some(&vec![2]));
    }
}
