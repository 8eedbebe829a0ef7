//! Graph preparation: turning a [`WorkflowDocument`] into the engine's
//! immutable, id-indexed node map with per-node outgoing transitions.
//!
//! Preparation drops presentation-only fields and computes, for every
//! node, an ordered list of `(port label, target node id)` transitions.
//! Non-condition nodes get the implicit `"next"` port; condition nodes
//! carry the branch key declared on each edge. Edge-declaration order is
//! preserved, and every edge endpoint must resolve to a node in the map.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Edge, NodeRecord, WorkflowDocument};
use crate::error::GraphError;

/// The implicit port label on every non-branching transition.
pub const NEXT_PORT: &str = "next";

/// Node type strings with engine-level meaning.
pub const START_KIND: &str = "start";
pub const END_KIND: &str = "end";
pub const CONDITION_KIND: &str = "condition";

/// A node after preparation: cleaned record plus outgoing transitions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PreparedNode {
    pub id: String,
    pub kind: String,
    pub data: Value,
    /// Ordered `(port label, target id)` pairs.
    pub transitions: Vec<(String, String)>,
}

impl PreparedNode {
    /// First transition target regardless of port, if any.
    pub fn first_successor(&self) -> Option<&str> {
        self.transitions.first().map(|(_, target)| target.as_str())
    }
}

/// The engine's immutable view of one workflow graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PreparedGraph {
    nodes: FxHashMap<String, PreparedNode>,
}

impl PreparedGraph {
    /// Build a prepared graph from raw node and edge lists.
    pub fn prepare(nodes: &[NodeRecord], edges: &[Edge]) -> Result<Self, GraphError> {
        let mut prepared: FxHashMap<String, PreparedNode> = FxHashMap::default();
        for record in nodes {
            let node = PreparedNode {
                id: record.id.clone(),
                kind: record.kind.clone(),
                data: record.data.clone(),
                transitions: Vec::new(),
            };
            if prepared.insert(record.id.clone(), node).is_some() {
                return Err(GraphError::DuplicateNode {
                    node_id: record.id.clone(),
                });
            }
        }

        for edge in edges {
            if !prepared.contains_key(&edge.target_node_id) {
                return Err(GraphError::UnknownEdgeTarget {
                    node_id: edge.target_node_id.clone(),
                });
            }
            let Some(source) = prepared.get_mut(&edge.source_node_id) else {
                return Err(GraphError::UnknownEdgeSource {
                    node_id: edge.source_node_id.clone(),
                });
            };
            let port = if source.kind == CONDITION_KIND {
                edge.source_port_id
                    .clone()
                    .ok_or_else(|| GraphError::MissingBranchPort {
                        node_id: source.id.clone(),
                    })?
            } else {
                NEXT_PORT.to_string()
            };
            source.transitions.push((port, edge.target_node_id.clone()));
        }

        Ok(Self { nodes: prepared })
    }

    pub fn from_document(document: &WorkflowDocument) -> Result<Self, GraphError> {
        Self::prepare(&document.nodes, &document.edges)
    }

    pub fn get(&self, node_id: &str) -> Option<&PreparedNode> {
        self.nodes.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreparedNode> {
        self.nodes.values()
    }

    /// Ids of every node with the given type string.
    pub fn ids_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .values()
            .filter(move |node| node.kind == kind)
            .map(|node| node.id.as_str())
    }

    /// The unique start node, when exactly one exists.
    pub fn start_node(&self) -> Option<&PreparedNode> {
        let mut starts = self.nodes.values().filter(|node| node.kind == START_KIND);
        let first = starts.next()?;
        if starts.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn start_count(&self) -> usize {
        self.ids_of_kind(START_KIND).count()
    }

    pub fn has_end(&self) -> bool {
        self.ids_of_kind(END_KIND).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, kind: &str) -> NodeRecord {
        NodeRecord::new(id, kind, json!({}))
    }

    #[test]
    fn transitions_preserve_edge_order() {
        let nodes = vec![
            record("a", "start"),
            record("b", "print"),
            record("c", "end"),
        ];
        let edges = vec![Edge::new("a", "b"), Edge::new("a", "c"), Edge::new("b", "c")];
        let graph = PreparedGraph::prepare(&nodes, &edges).unwrap();
        let a = graph.get("a").unwrap();
        assert_eq!(
            a.transitions,
            vec![
                (NEXT_PORT.to_string(), "b".to_string()),
                (NEXT_PORT.to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn condition_edges_carry_their_port() {
        let nodes = vec![record("cond", "condition"), record("x", "end")];
        let edges = vec![Edge::new("cond", "x").with_port("if_a")];
        let graph = PreparedGraph::prepare(&nodes, &edges).unwrap();
        assert_eq!(
            graph.get("cond").unwrap().transitions,
            vec![("if_a".to_string(), "x".to_string())]
        );
    }

    #[test]
    fn condition_edge_without_port_is_rejected() {
        let nodes = vec![record("cond", "condition"), record("x", "end")];
        let edges = vec![Edge::new("cond", "x")];
        assert!(matches!(
            PreparedGraph::prepare(&nodes, &edges),
            Err(GraphError::MissingBranchPort { .. })
        ));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let nodes = vec![record("a", "start")];
        let edges = vec![Edge::new("a", "ghost")];
        assert!(matches!(
            PreparedGraph::prepare(&nodes, &edges),
            Err(GraphError::UnknownEdgeTarget { .. })
        ));
    }

    #[test]
    fn meta_is_dropped_from_prepared_nodes() {
        let mut node = record("a", "start");
        node.meta = json!({ "position": { "x": 10, "y": 20 } });
        let graph = PreparedGraph::prepare(&[node], &[]).unwrap();
        let encoded = serde_json::to_string(graph.get("a").unwrap()).unwrap();
        assert!(!encoded.contains("position"));
    }

    #[test]
    fn start_node_requires_uniqueness() {
        let nodes = vec![record("a", "start"), record("b", "start")];
        let graph = PreparedGraph::prepare(&nodes, &[]).unwrap();
        assert!(graph.start_node().is_none());
        assert_eq!(graph.start_count(), 2);
    }
}
