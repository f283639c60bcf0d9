//! petgraph-based directed graph over the nodes' `src` lists.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};

use super::types::FusionNode;
use crate::error::FusionError;

#[derive(Debug, Clone)]
pub struct FusionDag {
    pub graph: DiGraph<String, ()>,
    pub node_indices: HashMap<String, NodeIndex>,
}

impl FusionDag {
    /// Build the DAG. Duplicate node ids and `src` entries naming unknown
    /// nodes are reported together.
    pub fn build<'a>(
        nodes: impl IntoIterator<Item = &'a FusionNode> + Clone,
    ) -> Result<Self, Vec<FusionError>> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        let mut errors = Vec::new();

        for node in nodes.clone() {
            if node_indices.contains_key(&node.id) {
                errors.push(FusionError::graph(
                    "G001",
                    format!("Duplicate node id '{}'", node.id),
                    Some(node.id.clone()),
                ));
                continue;
            }
            let idx = graph.add_node(node.id.clone());
            node_indices.insert(node.id.clone(), idx);
        }

        for node in nodes {
            let Some(&target) = node_indices.get(&node.id) else {
                continue;
            };
            let mut seen = HashSet::new();
            for source in &node.src {
                if !seen.insert(source.as_str()) {
                    errors.push(FusionError::graph(
                        "G003",
                        format!("Node '{}' lists source '{}' twice", node.id, source),
                        Some(node.id.clone()),
                    ));
                    continue;
                }
                match node_indices.get(source) {
                    Some(&s) => {
                        graph.add_edge(s, target, ());
                    }
                    None => errors.push(FusionError::graph(
                        "G002",
                        format!(
                            "Node '{}' references unknown source node '{}'",
                            node.id, source
                        ),
                        Some(node.id.clone()),
                    )),
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(FusionDag {
            graph,
            node_indices,
        })
    }

    /// Nodes whose `src` includes `node_id`.
    pub fn targets(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    pub fn sources(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, Direction::Incoming)
    }

    fn neighbors(&self, node_id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return vec![];
        };
        // petgraph yields neighbours newest-edge first
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.reverse();
        out
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Node ids in topological order, or the id of a node on a cycle.
    pub fn topo_order(&self) -> Result<Vec<String>, String> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .map_err(|cycle| self.graph[cycle.node_id()].clone())
    }

    /// `node_id` and everything upstream of it.
    pub fn ancestors_inclusive(&self, node_id: &str) -> HashSet<String> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return HashSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, idx);
        let mut out = HashSet::new();
        while let Some(nx) = bfs.next(reversed) {
            out.insert(self.graph[nx].clone());
        }
        out
    }

    /// `node_id` and everything downstream of it.
    pub fn descendants_inclusive(&self, node_id: &str) -> HashSet<String> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return HashSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, idx);
        let mut out = HashSet::new();
        while let Some(nx) = bfs.next(&self.graph) {
            out.insert(self.graph[nx].clone());
        }
        out
    }

    pub fn incoming_count(&self, node_id: &str) -> usize {
        self.sources(node_id).len()
    }
}
