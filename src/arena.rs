//! Id-indexed node arena with generation-stamped snapshots.
//!
//! Nodes are never patched in place: every update stores a new immutable
//! snapshot. Validation runs take a ticket with [`NodeArena::begin`] and may
//! only [`NodeArena::commit`] while that ticket is still the newest one, so a
//! result computed against a superseded state is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::FusionError;
use crate::parse::graph::FusionDag;
use crate::parse::types::{Formula, FusionGraph, FusionNode};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub generation: u64,
    pub node: FusionNode,
}

#[derive(Debug, Clone)]
pub struct NodeArena {
    slots: HashMap<String, Arc<NodeSnapshot>>,
    /// Canvas order, used for deterministic traversal.
    order: Vec<String>,
    /// Newest ticket handed out per node.
    issued: HashMap<String, u64>,
    dag: Arc<FusionDag>,
}

impl NodeArena {
    /// Load a saved graph. Node names must be unique because SQL templates
    /// address views by name; later duplicates get the next free suffix.
    pub fn from_graph(mut graph: FusionGraph) -> Result<Self, Vec<FusionError>> {
        let dag = FusionDag::build(&graph.nodes)?;
        let mut taken: HashSet<String> = graph.nodes.iter().map(|n| n.name.clone()).collect();
        let mut seen: HashSet<String> = HashSet::with_capacity(graph.nodes.len());
        for node in &mut graph.nodes {
            if seen.insert(node.name.clone()) {
                continue;
            }
            let renamed = (1..)
                .map(|n| format!("{}_{}", node.name, n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| node.id.clone());
            warn!(node = %node.id, from = %node.name, to = %renamed, "duplicate node name renamed");
            taken.insert(renamed.clone());
            seen.insert(renamed.clone());
            node.name = renamed;
        }
        let mut slots = HashMap::with_capacity(graph.nodes.len());
        let mut order = Vec::with_capacity(graph.nodes.len());
        for node in graph.nodes {
            order.push(node.id.clone());
            slots.insert(
                node.id.clone(),
                Arc::new(NodeSnapshot {
                    generation: 0,
                    node,
                }),
            );
        }
        Ok(NodeArena {
            slots,
            order,
            issued: HashMap::new(),
            dag: Arc::new(dag),
        })
    }

    pub fn to_graph(&self) -> FusionGraph {
        FusionGraph {
            nodes: self.nodes().cloned().collect(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&FusionNode> {
        self.slots.get(id).map(|s| &s.node)
    }

    pub fn snapshot(&self, id: &str) -> Option<Arc<NodeSnapshot>> {
        self.slots.get(id).cloned()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&FusionNode> {
        self.nodes().find(|n| n.name == name)
    }

    /// Nodes in canvas order.
    pub fn nodes(&self) -> impl Iterator<Item = &FusionNode> {
        self.order.iter().filter_map(|id| self.node(id))
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dag(&self) -> &FusionDag {
        &self.dag
    }

    pub fn generation(&self, id: &str) -> u64 {
        self.slots.get(id).map(|s| s.generation).unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Generations
    // -------------------------------------------------------------------------

    /// Hand out a fresh ticket for `id`, invalidating older ones.
    pub fn begin(&mut self, id: &str) -> u64 {
        let floor = self.generation(id);
        let ticket = self.issued.entry(id.to_string()).or_insert(floor);
        *ticket += 1;
        *ticket
    }

    pub fn is_current(&self, id: &str, ticket: u64) -> bool {
        self.issued.get(id).copied() == Some(ticket)
    }

    /// Store `node` if `ticket` is still the newest for it. Structural fields
    /// (`src`) are taken from the stored snapshot, never from the result.
    pub fn commit(&mut self, mut node: FusionNode, ticket: u64) -> bool {
        if !self.is_current(&node.id, ticket) {
            debug!(node = %node.id, ticket, "discarding stale result");
            return false;
        }
        let Some(current) = self.slots.get(&node.id) else {
            return false;
        };
        node.src = current.node.src.clone();
        self.slots.insert(
            node.id.clone(),
            Arc::new(NodeSnapshot {
                generation: ticket,
                node,
            }),
        );
        true
    }

    /// Unconditional replacement (authoring edits). Returns the new generation.
    pub fn replace(&mut self, node: FusionNode) -> u64 {
        let ticket = self.begin(&node.id);
        self.slots.insert(
            node.id.clone(),
            Arc::new(NodeSnapshot {
                generation: ticket,
                node,
            }),
        );
        ticket
    }

    // -------------------------------------------------------------------------
    // Authoring
    // -------------------------------------------------------------------------

    /// `desired`, or `desired_N` with the smallest free N.
    pub fn unique_name(&self, desired: &str) -> String {
        if self.node_by_name(desired).is_none() {
            return desired.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", desired, n))
            .find(|candidate| self.node_by_name(candidate).is_none())
            .unwrap_or_else(|| desired.to_string())
    }

    /// Add a node, renaming it on collision. Returns the name actually used.
    pub fn insert_node(&mut self, mut node: FusionNode) -> Result<String, Vec<FusionError>> {
        if self.slots.contains_key(&node.id) {
            return Err(vec![FusionError::graph(
                "G001",
                format!("Duplicate node id '{}'", node.id),
                Some(node.id.clone()),
            )]);
        }
        node.name = self.unique_name(&node.name);
        let name = node.name.clone();
        let mut order = self.order.clone();
        order.push(node.id.clone());
        self.rebuild_with(order, Some(node))?;
        Ok(name)
    }

    /// Remove a node and every edge pointing at it.
    pub fn remove_node(&mut self, id: &str) -> Option<FusionNode> {
        let removed = self.slots.remove(id)?;
        self.order.retain(|n| n != id);
        self.issued.remove(id);
        let dependents: Vec<FusionNode> = self
            .nodes()
            .filter(|n| n.src.iter().any(|s| s == id))
            .cloned()
            .collect();
        for mut node in dependents {
            node.src.retain(|s| s != id);
            self.replace(node);
        }
        // removing vertices and edges cannot introduce errors
        let nodes: Vec<&FusionNode> = self.nodes().collect();
        if let Ok(dag) = FusionDag::build(nodes) {
            self.dag = Arc::new(dag);
        }
        Some(removed.node.clone())
    }

    /// Append `source` to `target.src`. Refuses edges that would close a cycle.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<(), Vec<FusionError>> {
        if self.dag.ancestors_inclusive(source).contains(target) {
            return Err(vec![FusionError::graph(
                "G004",
                format!("Connecting '{}' to '{}' would create a cycle", source, target),
                Some(target.to_string()),
            )]);
        }
        let mut node = self.require(target)?.clone();
        node.src.push(source.to_string());
        self.rebuild_with(self.order.clone(), Some(node))
    }

    pub fn disconnect(&mut self, source: &str, target: &str) -> Result<(), Vec<FusionError>> {
        let mut node = self.require(target)?.clone();
        node.src.retain(|s| s != source);
        self.rebuild_with(self.order.clone(), Some(node))
    }

    /// Add `formula` to the node's chain, or replace the operator with the same id.
    pub fn set_formula(&mut self, node_id: &str, formula: Formula) -> Result<u64, Vec<FusionError>> {
        let mut node = self.require(node_id)?.clone();
        match node.formula_index(&formula.id) {
            Some(i) => node.formula[i] = formula,
            None => node.formula.push(formula),
        }
        Ok(self.replace(node))
    }

    pub fn rename_node(&mut self, node_id: &str, name: &str) -> Result<String, Vec<FusionError>> {
        let mut node = self.require(node_id)?.clone();
        if node.name == name {
            return Ok(node.name);
        }
        node.name = self.unique_name(name);
        let name = node.name.clone();
        self.replace(node);
        Ok(name)
    }

    pub fn require(&self, id: &str) -> Result<&FusionNode, Vec<FusionError>> {
        self.node(id).ok_or_else(|| {
            vec![FusionError::graph(
                "G005",
                format!("Unknown node '{}'", id),
                Some(id.to_string()),
            )]
        })
    }

    /// Rebuild the DAG with `changed` applied; the arena is untouched on error.
    fn rebuild_with(
        &mut self,
        order: Vec<String>,
        changed: Option<FusionNode>,
    ) -> Result<(), Vec<FusionError>> {
        let nodes: Vec<&FusionNode> = order
            .iter()
            .filter_map(|id| match &changed {
                Some(n) if &n.id == id => Some(n),
                _ => self.node(id),
            })
            .collect();
        let dag = FusionDag::build(nodes)?;
        self.order = order;
        self.dag = Arc::new(dag);
        if let Some(node) = changed {
            self.replace(node);
        }
        Ok(())
    }
}
