//! Execution-plan serialization for previews and SQL compilation.

use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::catalog::FieldCatalog;
use crate::parse::types::{FusionNode, OperatorConfig};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunViewParam {
    pub nodes: Vec<RunNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunNode {
    pub id: String,
    pub name: String,
    pub src: Vec<String>,
    pub formula: Vec<RunFormula>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFormula {
    pub id: String,
    #[serde(flatten)]
    pub operator: OperatorConfig,
}

/// Flatten `nodes` (root-to-leaf) into a run param. Field references are
/// completed from `catalog`. With `stop_at`, the chain containing that
/// operator ends with it and later nodes are dropped.
pub fn get_run_view_param(
    nodes: &[&FusionNode],
    catalog: &FieldCatalog,
    stop_at: Option<&str>,
) -> RunViewParam {
    let mut out = Vec::with_capacity(nodes.len());

    for node in nodes {
        let stop_index = stop_at.and_then(|id| node.formula_index(id));
        let take = stop_index.map_or(node.formula.len(), |i| i + 1);

        let formula = node.formula[..take]
            .iter()
            .map(|f| {
                let mut operator = f.operator.clone();
                for field in operator.field_refs_mut() {
                    catalog.backfill(field);
                }
                RunFormula {
                    id: f.id.clone(),
                    operator,
                }
            })
            .collect();

        out.push(RunNode {
            id: node.id.clone(),
            name: node.name.clone(),
            src: node.src.clone(),
            formula,
        });

        if stop_index.is_some() {
            break;
        }
    }

    RunViewParam { nodes: out }
}

/// `node_id` and all of its ancestors, root-to-leaf.
pub fn upstream_nodes<'a>(arena: &'a NodeArena, node_id: &str) -> Vec<&'a FusionNode> {
    let wanted = arena.dag().ancestors_inclusive(node_id);
    let order = arena
        .dag()
        .topo_order()
        .unwrap_or_else(|_| arena.ids().to_vec());
    order
        .iter()
        .filter(|id| wanted.contains(id.as_str()))
        .filter_map(|id| arena.node(id))
        .collect()
}
