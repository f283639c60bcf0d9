//! Dependency-ordered revalidation of the node graph.
//!
//! Nodes are processed frontier by frontier (Kahn's algorithm over the `src`
//! edges). Every node of a frontier only depends on nodes that are already
//! resolved, so a frontier is validated concurrently and each node is visited
//! exactly once per pass, however many paths lead to it.

use std::collections::HashSet;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::arena::NodeArena;
use crate::context::ValidationContext;
use crate::parse::types::{Field, FormulaError, FusionNode};
use crate::validate::{FormulaOutcome, Upstream, chain, check_formula};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkReport {
    /// Nodes validated, in commit order.
    pub visited: Vec<String>,
    /// Nodes never admitted because a cycle keeps one of their inputs open.
    pub unresolved: Vec<String>,
    /// Results dropped because the node was edited while they were computed.
    #[serde(default)]
    pub discarded: Vec<String>,
}

/// Reset every node and revalidate the whole graph.
pub async fn tracking_calculation_all(arena: &mut NodeArena, ctx: &ValidationContext<'_>) -> WalkReport {
    let ids: Vec<String> = arena.ids().to_vec();
    for id in &ids {
        if let Some(node) = arena.node(id) {
            let mut node = node.clone();
            node.reset();
            arena.replace(node);
        }
    }
    revalidate_set(arena, ids.into_iter().collect(), ctx).await
}

/// Revalidate `roots` and everything downstream of them.
pub async fn revalidate_from(
    arena: &mut NodeArena,
    roots: &[&str],
    ctx: &ValidationContext<'_>,
) -> WalkReport {
    let mut dirty = HashSet::new();
    for root in roots {
        dirty.extend(arena.dag().descendants_inclusive(root));
    }
    revalidate_set(arena, dirty, ctx).await
}

/// Revalidate exactly the `dirty` nodes. Nodes outside the set count as
/// resolved with their stored state.
pub async fn revalidate_set(
    arena: &mut NodeArena,
    dirty: HashSet<String>,
    ctx: &ValidationContext<'_>,
) -> WalkReport {
    let mut resolved: HashSet<String> = HashSet::new();
    let mut report = WalkReport::default();

    let admissible = |arena: &NodeArena, resolved: &HashSet<String>, id: &str| {
        arena
            .dag()
            .sources(id)
            .iter()
            .all(|s| !dirty.contains(*s) || resolved.contains(*s))
    };

    let mut frontier: Vec<String> = arena
        .ids()
        .iter()
        .filter(|id| dirty.contains(id.as_str()) && admissible(arena, &resolved, id))
        .cloned()
        .collect();

    while !frontier.is_empty() {
        debug!(nodes = ?frontier, "validating frontier");
        let tickets: Vec<u64> = frontier.iter().map(|id| arena.begin(id)).collect();

        let results = {
            let view: &NodeArena = arena;
            let nodes: Vec<&FusionNode> = frontier.iter().filter_map(|id| view.node(id)).collect();
            join_all(nodes.into_iter().map(|node| tracking_node_calculation(view, node, ctx))).await
        };

        for (node, ticket) in results.into_iter().zip(tickets) {
            let id = node.id.clone();
            if !arena.commit(node, ticket) {
                report.discarded.push(id.clone());
            }
            resolved.insert(id.clone());
            report.visited.push(id);
        }

        let mut next: Vec<String> = Vec::new();
        for id in &frontier {
            for target in arena.dag().targets(id) {
                if dirty.contains(target)
                    && !resolved.contains(target)
                    && !next.iter().any(|n| n == target)
                    && admissible(arena, &resolved, target)
                {
                    next.push(target.to_string());
                }
            }
        }
        frontier = next;
    }

    for id in arena.ids().to_vec() {
        if dirty.contains(&id) && !resolved.contains(&id) {
            if let Some(node) = arena.node(&id) {
                let mut node = node.clone();
                node.reset();
                arena.replace(node);
            }
            report.unresolved.push(id);
        }
    }
    if !report.unresolved.is_empty() {
        warn!(nodes = ?report.unresolved, "nodes left unresolved by a cycle");
    }
    info!(
        visited = report.visited.len(),
        unresolved = report.unresolved.len(),
        "revalidation finished"
    );
    report
}

/// Validate one node's operator chain against its resolved inputs and return
/// the updated node. The arena is only read.
#[instrument(skip_all, fields(node = %node.id))]
pub async fn tracking_node_calculation(
    arena: &NodeArena,
    node: &FusionNode,
    ctx: &ValidationContext<'_>,
) -> FusionNode {
    let mut working = node.clone();
    working.reset();

    let positions = chain::scan(&working.formula);
    let sources: Vec<&FusionNode> = working.src.iter().filter_map(|id| arena.node(id)).collect();

    let mut previous: Vec<Field> = Vec::new();
    let mut failed = false;

    for index in 0..working.formula.len() {
        let outcome: FormulaOutcome = if let Some(error) = positions[index] {
            error.into()
        } else if failed {
            FormulaError::MissingData.into()
        } else {
            let upstream = if index == 0 {
                Upstream::Sources(&sources)
            } else {
                Upstream::Previous(&previous)
            };
            check_formula(arena, &working, index, upstream, ctx).await
        };

        failed |= outcome.error.is_some() || outcome.output.is_empty();

        let formula = &mut working.formula[index];
        if !failed {
            for field in &outcome.output {
                ctx.catalog.register(field, &formula.id);
            }
        }
        formula.error_msg = outcome.error;
        formula.remote_error = outcome.remote_error;
        if let Some(config) = outcome.config {
            formula.operator = config;
        }
        formula.output_fields = outcome.output.clone();
        previous = outcome.output;
    }

    if !failed {
        working.output_fields = previous;
    }
    working.executable = !working.output_fields.is_empty();
    working
}
