//! Merge: row-wise union of two or more inputs over position-aligned columns.

use std::collections::{BTreeSet, HashSet};

use super::upstream::{Upstream, source_inputs};
use super::{
    Checked, find_field, has_duplicate_alias, has_duplicate_identity, refresh_ref, type_changed,
};
use crate::parse::types::*;
use crate::reconcile::resolve_alias;

pub fn check(
    node: &FusionNode,
    formula: &Formula,
    config: &MergeConfig,
    upstream: &Upstream<'_>,
) -> Result<Checked, FormulaError> {
    let declared = &config.merge.nodes;

    // A declared source that is no longer wired (or a new wire) means the
    // user has to revisit the mapping, regardless of how many inputs remain.
    if !declared.is_empty() {
        let declared_ids: BTreeSet<&str> =
            declared.iter().map(|d| d.source_node_id.as_str()).collect();
        let live_ids: BTreeSet<&str> = node.src.iter().map(String::as_str).collect();
        if declared.len() != node.src.len() || declared_ids != live_ids {
            return Err(FormulaError::NodeChange);
        }
    }
    if node.src.len() < 2 {
        return Err(FormulaError::MissingLine);
    }
    if declared.is_empty() {
        return Err(FormulaError::ConfigError);
    }

    let inputs = source_inputs(upstream)?;
    let width = declared[0].fields.len();
    if width == 0 {
        return Err(FormulaError::ConfigError);
    }
    if declared.iter().any(|d| d.fields.len() != width) {
        return Err(FormulaError::NodeChange);
    }

    let mut resolved: Vec<Vec<&Field>> = Vec::with_capacity(declared.len());
    for source in declared {
        let (_, fields) = inputs
            .iter()
            .find(|(n, _)| n.id == source.source_node_id)
            .ok_or(FormulaError::NodeChange)?;
        let mut columns = Vec::with_capacity(width);
        for r in &source.fields {
            let live = find_field(fields, r).ok_or(FormulaError::ConfigError)?;
            if type_changed(r, live) {
                return Err(FormulaError::ConfigError);
            }
            columns.push(live);
        }
        resolved.push(columns);
    }

    for column in 0..width {
        let ty = resolved[0][column].data_type;
        if resolved.iter().any(|cols| cols[column].data_type != ty) {
            return Err(FormulaError::ConfigError);
        }
    }

    // Stamping drops the upstream sourceId, so columns sharing an id (the
    // two sides of a join) are told apart as `{sourceId}/{id}`.
    let mut ids = HashSet::with_capacity(width);
    let output: Vec<Field> = declared[0]
        .fields
        .iter()
        .zip(&resolved[0])
        .map(|(r, live)| {
            let id = if ids.insert(live.id.as_str()) {
                live.id.clone()
            } else {
                format!("{}/{}", live.source_id, live.id)
            };
            Field {
                id,
                source_id: formula.id.clone(),
                alias: resolve_alias(r, live),
                ..(*live).clone()
            }
        })
        .collect();
    if has_duplicate_alias(&output) || has_duplicate_identity(&output) {
        return Err(FormulaError::ConfigError);
    }

    let nodes = declared
        .iter()
        .zip(&resolved)
        .map(|(source, columns)| MergeSource {
            source_node_id: source.source_node_id.clone(),
            fields: source
                .fields
                .iter()
                .zip(columns)
                .map(|(r, live)| refresh_ref(r, live))
                .collect(),
        })
        .collect();

    Ok(Checked {
        output,
        config: Some(OperatorConfig::Merge(MergeConfig {
            merge: MergeSpec {
                nodes,
                deduplicate: config.merge.deduplicate,
            },
        })),
    })
}
