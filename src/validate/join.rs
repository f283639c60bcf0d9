//! Join: two inputs combined on one key pair.

use std::collections::HashSet;

use super::upstream::{Upstream, source_inputs};
use super::{Checked, find_field, refresh_ref, type_changed};
use crate::parse::types::*;
use crate::reconcile::check_sort_and_rename_fields;

pub fn check(
    node: &FusionNode,
    config: &JoinConfig,
    upstream: &Upstream<'_>,
) -> Result<Checked, FormulaError> {
    if node.src.len() != 2 {
        return Err(FormulaError::MissingLine);
    }
    let inputs = source_inputs(upstream)?;
    let [(_, left), (right_node, right)] = inputs.as_slice() else {
        return Err(FormulaError::MissingLine);
    };

    let [left_key, right_key] = config.relation_field.as_slice() else {
        return Err(FormulaError::ConfigError);
    };
    let left_live = find_field(left, left_key).ok_or(FormulaError::ConfigError)?;
    let right_live = find_field(right, right_key).ok_or(FormulaError::ConfigError)?;
    if type_changed(left_key, left_live)
        || type_changed(right_key, right_live)
        || left_live.data_type != right_live.data_type
    {
        return Err(FormulaError::ConfigError);
    }

    let combined = combine(left, right_node, right);
    let reconciled = check_sort_and_rename_fields(&combined, &config.config_fields);
    if reconciled.is_config_error() {
        return Err(FormulaError::ConfigError);
    }

    Ok(Checked {
        config: Some(OperatorConfig::Join(JoinConfig {
            relation_type: config.relation_type,
            relation_field: vec![
                refresh_ref(left_key, left_live),
                refresh_ref(right_key, right_live),
            ],
            config_fields: reconciled.saved_config(),
        })),
        output: reconciled.selected_fields,
    })
}

/// Left fields then right fields. A right field whose identity already
/// exists on the left is qualified with the right node's id so both survive.
pub fn combine(left: &[Field], right_node: &FusionNode, right: &[Field]) -> Vec<Field> {
    let left_keys: HashSet<FieldKey> = left.iter().map(Field::key).collect();
    let mut out = left.to_vec();
    out.extend(right.iter().map(|f| {
        if left_keys.contains(&f.key()) {
            Field {
                source_id: format!("{}/{}", right_node.id, f.source_id),
                ..f.clone()
            }
        } else {
            f.clone()
        }
    }));
    out
}
