//! Output view: the node's published column set.

use std::collections::HashSet;

use super::Checked;
use super::upstream::{Upstream, single_input};
use crate::parse::types::*;
use crate::reconcile::check_sort_and_rename_fields;

pub fn check(
    node: &FusionNode,
    config: &FieldSelectionConfig,
    upstream: &Upstream<'_>,
) -> Result<Checked, FormulaError> {
    let input = single_input(node, upstream)?;

    // Not configured yet: publish everything.
    if !config.config_fields.is_empty() {
        let configured: HashSet<FieldKey> = config.config_fields.iter().map(FieldRef::key).collect();
        let live: HashSet<FieldKey> = input.iter().map(Field::key).collect();
        if configured != live {
            return Err(FormulaError::NodeChange);
        }
    }

    let reconciled = check_sort_and_rename_fields(&input, &config.config_fields);
    if reconciled.is_config_error() {
        return Err(FormulaError::ConfigError);
    }

    Ok(Checked {
        config: Some(OperatorConfig::OutputView(FieldSelectionConfig {
            config_fields: reconciled.saved_config(),
        })),
        output: reconciled.selected_fields,
    })
}
