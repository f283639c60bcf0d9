//! Select and distinct: a reconciled field selection over one input.

use super::Checked;
use super::upstream::{Upstream, single_input};
use crate::parse::types::*;
use crate::reconcile::check_sort_and_rename_fields;

pub fn check(
    node: &FusionNode,
    config: &FieldSelectionConfig,
    upstream: &Upstream<'_>,
    kind: OperatorKind,
) -> Result<Checked, FormulaError> {
    let input = single_input(node, upstream)?;

    let reconciled = check_sort_and_rename_fields(&input, &config.config_fields);
    if reconciled.is_config_error() {
        return Err(FormulaError::ConfigError);
    }

    let refreshed = FieldSelectionConfig {
        config_fields: reconciled.saved_config(),
    };
    let config = match kind {
        OperatorKind::Distinct => OperatorConfig::Distinct(refreshed),
        _ => OperatorConfig::Select(refreshed),
    };

    Ok(Checked {
        output: reconciled.selected_fields,
        config: Some(config),
    })
}
