//! Per-operator configuration checkers.
//!
//! Each checker reads the operator's upstream, validates the stored config
//! against it and computes the operator's output fields. Checkers never
//! mutate the node: they return a [`FormulaOutcome`] which the walker
//! applies by replacing the formula wholesale.

pub mod chain;
pub mod filter;
pub mod form;
pub mod indicator;
pub mod join;
pub mod merge;
pub mod output_view;
pub mod select;
pub mod sql;
pub mod sql_template;
pub mod upstream;

use std::collections::HashSet;

use tracing::debug;

use crate::arena::NodeArena;
use crate::context::ValidationContext;
use crate::parse::types::*;
use crate::reconcile::resolve_alias;

pub use upstream::Upstream;

/// Result of checking one operator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormulaOutcome {
    pub output: Vec<Field>,
    pub error: Option<FormulaError>,
    /// Refreshed config to persist (e.g. reconciled selections).
    pub config: Option<OperatorConfig>,
    pub remote_error: Option<String>,
}

impl FormulaOutcome {
    pub fn passed(output: Vec<Field>, config: Option<OperatorConfig>) -> Self {
        FormulaOutcome {
            output,
            config,
            ..Default::default()
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        FormulaOutcome {
            remote_error: Some(message.into()),
            ..Default::default()
        }
    }
}

impl From<FormulaError> for FormulaOutcome {
    fn from(error: FormulaError) -> Self {
        FormulaOutcome {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Output of a synchronous checker.
pub struct Checked {
    pub output: Vec<Field>,
    pub config: Option<OperatorConfig>,
}

impl From<Result<Checked, FormulaError>> for FormulaOutcome {
    fn from(result: Result<Checked, FormulaError>) -> Self {
        match result {
            Ok(checked) => FormulaOutcome::passed(checked.output, checked.config),
            Err(error) => error.into(),
        }
    }
}

/// Check operator `index` of `node` against `upstream`.
pub async fn check_formula(
    arena: &NodeArena,
    node: &FusionNode,
    index: usize,
    upstream: Upstream<'_>,
    ctx: &ValidationContext<'_>,
) -> FormulaOutcome {
    let Some(formula) = node.formula.get(index) else {
        return FormulaError::IndexError.into();
    };

    let outcome: FormulaOutcome = match &formula.operator {
        OperatorConfig::Form(c) => form::check(node, formula, c, ctx).await,
        OperatorConfig::Join(c) => join::check(node, c, &upstream).into(),
        OperatorConfig::Where(c) => filter::check(node, c, &upstream).into(),
        OperatorConfig::Select(c) => select::check(node, c, &upstream, OperatorKind::Select).into(),
        OperatorConfig::Distinct(c) => {
            select::check(node, c, &upstream, OperatorKind::Distinct).into()
        }
        OperatorConfig::Indicator(c) => indicator::check(node, formula, c, &upstream).into(),
        OperatorConfig::Merge(c) => merge::check(node, formula, c, &upstream).into(),
        OperatorConfig::OutputView(c) => output_view::check(node, c, &upstream).into(),
        OperatorConfig::Sql(c) => sql::check(arena, node, index, c, &upstream, ctx).await,
    };

    debug!(
        node = %node.id,
        formula = %formula.id,
        kind = formula.kind().as_str(),
        fields = outcome.output.len(),
        error = ?outcome.error,
        "operator checked"
    );
    outcome
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Live field matching `r` by identity.
pub(crate) fn find_field<'a>(fields: &'a [Field], r: &FieldRef) -> Option<&'a Field> {
    fields.iter().find(|f| f.is(r))
}

/// The saved type, when recorded, must equal the live one.
pub(crate) fn type_changed(r: &FieldRef, live: &Field) -> bool {
    r.data_type.is_some_and(|saved| saved != live.data_type)
}

pub(crate) fn has_duplicate_alias(fields: &[Field]) -> bool {
    let mut seen = HashSet::new();
    fields.iter().any(|f| !seen.insert(f.alias.as_str()))
}

/// Two output fields with the same `(id, sourceId)` cannot be told apart by
/// any downstream selection.
pub(crate) fn has_duplicate_identity(fields: &[Field]) -> bool {
    let mut seen = HashSet::new();
    fields.iter().any(|f| !seen.insert(f.key()))
}

/// Reference to `live`. A user rename survives, anything else follows the
/// live alias; the recorded original name moves to the live one.
pub(crate) fn refresh_ref(r: &FieldRef, live: &Field) -> FieldRef {
    FieldRef {
        alias: Some(resolve_alias(r, live)),
        original_name: Some(live.alias.clone()),
        ..live.to_ref()
    }
}
