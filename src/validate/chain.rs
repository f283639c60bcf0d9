//! Operator position rules within a node's chain.

use crate::parse::types::{Formula, FormulaError, OperatorKind};

/// `IndexError` for every operator sitting where it may not:
/// form, join and merge only first; sql never after join/merge;
/// output view only last.
pub fn scan(formula: &[Formula]) -> Vec<Option<FormulaError>> {
    let last = formula.len().saturating_sub(1);
    let mut after_multi_input = false;

    formula
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let kind = f.kind();
            let illegal = match kind {
                OperatorKind::Form | OperatorKind::Join | OperatorKind::Merge => i != 0,
                OperatorKind::Sql => after_multi_input,
                OperatorKind::OutputView => i != last,
                OperatorKind::Where
                | OperatorKind::Select
                | OperatorKind::Indicator
                | OperatorKind::Distinct => false,
            };
            if matches!(kind, OperatorKind::Join | OperatorKind::Merge) {
                after_multi_input = true;
            }
            illegal.then_some(FormulaError::IndexError)
        })
        .collect()
}
