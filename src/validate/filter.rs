//! Where: row filter over one input.

use super::upstream::{Upstream, single_input};
use super::{Checked, find_field, type_changed};
use crate::parse::types::*;

/// Filter operators each semantic type accepts. `time` and `binary` accept none.
pub fn allowed_operators(data_type: DataType) -> &'static [FilterOperator] {
    use FilterOperator::*;
    match data_type {
        DataType::Int | DataType::Float | DataType::Decimal | DataType::Number => {
            &[Eq, Ne, Lt, Le, Gt, Ge, In, NotIn, Between, Null, NotNull]
        }
        DataType::Char => &[
            Eq, Ne, In, NotIn, Include, NotInclude, Prefix, NotPrefix, Null, NotNull,
        ],
        DataType::Date | DataType::Datetime | DataType::Timestamp => {
            &[Eq, Ne, Lt, Le, Gt, Ge, Between, Before, Current, Null, NotNull]
        }
        DataType::Bool => &[IsTrue, IsFalse, Null, NotNull],
        DataType::Time | DataType::Binary => &[],
    }
}

pub fn check(
    node: &FusionNode,
    config: &WhereConfig,
    upstream: &Upstream<'_>,
) -> Result<Checked, FormulaError> {
    let input = single_input(node, upstream)?;

    let clauses: Vec<&WhereClause> = config.clauses.iter().flat_map(|g| &g.member).collect();
    if clauses.is_empty() {
        return Err(FormulaError::ConfigError);
    }

    for clause in clauses {
        let live = find_field(&input, &clause.field).ok_or(FormulaError::ConfigError)?;
        if type_changed(&clause.field, live) || live.data_type == DataType::Time {
            return Err(FormulaError::ConfigError);
        }
        if !allowed_operators(live.data_type).contains(&clause.operator) {
            return Err(FormulaError::ConfigError);
        }
    }

    Ok(Checked {
        output: input,
        config: None,
    })
}
