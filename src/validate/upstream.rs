//! Upstream resolution and arity rules.

use crate::parse::types::{Field, FormulaError, FusionNode};

/// What an operator reads from.
#[derive(Debug, Clone, Copy)]
pub enum Upstream<'a> {
    /// First operator of a chain: the node's `src` nodes, in `src` order.
    Sources(&'a [&'a FusionNode]),
    /// Later operators: the previous operator's output.
    Previous(&'a [Field]),
}

fn offered(fields: &[Field]) -> Vec<Field> {
    fields
        .iter()
        .filter(|f| !f.data_type.is_binary())
        .cloned()
        .collect()
}

/// Operators that take exactly one input (select, where, distinct,
/// indicator, output view).
pub fn single_input(node: &FusionNode, upstream: &Upstream<'_>) -> Result<Vec<Field>, FormulaError> {
    match upstream {
        Upstream::Previous(fields) => {
            if fields.is_empty() {
                return Err(FormulaError::MissingData);
            }
            Ok(offered(fields))
        }
        Upstream::Sources(sources) => {
            match node.src.len() {
                0 => return Err(FormulaError::MissingLine),
                1 => {}
                _ => return Err(FormulaError::MoreLine),
            }
            let source = sources.first().ok_or(FormulaError::MissingLine)?;
            if source.output_fields.is_empty() {
                return Err(FormulaError::MissingData);
            }
            Ok(offered(&source.output_fields))
        }
    }
}

/// Multi-input operators (join, merge): every source with its offered fields.
/// Arity is left to the caller.
pub fn source_inputs<'a>(
    upstream: &Upstream<'a>,
) -> Result<Vec<(&'a FusionNode, Vec<Field>)>, FormulaError> {
    let Upstream::Sources(sources) = *upstream else {
        return Err(FormulaError::IndexError);
    };
    sources
        .iter()
        .map(|source| {
            if source.output_fields.is_empty() {
                Err(FormulaError::MissingData)
            } else {
                Ok((*source, offered(&source.output_fields)))
            }
        })
        .collect()
}
