//! SQL operator: a hand-written statement over upstream views.
//!
//! The template references upstream views as `{{node}}` and their columns as
//! `{{node.alias}}`. Output columns come from describing the compiled
//! statement on the query engine, which is the expensive part; a signature
//! over the template and the referenced views' schemas lets an unchanged
//! operator reuse its last description.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use super::FormulaOutcome;
use super::sql_template::{TemplatePart, compile, parse_template, referenced_tables};
use super::upstream::Upstream;
use crate::arena::NodeArena;
use crate::catalog::ExampleData;
use crate::context::ValidationContext;
use crate::parse::types::*;
use crate::run_param::{RunViewParam, get_run_view_param, upstream_nodes};
use crate::service::SqlExecRequest;

/// A view the template may read.
struct Table {
    name: String,
    fields: Vec<Field>,
    /// Chain to compile for this view.
    param: RunViewParam,
}

#[instrument(skip_all, fields(node = %node.id, index = index))]
pub async fn check(
    arena: &NodeArena,
    node: &FusionNode,
    index: usize,
    config: &SqlConfig,
    upstream: &Upstream<'_>,
    ctx: &ValidationContext<'_>,
) -> FormulaOutcome {
    let Some(formula) = node.formula.get(index) else {
        return FormulaError::IndexError.into();
    };
    let info = &config.sql.sql_info;
    if info.sql_str.trim().is_empty() {
        return FormulaError::ConfigError.into();
    }

    let available = match tables(arena, node, index, upstream, ctx) {
        Ok(tables) => tables,
        Err(e) => return e.into(),
    };

    let parts = parse_template(&info.sql_str);
    let referenced = referenced_tables(&parts);
    if referenced.is_empty() {
        return FormulaError::ConfigError.into();
    }
    let mut used: Vec<&Table> = Vec::with_capacity(referenced.len());
    for name in &referenced {
        match available.iter().find(|t| t.name == *name) {
            Some(table) => used.push(table),
            None => {
                debug!(table = %name, "template references an unknown view");
                return FormulaError::ConfigError.into();
            }
        }
    }
    if !columns_resolve(&parts, &used) {
        return FormulaError::ConfigError.into();
    }

    let signature = signature(&info.sql_str, &used);
    if info.signature.as_deref() == Some(signature.as_str()) && !config.config_fields.is_empty() {
        let cached: Option<Vec<Field>> = config.config_fields.iter().map(FieldRef::to_field).collect();
        if let Some(output) = cached {
            debug!("dependencies unchanged, reusing described columns");
            return FormulaOutcome::passed(output, None);
        }
    }

    // Compile every referenced view; all requests settle before inspecting.
    let results = join_all(used.iter().map(|t| ctx.backend.query.get_exec_sql(&t.param))).await;
    let mut fragments = HashMap::with_capacity(used.len());
    for (table, result) in used.iter().zip(results) {
        match result {
            Ok(sql) => {
                fragments.insert(table.name.clone(), sql);
            }
            Err(e) => {
                warn!(table = %table.name, error = %e, "view compilation failed");
                return FormulaOutcome::remote(e.to_string());
            }
        }
    }
    let Some(compiled) = compile(&parts, &fragments) else {
        return FormulaError::ConfigError.into();
    };

    let request = SqlExecRequest {
        sql: compiled.clone(),
        formula_id: formula.id.clone(),
        limit: ctx.config.preview_limit,
    };
    let described = match ctx.backend.query.exec_custom_view_sql(&request).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "statement describe failed");
            return FormulaOutcome::remote(e.to_string());
        }
    };

    let mut names = HashSet::new();
    if described.columns.iter().any(|c| !names.insert(c.name.as_str())) {
        return FormulaError::ConfigError.into();
    }
    let output: Vec<Field> = described
        .columns
        .iter()
        .map(|c| {
            let data_type = DataType::from_catalog_type(&c.ty).unwrap_or(DataType::Char);
            Field::new(c.name.as_str(), formula.id.as_str(), c.name.as_str(), data_type)
        })
        .collect();
    if output.is_empty() {
        return FormulaError::ConfigError.into();
    }

    if ctx.may_sample() {
        let data: ExampleData = output
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), described.column_values(i)))
            .collect();
        ctx.catalog.add_example_data(&formula.id, data, true);
    }

    let config = SqlConfig {
        sql: SqlSpec {
            sql_info: SqlInfo {
                sql_str: info.sql_str.clone(),
                compiled_sql: Some(compiled),
                signature: Some(signature),
            },
        },
        config_fields: output.iter().map(Field::to_ref).collect(),
    };
    FormulaOutcome::passed(output, Some(OperatorConfig::Sql(config)))
}

/// First operator: every `src` node by name. Later: the node itself, over
/// its chain up to the previous operator.
fn tables(
    arena: &NodeArena,
    node: &FusionNode,
    index: usize,
    upstream: &Upstream<'_>,
    ctx: &ValidationContext<'_>,
) -> Result<Vec<Table>, FormulaError> {
    match *upstream {
        Upstream::Sources(sources) => {
            if node.src.is_empty() || sources.is_empty() {
                return Err(FormulaError::MissingLine);
            }
            sources
                .iter()
                .map(|source| {
                    if source.output_fields.is_empty() {
                        return Err(FormulaError::MissingData);
                    }
                    let chain = upstream_nodes(arena, &source.id);
                    Ok(Table {
                        name: source.name.clone(),
                        fields: offered(&source.output_fields),
                        param: get_run_view_param(&chain, ctx.catalog, None),
                    })
                })
                .collect()
        }
        Upstream::Previous(fields) => {
            if fields.is_empty() {
                return Err(FormulaError::MissingData);
            }
            let previous = index
                .checked_sub(1)
                .and_then(|i| node.formula.get(i))
                .ok_or(FormulaError::IndexError)?;
            // The arena still holds the node as last committed; compile the
            // working copy instead.
            let chain: Vec<&FusionNode> = upstream_nodes(arena, &node.id)
                .into_iter()
                .map(|n| if n.id == node.id { node } else { n })
                .collect();
            let chain = if chain.iter().any(|n| n.id == node.id) {
                chain
            } else {
                vec![node]
            };
            Ok(vec![Table {
                name: node.name.clone(),
                fields: offered(fields),
                param: get_run_view_param(&chain, ctx.catalog, Some(&previous.id)),
            }])
        }
    }
}

fn offered(fields: &[Field]) -> Vec<Field> {
    fields
        .iter()
        .filter(|f| !f.data_type.is_binary())
        .cloned()
        .collect()
}

fn columns_resolve(parts: &[TemplatePart], used: &[&Table]) -> bool {
    parts.iter().all(|part| match part {
        TemplatePart::Column { table, column } => used
            .iter()
            .find(|t| t.name == *table)
            .is_some_and(|t| t.fields.iter().any(|f| &f.alias == column)),
        _ => true,
    })
}

/// SHA-256 over the template and each referenced view's column schema.
fn signature(template: &str, used: &[&Table]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.as_bytes());
    for table in used {
        hasher.update(b"\0");
        hasher.update(table.name.as_bytes());
        for f in &table.fields {
            hasher.update(
                format!(
                    "\n{}|{}|{}|{}",
                    f.id,
                    f.source_id,
                    f.alias,
                    f.data_type.as_str()
                )
                .as_bytes(),
            );
        }
    }
    hex::encode(hasher.finalize())
}
