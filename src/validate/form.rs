//! Form: leaf operator reading a catalog view's live schema.

use tracing::{debug, instrument, warn};

use super::FormulaOutcome;
use crate::catalog::{CatalogField, ExampleData};
use crate::context::ValidationContext;
use crate::parse::types::*;
use crate::reconcile::check_sort_and_rename_fields;
use crate::service::{ExampleRequest, ViewDetails};

#[instrument(skip_all, fields(node = %node.id, form = %config.form_id))]
pub async fn check(
    node: &FusionNode,
    formula: &Formula,
    config: &FormConfig,
    ctx: &ValidationContext<'_>,
) -> FormulaOutcome {
    if !node.src.is_empty() {
        return FormulaError::MoreLine.into();
    }
    if config.form_id.is_empty() {
        return FormulaError::ConfigError.into();
    }

    let details = match ctx
        .backend
        .catalog
        .get_datasheet_view_details(&config.form_id)
        .await
    {
        Ok(details) => details,
        Err(e) if e.is_resource_missing(&ctx.config.not_found_codes) => {
            warn!(code = %e.code, "form view is gone");
            return FormulaOutcome {
                error: Some(FormulaError::ConfigError),
                config: Some(OperatorConfig::Form(FormConfig {
                    is_exist: false,
                    ..config.clone()
                })),
                ..Default::default()
            };
        }
        Err(e) => {
            warn!(error = %e, "form view lookup failed");
            return FormulaOutcome::remote(e.to_string());
        }
    };

    let live = live_fields(formula, config, &details, ctx);
    if ctx.may_sample() {
        sample(formula, config, &details, &live, ctx).await;
    }

    let refreshed = FormConfig {
        catalog: details.catalog.clone().or_else(|| config.catalog.clone()),
        schema: details.schema.clone().or_else(|| config.schema.clone()),
        table: details.table.clone().or_else(|| config.table.clone()),
        is_exist: true,
        ..config.clone()
    };

    let reconciled = check_sort_and_rename_fields(&live, &config.config_fields);
    if reconciled.is_config_error() {
        return FormulaOutcome {
            error: Some(FormulaError::ConfigError),
            config: Some(OperatorConfig::Form(refreshed)),
            ..Default::default()
        };
    }

    let config_fields = reconciled.saved_config();
    FormulaOutcome::passed(
        reconciled.selected_fields,
        Some(OperatorConfig::Form(FormConfig {
            config_fields,
            ..refreshed
        })),
    )
}

/// Map the view's columns onto fields stamped with this operator's id and
/// record them in the catalog.
fn live_fields(
    formula: &Formula,
    config: &FormConfig,
    details: &ViewDetails,
    ctx: &ValidationContext<'_>,
) -> Vec<Field> {
    let mut out = Vec::with_capacity(details.fields.len());
    for vf in &details.fields {
        let Some(data_type) = DataType::from_catalog_type(&vf.data_type) else {
            debug!(field = %vf.id, ty = %vf.data_type, "skipping column of unknown type");
            continue;
        };
        ctx.catalog.upsert(CatalogField {
            id: vf.id.clone(),
            name: vf.business_name.clone(),
            name_en: vf.technical_name.clone(),
            data_type,
            origin: config.form_id.clone(),
        });
        out.push(Field {
            name_en: Some(vf.technical_name.clone()),
            ..Field::new(vf.id.as_str(), formula.id.as_str(), vf.business_name.as_str(), data_type)
        });
    }
    out
}

/// Best effort: a failed sample only costs the example cache.
async fn sample(
    formula: &Formula,
    config: &FormConfig,
    details: &ViewDetails,
    live: &[Field],
    ctx: &ValidationContext<'_>,
) {
    let location = (
        details.catalog.as_ref().or(config.catalog.as_ref()),
        details.schema.as_ref().or(config.schema.as_ref()),
        details.table.as_ref().or(config.table.as_ref()),
    );
    let (Some(catalog), Some(schema), Some(table)) = location else {
        return;
    };
    let request = ExampleRequest {
        catalog: catalog.clone(),
        schema: schema.clone(),
        table: table.clone(),
        limit: ctx.config.example_limit,
    };

    let rows = match ctx.backend.sample.get_virtual_engine_example(&request).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, table = %request.table, "sampling failed");
            return;
        }
    };

    let mut data = ExampleData::new();
    for (index, column) in rows.columns.iter().enumerate() {
        if let Some(field) = live.iter().find(|f| f.name_en.as_deref() == Some(column.name.as_str())) {
            data.insert(field.id.clone(), rows.column_values(index));
        }
    }
    ctx.catalog.add_example_data(&formula.id, data, false);
}
