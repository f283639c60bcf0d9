#![allow(dead_code)]

use viewfusion::arena::NodeArena;
use viewfusion::catalog::FieldCatalog;
use viewfusion::context::{EngineConfig, Permissions, ValidationContext};
use viewfusion::parse::types::*;
use viewfusion::service::{Backend, MemoryBackend, ViewDetails, ViewField};

// =============================================================================
// Field / node builders
// =============================================================================

pub fn field(id: &str, source_id: &str, alias: &str, data_type: DataType) -> Field {
    Field::new(id, source_id, alias, data_type)
}

pub fn char_field(id: &str, source_id: &str) -> Field {
    field(id, source_id, id, DataType::Char)
}

pub fn refs(fields: &[Field]) -> Vec<FieldRef> {
    fields.iter().map(Field::to_ref).collect()
}

pub fn node(id: &str, src: &[&str], formula: Vec<Formula>) -> FusionNode {
    let mut n = FusionNode::new(id, id);
    n.src = src.iter().map(|s| s.to_string()).collect();
    n.formula = formula;
    n
}

/// A node that already carries resolved output.
pub fn resolved(id: &str, output: Vec<Field>) -> FusionNode {
    let mut n = FusionNode::new(id, id);
    n.executable = !output.is_empty();
    n.output_fields = output;
    n
}

// =============================================================================
// Formula builders
// =============================================================================

pub fn form(id: &str, form_id: &str) -> Formula {
    Formula::with_config(
        id,
        OperatorConfig::Form(FormConfig {
            form_id: form_id.into(),
            ..FormConfig::default()
        }),
    )
}

pub fn select(id: &str, config_fields: Vec<FieldRef>) -> Formula {
    Formula::with_config(id, OperatorConfig::Select(FieldSelectionConfig { config_fields }))
}

pub fn output_view(id: &str, config_fields: Vec<FieldRef>) -> Formula {
    Formula::with_config(id, OperatorConfig::OutputView(FieldSelectionConfig { config_fields }))
}

pub fn filter(id: &str, field: FieldRef, operator: FilterOperator) -> Formula {
    Formula::with_config(
        id,
        OperatorConfig::Where(WhereConfig {
            clauses: vec![WhereGroup {
                member: vec![WhereClause {
                    field,
                    operator,
                    value: serde_json::Value::Null,
                }],
                relation: Relation::And,
            }],
            where_relation: Relation::And,
        }),
    )
}

pub fn join(id: &str, left: FieldRef, right: FieldRef) -> Formula {
    Formula::with_config(
        id,
        OperatorConfig::Join(JoinConfig {
            relation_type: JoinKind::Inner,
            relation_field: vec![left, right],
            config_fields: vec![],
        }),
    )
}

pub fn merge(id: &str, sources: Vec<(&str, Vec<FieldRef>)>) -> Formula {
    Formula::with_config(
        id,
        OperatorConfig::Merge(MergeConfig {
            merge: MergeSpec {
                nodes: sources
                    .into_iter()
                    .map(|(source, fields)| MergeSource {
                        source_node_id: source.into(),
                        fields,
                    })
                    .collect(),
                deduplicate: false,
            },
        }),
    )
}

pub fn sql(id: &str, template: &str) -> Formula {
    Formula::with_config(
        id,
        OperatorConfig::Sql(SqlConfig {
            sql: SqlSpec {
                sql_info: SqlInfo {
                    sql_str: template.into(),
                    ..SqlInfo::default()
                },
            },
            config_fields: vec![],
        }),
    )
}

// =============================================================================
// Services
// =============================================================================

pub fn view(fields: &[(&str, &str, &str)]) -> ViewDetails {
    ViewDetails {
        catalog: Some("hive".into()),
        schema: Some("sales".into()),
        table: Some("orders".into()),
        fields: fields
            .iter()
            .map(|(id, name, ty)| ViewField {
                id: id.to_string(),
                business_name: name.to_string(),
                technical_name: format!("col_{}", id),
                data_type: ty.to_string(),
            })
            .collect(),
    }
}

/// Owns everything a `ValidationContext` borrows.
pub struct Harness {
    pub backend: MemoryBackend,
    pub catalog: FieldCatalog,
    pub config: EngineConfig,
    pub permissions: Permissions,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            backend: MemoryBackend::default(),
            catalog: FieldCatalog::new(),
            config: EngineConfig::default(),
            permissions: Permissions::default(),
        }
    }

    pub fn ctx(&self) -> ValidationContext<'_> {
        ValidationContext::new(
            &self.config,
            &self.catalog,
            Backend::uniform(&self.backend),
            &self.permissions,
        )
    }
}

pub fn arena(nodes: Vec<FusionNode>) -> NodeArena {
    NodeArena::from_graph(FusionGraph { nodes }).expect("graph should build")
}
