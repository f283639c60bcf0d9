//! SQL operator: reference checks, compilation, signature reuse.

mod helpers;

use helpers::*;
use serde_json::json;
use viewfusion::arena::NodeArena;
use viewfusion::parse::types::*;
use viewfusion::service::memory::Call;
use viewfusion::service::{Column, QueryResult};
use viewfusion::walk::tracking_calculation_all;

fn orders_view(name_alias: &str, age_type: &str) -> viewfusion::service::ViewDetails {
    view(&[("f1", name_alias, "varchar"), ("f2", "age", age_type)])
}

fn described(columns: &[(&str, &str)]) -> QueryResult {
    QueryResult {
        columns: columns
            .iter()
            .map(|(name, ty)| Column {
                name: name.to_string(),
                ty: ty.to_string(),
            })
            .collect(),
        data: vec![columns.iter().map(|_| json!(1)).collect()],
    }
}

fn pipeline(template: &str) -> NodeArena {
    arena(vec![
        node("root", &[], vec![form("form-1", "t-orders")]),
        node("report", &["root"], vec![sql("sql-1", template)]),
    ])
}

fn sql_info(n: &FusionNode) -> &SqlInfo {
    match &n.formula[0].operator {
        OperatorConfig::Sql(c) => &c.sql.sql_info,
        other => panic!("expected sql config, got {:?}", other),
    }
}

#[tokio::test]
async fn describe_determines_output_columns() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend
        .set_sql_result("sql-1", described(&[("name", "varchar"), ("total", "decimal(10,2)")]));
    let mut arena = pipeline("select {{root.name}}, sum(1) as total from {{root}} group by 1");

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = arena.node("report").unwrap();
    assert_eq!(report.formula[0].error_msg, None);
    let out: Vec<(&str, &str, DataType)> = report
        .output_fields
        .iter()
        .map(|f| (f.id.as_str(), f.source_id.as_str(), f.data_type))
        .collect();
    assert_eq!(
        out,
        vec![
            ("name", "sql-1", DataType::Char),
            ("total", "sql-1", DataType::Decimal)
        ]
    );

    let info = sql_info(report);
    let compiled = info.compiled_sql.as_deref().unwrap();
    assert!(compiled.starts_with(r#"select "root"."name", sum(1) as total from (SELECT * FROM "view_root""#));
    assert!(compiled.ends_with(r#") AS "root" group by 1"#));
    assert_eq!(info.signature.as_ref().map(String::len), Some(64));

    let cached = h.catalog.example_data("sql-1").unwrap();
    assert_eq!(cached["total"], vec![json!(1)]);
}

#[tokio::test]
async fn unchanged_dependencies_reuse_description() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend.set_sql_result("sql-1", described(&[("name", "varchar")]));
    let mut arena = pipeline("select {{root.name}} from {{root}}");

    tracking_calculation_all(&mut arena, &h.ctx()).await;
    let first = arena.node("report").unwrap().clone();
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    assert_eq!(h.backend.calls(Call::ExecSql), 1);
    assert_eq!(h.backend.calls(Call::CustomSql), 1);
    assert_eq!(arena.node("report").unwrap(), &first);
}

#[tokio::test]
async fn schema_change_forces_new_description() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend.set_sql_result("sql-1", described(&[("name", "varchar")]));
    let mut arena = pipeline("select {{root.name}} from {{root}}");
    tracking_calculation_all(&mut arena, &h.ctx()).await;
    let before = sql_info(arena.node("report").unwrap()).signature.clone();

    // a column the template never names still changes the view's shape
    h.backend.set_view("t-orders", orders_view("name", "varchar"));
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    assert_eq!(h.backend.calls(Call::CustomSql), 2);
    assert_ne!(sql_info(arena.node("report").unwrap()).signature, before);
}

#[tokio::test]
async fn renamed_column_reference_is_config_error() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend.set_sql_result("sql-1", described(&[("name", "varchar")]));
    let mut arena = pipeline("select {{root.name}} from {{root}}");
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    h.backend.set_view("t-orders", orders_view("customer", "int"));
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = arena.node("report").unwrap();
    assert_eq!(report.formula[0].error_msg, Some(FormulaError::ConfigError));
    assert!(report.output_fields.is_empty());
}

#[tokio::test]
async fn unknown_table_reference_is_config_error() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    let mut arena = pipeline("select * from {{customers}}");

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = arena.node("report").unwrap();
    assert_eq!(report.formula[0].error_msg, Some(FormulaError::ConfigError));
    assert_eq!(h.backend.calls(Call::ExecSql), 0);
}

#[tokio::test]
async fn compilation_failure_is_remote_error_without_fallback() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend.set_sql_result("sql-1", described(&[("name", "varchar")]));
    let mut arena = pipeline("select {{root.name}} from {{root}}");
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    // Shape change invalidates the signature; recompilation then fails.
    h.backend.set_view("t-orders", orders_view("name", "varchar"));
    h.backend.fail_exec_sql("root");
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = arena.node("report").unwrap();
    assert_eq!(report.formula[0].error_msg, None);
    assert!(report.formula[0].remote_error.is_some());
    assert!(report.output_fields.is_empty());
    assert!(!report.executable);
}

#[tokio::test]
async fn duplicate_described_columns_are_config_error() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend
        .set_sql_result("sql-1", described(&[("name", "varchar"), ("name", "varchar")]));
    let mut arena = pipeline("select {{root.name}}, {{root.name}} from {{root}}");

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = arena.node("report").unwrap();
    assert_eq!(report.formula[0].error_msg, Some(FormulaError::ConfigError));
}

#[tokio::test]
async fn later_sql_reads_own_chain_by_node_name() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    h.backend.set_sql_result("sql-2", described(&[("age", "int")]));
    let mut arena = arena(vec![node(
        "root",
        &[],
        vec![
            form("form-1", "t-orders"),
            sql("sql-2", "select {{root.age}} from {{root}}"),
        ],
    )]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let root = arena.node("root").unwrap();
    assert_eq!(root.formula[1].error_msg, None);
    assert_eq!(root.output_fields.len(), 1);
    assert_eq!(root.output_fields[0].source_id, "sql-2");
}

#[tokio::test]
async fn sql_after_join_is_index_error() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view("name", "int"));
    let mut arena = arena(vec![
        node("a", &[], vec![form("form-a", "t-orders")]),
        node("b", &[], vec![form("form-b", "t-orders")]),
        node(
            "j",
            &["a", "b"],
            vec![
                join(
                    "join-1",
                    field("f1", "form-a", "name", DataType::Char).to_ref(),
                    field("f1", "form-b", "name", DataType::Char).to_ref(),
                ),
                sql("sql-3", "select * from {{j}}"),
            ],
        ),
    ]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let j = arena.node("j").unwrap();
    assert_eq!(j.formula[1].error_msg, Some(FormulaError::IndexError));
}
