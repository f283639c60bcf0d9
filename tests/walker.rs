//! Whole-graph revalidation: ordering, cascading failure, idempotence.

mod helpers;

use helpers::*;
use viewfusion::parse::types::*;
use viewfusion::walk::{revalidate_from, tracking_calculation_all};

fn orders_view() -> viewfusion::service::ViewDetails {
    view(&[("f1", "name", "varchar(32)"), ("f2", "age", "int")])
}

fn source_fields() -> Vec<Field> {
    [("f1", "name", DataType::Char), ("f2", "age", DataType::Int)]
        .into_iter()
        .map(|(id, alias, ty)| Field {
            name_en: Some(format!("col_{}", id)),
            ..field(id, "form-1", alias, ty)
        })
        .collect()
}

/// root (form) → {b, c} (select) → d (merge)
fn diamond() -> Vec<FusionNode> {
    let f1 = source_fields()[0].to_ref();
    vec![
        node("root", &[], vec![form("form-1", "t-orders")]),
        node("b", &["root"], vec![select("sel-b", vec![])]),
        node("c", &["root"], vec![select("sel-c", vec![])]),
        node(
            "d",
            &["b", "c"],
            vec![merge("merge-d", vec![("b", vec![f1.clone()]), ("c", vec![f1])])],
        ),
    ]
}

#[tokio::test]
async fn form_without_saved_config_outputs_every_column() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(vec![node("root", &[], vec![form("form-1", "t-orders")])]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let root = arena.node("root").unwrap();
    assert_eq!(root.output_fields, source_fields());
    assert_eq!(root.formula[0].error_msg, None);
    assert!(root.executable);
}

#[tokio::test]
async fn diamond_resolves_join_point_once() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(diamond());

    let report = tracking_calculation_all(&mut arena, &h.ctx()).await;

    assert_eq!(report.visited.iter().filter(|id| *id == "d").count(), 1);
    let position = |id: &str| report.visited.iter().position(|v| v == id).unwrap();
    assert!(position("d") > position("b"));
    assert!(position("d") > position("c"));
    assert!(report.unresolved.is_empty());

    let d = arena.node("d").unwrap();
    assert_eq!(d.formula[0].error_msg, None);
    assert_eq!(d.output_fields.len(), 1);
    assert_eq!(d.output_fields[0].source_id, "merge-d");
}

#[tokio::test]
async fn second_pass_changes_nothing() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(diamond());

    tracking_calculation_all(&mut arena, &h.ctx()).await;
    let first = arena.to_graph();
    tracking_calculation_all(&mut arena, &h.ctx()).await;
    assert_eq!(arena.to_graph(), first);
}

fn key_ref(id: &str, source_id: &str) -> FieldRef {
    FieldRef {
        id: id.into(),
        source_id: source_id.into(),
        ..FieldRef::default()
    }
}

fn group(field: FieldRef, alias: &str, format: DateFormat) -> GroupConfig {
    GroupConfig {
        field: FieldRef {
            alias: Some(alias.into()),
            ..field
        },
        format: Some(format),
    }
}

#[tokio::test]
async fn one_date_grouped_twice_survives_a_second_pass() {
    let h = Harness::new();
    h.backend
        .set_view("t-sales", view(&[("day", "day", "date"), ("amt", "amt", "float")]));
    let day = key_ref("day", "form-1");
    let amt = key_ref("amt", "form-1");
    let indicator = Formula::with_config(
        "ind-1",
        OperatorConfig::Indicator(IndicatorConfig {
            measure: Some(MeasureConfig {
                field: Some(amt),
                aggregate: Aggregate::Sum,
                alias: None,
            }),
            group: vec![
                group(day.clone(), "y", DateFormat::Year),
                group(day, "m", DateFormat::Month),
            ],
        }),
    );
    let mut arena = arena(vec![
        node("root", &[], vec![form("form-1", "t-sales")]),
        node("n", &["root"], vec![indicator, select("s1", vec![])]),
    ]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;
    let first = arena.to_graph();
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let aliases: Vec<&str> = arena
        .node("n")
        .unwrap()
        .output_fields
        .iter()
        .map(|f| f.alias.as_str())
        .collect();
    assert_eq!(aliases, vec!["y", "m", "sum_amt"]);
    assert_eq!(arena.to_graph(), first);
}

#[tokio::test]
async fn merged_join_columns_survive_a_second_pass() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let left = key_ref("f1", "form-a");
    let right = key_ref("f1", "form-b");
    // the right-hand "name" is renamed so the join output is unambiguous
    let join_fields = vec![
        left.clone(),
        FieldRef {
            alias: Some("name_b".into()),
            original_name: Some("name".into()),
            ..right.clone()
        },
    ];
    let renamed_join = |id: &str| {
        let mut formula = join(id, left.clone(), right.clone());
        if let OperatorConfig::Join(config) = &mut formula.operator {
            config.config_fields = join_fields.clone();
        }
        formula
    };
    let columns = vec![left.clone(), right.clone()];
    let mut arena = arena(vec![
        node("a", &[], vec![form("form-a", "t-orders")]),
        node("b", &[], vec![form("form-b", "t-orders")]),
        node("j1", &["a", "b"], vec![renamed_join("join-1")]),
        node("j2", &["a", "b"], vec![renamed_join("join-2")]),
        node(
            "m",
            &["j1", "j2"],
            vec![
                merge("merge-m", vec![("j1", columns.clone()), ("j2", columns)]),
                select("s1", vec![]),
            ],
        ),
    ]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;
    let first = arena.to_graph();
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let m = arena.node("m").unwrap();
    assert_eq!(m.formula[0].error_msg, None);
    let out: Vec<(&str, &str, &str)> = m
        .output_fields
        .iter()
        .map(|f| (f.id.as_str(), f.source_id.as_str(), f.alias.as_str()))
        .collect();
    assert_eq!(
        out,
        vec![("f1", "merge-m", "name"), ("form-b/f1", "merge-m", "name_b")]
    );
    assert_eq!(arena.to_graph(), first);
}

#[tokio::test]
async fn failed_source_cascades_missing_data() {
    let h = Harness::new();
    // no view registered: the form fails
    let mut arena = arena(diamond());

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let root = arena.node("root").unwrap();
    assert_eq!(root.formula[0].error_msg, Some(FormulaError::ConfigError));
    for id in ["b", "c", "d"] {
        let n = arena.node(id).unwrap();
        assert_eq!(n.formula[0].error_msg, Some(FormulaError::MissingData), "node {}", id);
        assert!(n.output_fields.is_empty());
        assert!(!n.executable);
    }
}

#[tokio::test]
async fn later_operators_inherit_missing_data() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let gone = FieldRef {
        id: "gone".into(),
        source_id: "form-1".into(),
        ..FieldRef::default()
    };
    let mut arena = arena(vec![node(
        "root",
        &[],
        vec![
            form("form-1", "t-orders"),
            filter("w1", gone, FilterOperator::Null),
            select("s1", vec![]),
        ],
    )]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let root = arena.node("root").unwrap();
    assert_eq!(root.formula[0].error_msg, None);
    assert_eq!(root.formula[1].error_msg, Some(FormulaError::ConfigError));
    assert_eq!(root.formula[2].error_msg, Some(FormulaError::MissingData));
    assert!(root.output_fields.is_empty());
}

#[tokio::test]
async fn illegal_position_is_index_error() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(vec![node(
        "root",
        &[],
        vec![
            form("form-1", "t-orders"),
            output_view("out", vec![]),
            select("s1", vec![]),
        ],
    )]);

    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let root = arena.node("root").unwrap();
    assert_eq!(root.formula[1].error_msg, Some(FormulaError::IndexError));
    assert_eq!(root.formula[2].error_msg, Some(FormulaError::MissingData));
}

#[tokio::test]
async fn cycle_members_stay_unresolved() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(vec![
        node("root", &[], vec![form("form-1", "t-orders")]),
        node("x", &["root", "y"], vec![select("sx", vec![])]),
        node("y", &["x"], vec![select("sy", vec![])]),
    ]);

    let report = tracking_calculation_all(&mut arena, &h.ctx()).await;

    assert_eq!(report.visited, vec!["root".to_string()]);
    let mut unresolved = report.unresolved.clone();
    unresolved.sort();
    assert_eq!(unresolved, vec!["x".to_string(), "y".to_string()]);
    assert!(arena.node("x").unwrap().output_fields.is_empty());
}

#[tokio::test]
async fn upstream_rename_reaches_downstream_nodes() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(diamond());
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    h.backend
        .set_view("t-orders", view(&[("f1", "customer", "varchar"), ("f2", "age", "int")]));
    let report = revalidate_from(&mut arena, &["root"], &h.ctx()).await;
    assert_eq!(report.visited.len(), 4);

    let b = arena.node("b").unwrap();
    assert_eq!(b.output_fields[0].alias, "customer");
    let d = arena.node("d").unwrap();
    assert_eq!(d.output_fields[0].alias, "customer");
}

#[tokio::test]
async fn revalidating_a_leaf_leaves_siblings_alone() {
    let h = Harness::new();
    h.backend.set_view("t-orders", orders_view());
    let mut arena = arena(diamond());
    tracking_calculation_all(&mut arena, &h.ctx()).await;

    let report = revalidate_from(&mut arena, &["b"], &h.ctx()).await;
    assert_eq!(report.visited, vec!["b".to_string(), "d".to_string()]);
}
