//! WASM entry points for browser use.

use wasm_bindgen::prelude::*;

use crate::arena::NodeArena;
use crate::catalog::FieldCatalog;
use crate::context::{EngineConfig, Permissions, ValidationContext};
use crate::error::FusionError;
use crate::parse::types::{Field, FieldRef, FusionGraph};
use crate::reconcile::{Reconciliation, check_sort_and_rename_fields};
use crate::run_param::{RunViewParam, get_run_view_param, upstream_nodes};
use crate::service::{Backend, MemoryBackend, MemorySnapshot};
use crate::walk::{self, WalkReport};

/// Reconcile a saved field selection against live upstream fields.
/// Returns the reconciliation, or an array of errors.
#[wasm_bindgen]
pub fn reconcile_fields(upstream_json: &str, saved_json: &str) -> JsValue {
    let result = reconcile_fields_inner(upstream_json, saved_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn reconcile_fields_inner(upstream_json: &str, saved_json: &str) -> Outcome<Reconciliation> {
    let upstream = match serde_json::from_str::<Vec<Field>>(upstream_json) {
        Ok(f) => f,
        Err(e) => return Outcome::parse_failure("upstream fields", e),
    };
    let saved = match serde_json::from_str::<Vec<FieldRef>>(saved_json) {
        Ok(f) => f,
        Err(e) => return Outcome::parse_failure("saved fields", e),
    };
    Outcome::ok(check_sort_and_rename_fields(&upstream, &saved))
}

/// Execution plan for `node_id`, optionally cut at operator `stop_at`.
#[wasm_bindgen]
pub fn build_run_param(graph_json: &str, node_id: &str, stop_at: Option<String>) -> JsValue {
    let result = build_run_param_inner(graph_json, node_id, stop_at.as_deref());
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn build_run_param_inner(graph_json: &str, node_id: &str, stop_at: Option<&str>) -> Outcome<RunViewParam> {
    let arena = match load(graph_json) {
        Ok(a) => a,
        Err(errors) => return Outcome::failed(errors),
    };
    if let Err(errors) = arena.require(node_id) {
        return Outcome::failed(errors);
    }
    let chain = upstream_nodes(&arena, node_id);
    Outcome::ok(get_run_view_param(&chain, &FieldCatalog::new(), stop_at))
}

/// Full revalidation against schemas the host already holds.
/// Returns `{ status, result: { graph, report } }` or `{ status, errors }`.
#[wasm_bindgen]
pub fn validate_graph(graph_json: &str, snapshot_json: &str, config_json: &str) -> JsValue {
    let result = validate_graph_inner(graph_json, snapshot_json, config_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn validate_graph_inner(graph_json: &str, snapshot_json: &str, config_json: &str) -> Outcome<Validated> {
    let mut arena = match load(graph_json) {
        Ok(a) => a,
        Err(errors) => return Outcome::failed(errors),
    };
    let snapshot = match serde_json::from_str::<MemorySnapshot>(snapshot_json) {
        Ok(s) => s,
        Err(e) => return Outcome::parse_failure("service snapshot", e),
    };
    let config = if config_json.trim().is_empty() {
        EngineConfig::default()
    } else {
        match EngineConfig::from_json(config_json) {
            Ok(c) => c,
            Err(e) => return Outcome::failed(vec![FusionError::from(e)]),
        }
    };

    let backend = MemoryBackend::new(snapshot);
    let catalog = FieldCatalog::new();
    let permissions = Permissions::default();
    let ctx = ValidationContext::new(&config, &catalog, Backend::uniform(&backend), &permissions);

    let report = futures::executor::block_on(walk::tracking_calculation_all(&mut arena, &ctx));
    Outcome::ok(Validated {
        graph: arena.to_graph(),
        report,
    })
}

fn load(graph_json: &str) -> Result<NodeArena, Vec<FusionError>> {
    NodeArena::from_graph(crate::parse::parse(graph_json)?)
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize, serde::Deserialize)]
struct ErrorDto {
    code: String,
    phase: String,
    message: String,
    node_id: Option<String>,
}

impl From<FusionError> for ErrorDto {
    fn from(e: FusionError) -> Self {
        ErrorDto {
            code: e.code,
            phase: e.phase.to_string(),
            message: e.message,
            node_id: e.node_id,
        }
    }
}

#[derive(serde::Serialize)]
struct Validated {
    graph: FusionGraph,
    report: WalkReport,
}

#[derive(serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome<T> {
    Success { result: T },
    Errors { errors: Vec<ErrorDto> },
}

impl<T> Outcome<T> {
    fn ok(result: T) -> Self {
        Outcome::Success { result }
    }

    fn failed(errors: Vec<FusionError>) -> Self {
        Outcome::Errors {
            errors: errors.into_iter().map(ErrorDto::from).collect(),
        }
    }

    fn parse_failure(what: &str, e: serde_json::Error) -> Self {
        Self::failed(vec![FusionError::parse(
            "P001",
            format!("Failed to parse {} JSON: {}", what, e),
        )])
    }
}
