//! In-memory backend answering from a JSON-serializable snapshot.
//!
//! Used by the browser entry points (the host passes schemas it already
//! holds) and by tests. Every call is counted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    CatalogService, ExampleRequest, QueryResult, QueryService, SampleService, SqlExecRequest,
    ViewDetails,
};
use crate::error::ServiceError;
use crate::run_param::RunViewParam;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySnapshot {
    /// form id → live schema
    pub views: HashMap<String, ViewDetails>,
    /// form id → error returned instead of a schema
    pub view_errors: HashMap<String, ServiceError>,
    /// table name → sample rows
    pub examples: HashMap<String, QueryResult>,
    /// formula id → result of running that operator's SQL
    pub sql_results: HashMap<String, QueryResult>,
    /// node id → preview rows
    pub previews: HashMap<String, QueryResult>,
    /// node ids whose SQL compilation fails
    pub exec_sql_failures: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ViewDetails,
    Example,
    ExecSql,
    CustomSql,
    SceneView,
}

#[derive(Default)]
struct CallCounts {
    view_details: AtomicUsize,
    example: AtomicUsize,
    exec_sql: AtomicUsize,
    custom_sql: AtomicUsize,
    scene_view: AtomicUsize,
}

impl CallCounts {
    fn counter(&self, call: Call) -> &AtomicUsize {
        match call {
            Call::ViewDetails => &self.view_details,
            Call::Example => &self.example,
            Call::ExecSql => &self.exec_sql,
            Call::CustomSql => &self.custom_sql,
            Call::SceneView => &self.scene_view,
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    snapshot: RwLock<MemorySnapshot>,
    calls: CallCounts,
}

impl MemoryBackend {
    pub fn new(snapshot: MemorySnapshot) -> Self {
        MemoryBackend {
            snapshot: RwLock::new(snapshot),
            calls: CallCounts::default(),
        }
    }

    pub fn set_view(&self, form_id: impl Into<String>, details: ViewDetails) {
        let form_id = form_id.into();
        let mut snapshot = self.snapshot.write();
        snapshot.view_errors.remove(&form_id);
        snapshot.views.insert(form_id, details);
    }

    pub fn fail_view(&self, form_id: impl Into<String>, error: ServiceError) {
        let form_id = form_id.into();
        let mut snapshot = self.snapshot.write();
        snapshot.views.remove(&form_id);
        snapshot.view_errors.insert(form_id, error);
    }

    pub fn set_example(&self, table: impl Into<String>, rows: QueryResult) {
        self.snapshot.write().examples.insert(table.into(), rows);
    }

    pub fn set_sql_result(&self, formula_id: impl Into<String>, result: QueryResult) {
        self.snapshot.write().sql_results.insert(formula_id.into(), result);
    }

    pub fn set_preview(&self, node_id: impl Into<String>, result: QueryResult) {
        self.snapshot.write().previews.insert(node_id.into(), result);
    }

    pub fn fail_exec_sql(&self, node_id: impl Into<String>) {
        self.snapshot.write().exec_sql_failures.insert(node_id.into());
    }

    pub fn calls(&self, call: Call) -> usize {
        self.calls.counter(call).load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.counter(call).fetch_add(1, Ordering::SeqCst);
    }
}

fn last_node_id(param: &RunViewParam) -> Option<&str> {
    param.nodes.last().map(|n| n.id.as_str())
}

#[async_trait]
impl CatalogService for MemoryBackend {
    async fn get_datasheet_view_details(&self, form_id: &str) -> Result<ViewDetails, ServiceError> {
        self.record(Call::ViewDetails);
        let snapshot = self.snapshot.read();
        if let Some(err) = snapshot.view_errors.get(form_id) {
            return Err(err.clone());
        }
        snapshot.views.get(form_id).cloned().ok_or_else(|| {
            ServiceError::new(
                "DataView.FormView.FormViewIdNotExist",
                format!("form view '{}' does not exist", form_id),
            )
        })
    }
}

#[async_trait]
impl QueryService for MemoryBackend {
    async fn run_scene_view(
        &self,
        param: &RunViewParam,
        limit: u32,
    ) -> Result<QueryResult, ServiceError> {
        self.record(Call::SceneView);
        let snapshot = self.snapshot.read();
        let mut result = last_node_id(param)
            .and_then(|id| snapshot.previews.get(id))
            .cloned()
            .unwrap_or_default();
        result.data.truncate(limit as usize);
        Ok(result)
    }

    async fn get_exec_sql(&self, param: &RunViewParam) -> Result<String, ServiceError> {
        self.record(Call::ExecSql);
        let node_id = last_node_id(param)
            .ok_or_else(|| ServiceError::new("Query.Param.Empty", "run param has no nodes"))?;
        if self.snapshot.read().exec_sql_failures.contains(node_id) {
            return Err(ServiceError::new(
                "Query.Sql.CompileFailed",
                format!("cannot compile node '{}'", node_id),
            ));
        }
        let encoded = serde_json::to_string(param)
            .map_err(|e| ServiceError::new("Query.Param.Invalid", e.to_string()))?;
        let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
        Ok(format!("SELECT * FROM \"view_{}\" /* {} */", node_id, &digest[..12]))
    }

    async fn exec_custom_view_sql(
        &self,
        request: &SqlExecRequest,
    ) -> Result<QueryResult, ServiceError> {
        self.record(Call::CustomSql);
        let mut result = self
            .snapshot
            .read()
            .sql_results
            .get(&request.formula_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::new(
                    "Query.Sql.ExecFailed",
                    format!("no result registered for operator '{}'", request.formula_id),
                )
            })?;
        result.data.truncate(request.limit as usize);
        Ok(result)
    }
}

#[async_trait]
impl SampleService for MemoryBackend {
    async fn get_virtual_engine_example(
        &self,
        request: &ExampleRequest,
    ) -> Result<QueryResult, ServiceError> {
        self.record(Call::Example);
        let mut rows = self
            .snapshot
            .read()
            .examples
            .get(&request.table)
            .cloned()
            .unwrap_or_default();
        rows.data.truncate(request.limit as usize);
        Ok(rows)
    }
}
