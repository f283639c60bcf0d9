//! External collaborators consumed by the validators.
//!
//! Only their input/output contracts matter here: the catalog metadata
//! service, the query engine (preview, SQL compilation, raw SQL) and the
//! sampling service. Implementations live in the host application;
//! `memory::MemoryBackend` answers from in-memory tables.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::run_param::RunViewParam;

pub use memory::{MemoryBackend, MemorySnapshot};

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewField {
    pub id: String,
    pub business_name: String,
    pub technical_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewDetails {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<ViewField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    /// Values of column `index`, in row order.
    pub fn column_values(&self, index: usize) -> Vec<serde_json::Value> {
        self.data
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRequest {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlExecRequest {
    pub sql: String,
    /// Operator the statement belongs to.
    pub formula_id: String,
    pub limit: u32,
}

// =============================================================================
// SERVICES
// =============================================================================

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Live schema of a form view.
    async fn get_datasheet_view_details(&self, form_id: &str) -> Result<ViewDetails, ServiceError>;
}

#[async_trait]
pub trait QueryService: Send + Sync {
    /// Execute an operator chain and return a row preview.
    async fn run_scene_view(
        &self,
        param: &RunViewParam,
        limit: u32,
    ) -> Result<QueryResult, ServiceError>;

    /// Compile an operator chain into the SQL the engine would execute.
    async fn get_exec_sql(&self, param: &RunViewParam) -> Result<String, ServiceError>;

    /// Run (or describe, with a small limit) a raw SQL statement.
    async fn exec_custom_view_sql(
        &self,
        request: &SqlExecRequest,
    ) -> Result<QueryResult, ServiceError>;
}

#[async_trait]
pub trait SampleService: Send + Sync {
    async fn get_virtual_engine_example(
        &self,
        request: &ExampleRequest,
    ) -> Result<QueryResult, ServiceError>;
}

/// The three collaborators, borrowed for the duration of a validation run.
#[derive(Clone, Copy)]
pub struct Backend<'a> {
    pub catalog: &'a dyn CatalogService,
    pub query: &'a dyn QueryService,
    pub sample: &'a dyn SampleService,
}

impl<'a> Backend<'a> {
    /// One object serving all three roles.
    pub fn uniform<T>(backend: &'a T) -> Self
    where
        T: CatalogService + QueryService + SampleService,
    {
        Backend {
            catalog: backend,
            query: backend,
            sample: backend,
        }
    }
}
