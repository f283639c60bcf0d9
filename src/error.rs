//! Crate error types.
//!
//! Validation outcomes of operators (`MissingLine`, `ConfigError`, ...) are node
//! state, not errors; see `parse::types::FormulaError`. The types here cover
//! malformed input, graph construction and remote collaborators.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Parse,
    Graph,
    Config,
    Service,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "Parse"),
            Phase::Graph => write!(f, "Graph"),
            Phase::Config => write!(f, "Config"),
            Phase::Service => write!(f, "Service"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    pub node_id: Option<String>,
}

impl std::fmt::Display for FusionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node_id {
            Some(id) => write!(
                f,
                "[{}:{}] {} (node '{}')",
                self.phase, self.code, self.message, id
            ),
            None => write!(f, "[{}:{}] {}", self.phase, self.code, self.message),
        }
    }
}

impl std::error::Error for FusionError {}

impl FusionError {
    pub fn parse(code: &str, message: impl Into<String>) -> Self {
        FusionError {
            code: code.into(),
            phase: Phase::Parse,
            message: message.into(),
            node_id: None,
        }
    }

    pub fn graph(code: &str, message: impl Into<String>, node_id: Option<String>) -> Self {
        FusionError {
            code: code.into(),
            phase: Phase::Graph,
            message: message.into(),
            node_id,
        }
    }

    pub fn service(code: &str, message: impl Into<String>, node_id: Option<String>) -> Self {
        FusionError {
            code: code.into(),
            phase: Phase::Service,
            message: message.into(),
            node_id,
        }
    }
}

impl From<crate::context::ConfigError> for FusionError {
    fn from(e: crate::context::ConfigError) -> Self {
        FusionError {
            code: "C001".into(),
            phase: Phase::Config,
            message: e.to_string(),
            node_id: None,
        }
    }
}

/// Failure reported by a remote collaborator (catalog, query engine, sampler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True when `code` is one of the configured "resource missing" codes
    /// (view deleted, offline, datasource gone, table gone).
    pub fn is_resource_missing(&self, not_found_codes: &[String]) -> bool {
        not_found_codes.iter().any(|c| c == &self.code)
    }
}

impl From<ServiceError> for FusionError {
    fn from(e: ServiceError) -> Self {
        FusionError::service(&e.code, e.message, None)
    }
}
