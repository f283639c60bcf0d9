//! Engine configuration and the explicit validation context.

use serde::{Deserialize, Serialize};

use crate::catalog::FieldCatalog;
use crate::service::Backend;

/// Catalog error codes meaning "the referenced view/table is gone", as
/// opposed to a generic failure.
pub const DEFAULT_NOT_FOUND_CODES: [&str; 4] = [
    "DataView.FormView.FormViewIdNotExist",
    "DataView.FormView.FormViewOffline",
    "DataView.FormView.DataSourceNotExist",
    "DataView.FormView.TableNotExist",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse engine config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid engine config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub not_found_codes: Vec<String>,
    /// Rows requested when sampling a form table.
    pub example_limit: u32,
    pub fetch_examples: bool,
    /// Rows requested by operator previews and SQL describes.
    pub preview_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            not_found_codes: DEFAULT_NOT_FOUND_CODES.iter().map(|c| c.to_string()).collect(),
            example_limit: 10,
            fetch_examples: true,
            preview_limit: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.preview_limit == 0 {
            return Err(ConfigError::Invalid("preview_limit must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// May sample and preview row data (not only schemas).
    pub preview_data: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions { preview_data: true }
    }
}

/// Everything a validator may consult besides the graph itself.
pub struct ValidationContext<'a> {
    pub config: &'a EngineConfig,
    pub catalog: &'a FieldCatalog,
    pub backend: Backend<'a>,
    pub user: Option<&'a str>,
    pub permissions: &'a Permissions,
    /// Hosted inside another application's widget; previews are suppressed.
    pub embedded: bool,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        config: &'a EngineConfig,
        catalog: &'a FieldCatalog,
        backend: Backend<'a>,
        permissions: &'a Permissions,
    ) -> Self {
        ValidationContext {
            config,
            catalog,
            backend,
            user: None,
            permissions,
            embedded: false,
        }
    }

    pub fn may_sample(&self) -> bool {
        self.config.fetch_examples && self.permissions.preview_data && !self.embedded
    }
}
