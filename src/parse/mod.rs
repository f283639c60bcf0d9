//! Parse phase: persisted graph JSON → Rust types + DAG construction.

pub mod graph;
pub mod types;

pub use graph::FusionDag;
pub use types::*;

use crate::error::FusionError;

/// Deserialize a saved fusion graph.
pub fn parse(json: &str) -> Result<FusionGraph, Vec<FusionError>> {
    serde_json::from_str::<FusionGraph>(json).map_err(|e| {
        vec![FusionError::parse(
            "P001",
            format!("Failed to parse fusion graph JSON: {}", e),
        )]
    })
}

/// Parse JSON and build the DAG in one step.
pub fn parse_and_build(json: &str) -> Result<(FusionGraph, FusionDag), Vec<FusionError>> {
    let graph = parse(json)?;
    let dag = FusionDag::build(&graph.nodes)?;
    Ok((graph, dag))
}
