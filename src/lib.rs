pub mod arena;
pub mod catalog;
pub mod context;
pub mod error;
pub mod parse;
pub mod reconcile;
pub mod run_param;
pub mod service;
pub mod validate;
pub mod walk;
pub mod wasm;
pub mod workspace;
