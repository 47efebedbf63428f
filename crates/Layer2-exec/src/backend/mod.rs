//! Execution backends
//!
//! - `ExecutionBackend` - uniform run / write / kill contract
//! - `BackendRegistry` - extension → backend routing

pub mod registry;
pub mod r#trait;

pub use r#trait::ExecutionBackend;
pub use registry::BackendRegistry;
