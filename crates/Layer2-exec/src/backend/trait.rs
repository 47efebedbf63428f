//! Execution backend trait

use crate::job::{ExecutionHandle, ExecutionRequest, JobStream};
use orbit_foundation::BackendId;

/// ExecutionBackend trait - implement to add new execution backends
///
/// `run` never fails: every failure (unresolvable path, unsupported
/// toolchain, busy runtime, spawn error) is reported on the returned stream
/// as a stderr diagnostic followed by a non-zero `Exit`.
pub trait ExecutionBackend: Send + Sync {
    /// Backend identifier
    fn id(&self) -> BackendId;

    /// Start a job. Must be called from within a tokio runtime.
    fn run(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream);

    /// Check if the backend can currently accept jobs
    fn is_available(&self) -> bool {
        true
    }
}
