//! Embedded runtimes
//!
//! In-process execution backends. Every job gets a private mount (a
//! temporary directory holding the materialized snapshot) that is torn down
//! on every exit path before the job's `Exit` is emitted.
//!
//! Only one embedded job may run at a time across all sessions; the
//! [`EmbeddedPermit`] is shared by the interpreter and compiled runtimes and
//! a second job is rejected with a busy diagnostic instead of queued.
//!
//! - `quickjs` - `.js` on an in-process QuickJS engine
//! - `local` - host toolchains run inside the private mount

mod local;
mod quickjs;

pub use local::LocalToolchainEngine;
pub use quickjs::QuickJsEngine;

use crate::backend::ExecutionBackend;
use crate::job::{self, ExecutionHandle, ExecutionRequest, JobControl, JobSink, JobStream};
use crate::sandbox::{ResolvedEntry, SandboxSession};
use crate::toolchain::ToolchainTable;
use async_trait::async_trait;
use orbit_foundation::{BackendId, Error, JobId, Result, ToolchainKind};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, info_span, Instrument};

// ============================================================================
// Permit
// ============================================================================

/// Process-wide mutual exclusion for embedded jobs
#[derive(Debug, Clone)]
pub struct EmbeddedPermit {
    semaphore: Arc<Semaphore>,
}

impl Default for EmbeddedPermit {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedPermit {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the permit or fail fast with [`Error::Busy`]
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| Error::Busy("embedded runtime is busy: another job is running".into()))
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One job handed to an engine
pub struct EngineJob<'a> {
    pub entry: &'a ResolvedEntry,
    /// Private mount holding the materialized snapshot
    pub session: &'a mut SandboxSession,
    pub control: &'a mut JobControl,
    pub sink: &'a JobSink,
}

/// Execution technology behind an embedded runtime
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this engine runs `entry`
    fn handles(&self, entry: &ResolvedEntry) -> bool;

    /// Run the job and return its exit code
    async fn execute(&self, job: EngineJob<'_>) -> Result<i32>;
}

// ============================================================================
// Runtime
// ============================================================================

/// Embedded backend (interpreter or compiled)
pub struct EmbeddedRuntime {
    id: BackendId,
    kind: ToolchainKind,
    permit: EmbeddedPermit,
    toolchains: Arc<ToolchainTable>,
    engines: Vec<Arc<dyn Engine>>,
    packages: Option<Arc<TempDir>>,
}

impl EmbeddedRuntime {
    /// Interpreter runtime: QuickJS for `.js`, host interpreters otherwise.
    /// Owns the directory `pip install` installs into.
    pub fn interpreter(permit: EmbeddedPermit, toolchains: Arc<ToolchainTable>) -> Result<Self> {
        let packages = tempfile::Builder::new()
            .prefix("orbit-packages-")
            .tempdir()?;
        Ok(Self {
            id: BackendId::Interpreter,
            kind: ToolchainKind::Interpreted,
            permit,
            toolchains,
            engines: interpreter_engines(QuickJsEngine::new()),
            packages: Some(Arc::new(packages)),
        })
    }

    /// Compiled runtime: compile-then-run inside the private mount
    pub fn compiled(permit: EmbeddedPermit, toolchains: Arc<ToolchainTable>) -> Self {
        Self {
            id: BackendId::Compiled,
            kind: ToolchainKind::Compiled,
            permit,
            toolchains,
            engines: vec![Arc::new(LocalToolchainEngine)],
            packages: None,
        }
    }

    /// Cap the heap of in-process scripts. No effect on the compiled runtime.
    pub fn with_script_memory_limit(mut self, bytes: usize) -> Self {
        if self.kind == ToolchainKind::Interpreted {
            self.engines = interpreter_engines(QuickJsEngine::new().with_memory_limit(bytes));
        }
        self
    }

    pub fn permit(&self) -> &EmbeddedPermit {
        &self.permit
    }

    /// Directory packages are installed into (interpreter runtime only)
    pub fn package_dir(&self) -> Option<PathBuf> {
        self.packages.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Install a package as a job on this runtime. Holds the shared permit
    /// like any other embedded job.
    pub fn install(&self, package: &str, job_id: JobId) -> (ExecutionHandle, JobStream) {
        let Some(dir) = self.package_dir() else {
            return job::rejected(
                job_id,
                Error::validation("package installation needs the interpreter runtime"),
            );
        };
        if let Err(err) = local::validate_package(package) {
            return job::rejected(job_id, err);
        }
        let permit = match self.permit.try_acquire() {
            Ok(permit) => permit,
            Err(err) => return job::rejected(job_id, err),
        };

        let (handle, control) = ExecutionHandle::pair(job_id);
        let (sink, stream) = JobSink::channel();
        let package = package.to_string();
        let span = info_span!("install", job_id = %job_id, package = %package);
        tokio::spawn(
            async move {
                let outcome = local::install(&package, &dir, control, &sink).await;
                drop(permit);
                match &outcome {
                    Ok(0) => info!("package installed"),
                    Ok(code) => info!(code, "package install failed"),
                    Err(err) => info!("package install failed: {}", err),
                }
                sink.finish(outcome);
            }
            .instrument(span),
        );
        (handle, stream)
    }
}

/// Engines tried in order; first match wins
fn interpreter_engines(quickjs: QuickJsEngine) -> Vec<Arc<dyn Engine>> {
    vec![Arc::new(quickjs), Arc::new(LocalToolchainEngine)]
}

impl ExecutionBackend for EmbeddedRuntime {
    fn id(&self) -> BackendId {
        self.id
    }

    fn run(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream) {
        let permit = match self.permit.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                debug!(job_id = %request.job_id, "embedded runtime busy");
                return job::rejected(request.job_id, err);
            }
        };

        let (handle, control) = ExecutionHandle::pair(request.job_id);
        let (sink, stream) = JobSink::channel();
        let span = info_span!(
            "embedded",
            backend = %self.id,
            job_id = %request.job_id,
            session_id = %request.session_id
        );
        let job = EmbeddedJob {
            kind: self.kind,
            toolchains: Arc::clone(&self.toolchains),
            engines: self.engines.clone(),
            packages: self.package_dir(),
            request,
        };
        tokio::spawn(
            async move {
                let outcome = job.run(control, &sink).await;
                // mount is gone and the permit released before Exit
                drop(permit);
                sink.finish(outcome);
            }
            .instrument(span),
        );
        (handle, stream)
    }

    fn is_available(&self) -> bool {
        !self.permit.is_busy()
    }
}

struct EmbeddedJob {
    kind: ToolchainKind,
    toolchains: Arc<ToolchainTable>,
    engines: Vec<Arc<dyn Engine>>,
    packages: Option<PathBuf>,
    request: ExecutionRequest,
}

impl EmbeddedJob {
    async fn run(self, mut control: JobControl, sink: &JobSink) -> Result<i32> {
        let snapshot = &self.request.workspace_snapshot;
        let entry = ResolvedEntry::resolve(snapshot, &self.request.entry_path, &self.toolchains)?;
        entry.require(self.kind)?;
        let engine = self
            .engines
            .iter()
            .find(|engine| engine.handles(&entry))
            .cloned()
            .ok_or_else(|| {
                Error::validation(format!("no embedded engine for '.{}' files", entry.extension))
            })?;

        let mut session = SandboxSession::provision(None, self.request.job_id, snapshot).await?;
        if let Some(dir) = &self.packages {
            session.set_env("PYTHONPATH", dir.to_string_lossy());
        }
        info!(engine = engine.name(), entry = %entry.vpath, "embedded job started");

        let outcome = engine
            .execute(EngineJob {
                entry: &entry,
                session: &mut session,
                control: &mut control,
                sink,
            })
            .await;
        session.close();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_is_exclusive() {
        let permit = EmbeddedPermit::new();
        let shared = permit.clone();

        let held = permit.try_acquire().unwrap();
        assert!(shared.is_busy());
        assert!(matches!(shared.try_acquire(), Err(Error::Busy(_))));

        drop(held);
        assert!(!shared.is_busy());
        assert!(shared.try_acquire().is_ok());
    }
}
