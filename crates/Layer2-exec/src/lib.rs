//! # orbit-exec
//!
//! Execution backends for Orbit.
//! Every backend honours the same contract: `run` returns a handle
//! (`write`, `kill`) and a stream of output chunks that ends with exactly one
//! `Exit`, even when nothing could be spawned.
//!
//! ## Features
//!
//! - Sandbox pipeline: provision → compile → run → cleanup in a per-job directory
//! - Embedded runtimes (interpreter / compiled) behind one shared permit
//! - QuickJS engine for in-process JavaScript
//! - Remote backend multiplexing jobs over one WebSocket
//! - Extension → backend routing and a configurable toolchain table

pub mod backend;
pub mod embedded;
pub mod job;
pub mod remote;
pub mod sandbox;
pub mod toolchain;
pub mod utf8;

// Backend system
pub use backend::{BackendRegistry, ExecutionBackend};
pub use job::{
    ExecEvent, ExecutionHandle, ExecutionRequest, JobControl, JobSink, JobStream, OutputSender,
};

// Runtimes
pub use embedded::{
    EmbeddedPermit, EmbeddedRuntime, Engine, EngineJob, LocalToolchainEngine, QuickJsEngine,
};
pub use remote::RemoteBackend;
pub use sandbox::{ResolvedEntry, Sandbox, SandboxPhase, SandboxSession};

// Toolchains
pub use toolchain::{TemplateVars, ToolchainTable};
pub use utf8::Utf8Chunker;
