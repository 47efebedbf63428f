//! Job plumbing shared by every backend
//!
//! A job produces a stream of [`ExecEvent`]s terminated by exactly one
//! `Exit`. The caller keeps an [`ExecutionHandle`] for input and
//! cancellation; the backend keeps the matching [`JobControl`] and a
//! [`JobSink`].

use orbit_foundation::{BackendId, Error, JobId, Vfs};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One item of a job's output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(i32),
}

impl ExecEvent {
    pub fn is_exit(&self) -> bool {
        matches!(self, ExecEvent::Exit(_))
    }
}

/// Receiving half of a job's output
pub type JobStream = mpsc::UnboundedReceiver<ExecEvent>;

/// Value built once per submitted runtime command
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub job_id: JobId,
    pub backend_id: BackendId,
    /// Absolute, normalized VFS path of the entry file
    pub entry_path: String,
    pub workspace_snapshot: Arc<Vfs>,
    /// Label of the issuing session, used for log spans
    pub session_id: String,
}

impl ExecutionRequest {
    pub fn new(backend_id: BackendId, entry_path: impl Into<String>, snapshot: Arc<Vfs>) -> Self {
        Self {
            job_id: JobId::new(),
            backend_id,
            entry_path: entry_path.into(),
            workspace_snapshot: snapshot,
            session_id: String::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }
}

// ============================================================================
// Handle / Control
// ============================================================================

/// Caller side of a running job
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    job_id: JobId,
    stdin: mpsc::UnboundedSender<Vec<u8>>,
    cancel: CancellationToken,
}

/// Backend side of a running job
#[derive(Debug)]
pub struct JobControl {
    pub stdin: mpsc::UnboundedReceiver<Vec<u8>>,
    pub cancel: CancellationToken,
}

impl ExecutionHandle {
    /// Create a connected handle/control pair
    pub fn pair(job_id: JobId) -> (ExecutionHandle, JobControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            ExecutionHandle {
                job_id,
                stdin: tx,
                cancel: cancel.clone(),
            },
            JobControl { stdin: rx, cancel },
        )
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Forward bytes to the job's standard input.
    ///
    /// Returns `false` once the job no longer accepts input.
    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.stdin.send(bytes.into()).is_ok()
    }

    /// Request cancellation. Idempotent.
    pub fn kill(&self) {
        if !self.cancel.is_cancelled() {
            debug!(job_id = %self.job_id, "kill requested");
            self.cancel.cancel();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Output side of a job. Guarantees exactly one `Exit`.
///
/// `exit` consumes the sink; dropping a sink that never exited emits a
/// fallback `Exit(1)` so a panicking or aborted backend task still
/// terminates the stream.
#[derive(Debug)]
pub struct JobSink {
    tx: Option<mpsc::UnboundedSender<ExecEvent>>,
}

/// Cloneable stdout/stderr emitter for engines that write from callbacks
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::UnboundedSender<ExecEvent>,
}

impl JobSink {
    pub fn channel() -> (JobSink, JobStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (JobSink { tx: Some(tx) }, rx)
    }

    pub fn stdout(&self, bytes: impl Into<Vec<u8>>) {
        self.send(ExecEvent::Stdout(bytes.into()));
    }

    pub fn stderr(&self, bytes: impl Into<Vec<u8>>) {
        self.send(ExecEvent::Stderr(bytes.into()));
    }

    /// Emitter for stdout/stderr only
    pub fn output(&self) -> Option<OutputSender> {
        self.tx.as_ref().map(|tx| OutputSender { tx: tx.clone() })
    }

    pub fn exit(mut self, code: i32) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ExecEvent::Exit(code));
        }
    }

    /// Report `err` through the contract: its diagnostic on stderr (none
    /// for a cancelled job) followed by its exit code.
    pub fn fail(self, err: &Error) {
        if let Some(text) = err.diagnostic() {
            self.stderr(text);
        }
        self.exit(err.exit_code());
    }

    /// Finish with the outcome of a backend run
    pub fn finish(self, outcome: orbit_foundation::Result<i32>) {
        match outcome {
            Ok(code) => self.exit(code),
            Err(err) => self.fail(&err),
        }
    }

    fn send(&self, event: ExecEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

impl Drop for JobSink {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ExecEvent::Exit(1));
        }
    }
}

impl OutputSender {
    pub fn stdout(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.tx.send(ExecEvent::Stdout(bytes.into()));
    }

    pub fn stderr(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.tx.send(ExecEvent::Stderr(bytes.into()));
    }
}

/// A job that failed before anything was spawned
pub fn rejected(job_id: JobId, err: Error) -> (ExecutionHandle, JobStream) {
    let (handle, _control) = ExecutionHandle::pair(job_id);
    let (sink, stream) = JobSink::channel();
    sink.fail(&err);
    (handle, stream)
}

/// Drain a stream to completion, returning combined output and exit code
pub async fn collect(mut stream: JobStream) -> (String, i32) {
    let mut output = Vec::new();
    while let Some(event) = stream.recv().await {
        match event {
            ExecEvent::Stdout(bytes) | ExecEvent::Stderr(bytes) => output.extend_from_slice(&bytes),
            ExecEvent::Exit(code) => {
                return (String::from_utf8_lossy(&output).into_owned(), code);
            }
        }
    }
    (String::from_utf8_lossy(&output).into_owned(), 1)
}
