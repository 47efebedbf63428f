//! Terminal session - one prompt, its cwd and its input state machine
//!
//! ```text
//!            runtime command dispatched
//!   PROMPT ─────────────────────────────▶ EXECUTING
//!     ▲                                       │
//!     └──────── Exit of the active job ───────┤
//!     └──────── Ctrl+C (kill, no wait) ───────┘
//! ```

use orbit_exec::{ExecutionHandle, Utf8Chunker};
use orbit_foundation::vfs::path::ROOT;
use orbit_foundation::JobId;
use std::fmt;

/// Session identifier (1, 2, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keystrokes build a command line
    Prompt,
    /// Keystrokes are forwarded to the running job
    Executing,
}

/// Job currently owned by a session
#[derive(Debug)]
pub struct ActiveJob {
    pub handle: ExecutionHandle,
    /// Package being installed, recorded on a successful exit
    pub install: Option<String>,
    pub(crate) stdout: Utf8Chunker,
    pub(crate) stderr: Utf8Chunker,
}

impl ActiveJob {
    pub fn new(handle: ExecutionHandle, install: Option<String>) -> Self {
        Self {
            handle,
            install,
            stdout: Utf8Chunker::new(),
            stderr: Utf8Chunker::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.handle.job_id()
    }
}

/// One interactive terminal
#[derive(Debug)]
pub struct TerminalSession {
    pub id: SessionId,
    pub display_name: String,
    pub cwd: String,
    mode: InputMode,
    pub line_buffer: String,
    pub input_buffer: String,
    active: Option<ActiveJob>,
}

impl TerminalSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            display_name: format!("orbit {}", id.0),
            cwd: ROOT.to_string(),
            mode: InputMode::Prompt,
            line_buffer: String::new(),
            input_buffer: String::new(),
            active: None,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.active.as_ref()
    }

    pub(crate) fn active_job_mut(&mut self) -> Option<&mut ActiveJob> {
        self.active.as_mut()
    }

    /// True when `job_id` is the job this session is waiting on
    pub fn owns(&self, job_id: JobId) -> bool {
        self.active.as_ref().map(ActiveJob::job_id) == Some(job_id)
    }

    /// PROMPT → EXECUTING
    pub fn begin_job(&mut self, job: ActiveJob) {
        self.line_buffer.clear();
        self.input_buffer.clear();
        self.active = Some(job);
        self.mode = InputMode::Executing;
    }

    /// EXECUTING → PROMPT on the active job's exit. Returns the finished job,
    /// or `None` when `job_id` is stale.
    pub fn finish_job(&mut self, job_id: JobId) -> Option<ActiveJob> {
        if !self.owns(job_id) {
            return None;
        }
        self.input_buffer.clear();
        self.mode = InputMode::Prompt;
        self.active.take()
    }

    /// Kill the active job (if any), clear both buffers and force PROMPT.
    /// A later exit of the killed job is stale and ignored.
    pub fn interrupt(&mut self) -> Option<JobId> {
        self.line_buffer.clear();
        self.input_buffer.clear();
        self.mode = InputMode::Prompt;
        self.active.take().map(|job| {
            job.handle.kill();
            job.job_id()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = TerminalSession::new(SessionId(3));
        assert_eq!(session.display_name, "orbit 3");
        assert_eq!(session.cwd, "/");
        assert_eq!(session.mode(), InputMode::Prompt);
    }

    #[test]
    fn test_finish_ignores_stale_job() {
        let mut session = TerminalSession::new(SessionId(1));
        let (handle, _control) = ExecutionHandle::pair(JobId::new());
        let job_id = handle.job_id();
        session.begin_job(ActiveJob::new(handle, None));
        assert_eq!(session.mode(), InputMode::Executing);

        assert!(session.finish_job(JobId::new()).is_none());
        assert_eq!(session.mode(), InputMode::Executing);

        assert!(session.finish_job(job_id).is_some());
        assert_eq!(session.mode(), InputMode::Prompt);
        assert!(session.finish_job(job_id).is_none());
    }

    #[test]
    fn test_interrupt_kills_and_returns_to_prompt() {
        let mut session = TerminalSession::new(SessionId(1));
        let (handle, control) = ExecutionHandle::pair(JobId::new());
        let job_id = handle.job_id();
        session.begin_job(ActiveJob::new(handle, None));
        session.input_buffer.push_str("partial");

        assert_eq!(session.interrupt(), Some(job_id));
        assert!(control.cancel.is_cancelled());
        assert_eq!(session.mode(), InputMode::Prompt);
        assert!(session.input_buffer.is_empty());
        assert!(!session.owns(job_id));
    }
}
