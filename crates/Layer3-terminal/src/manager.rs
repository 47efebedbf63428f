//! Terminal Manager - every session of one client
//!
//! The manager is driven from a single task. Keystrokes arrive through
//! [`TerminalManager::handle_input`]; job output arrives as [`JobEvent`]s
//! that the owner pulls with [`TerminalManager::next_job_event`] and feeds
//! back through [`TerminalManager::apply_job_event`]. Everything a session
//! should display is emitted as a [`TerminalEvent`].
//!
//! ```ignore
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut manager = TerminalManager::new(router, tx);
//! loop {
//!     tokio::select! {
//!         Some(keys) = keys.recv() => manager.handle_input(active, &keys).await,
//!         Some(event) = manager.next_job_event() => manager.apply_job_event(event),
//!     }
//! }
//! ```

use crate::router::{writeln, CommandRouter, Dispatch, Routed};
use crate::session::{ActiveJob, InputMode, SessionId, TerminalSession};
use crate::style::{convert_eol, Color, Palette};
use orbit_exec::{ExecEvent, JobStream};
use orbit_foundation::JobId;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;
use tracing::{debug, info};

const WELCOME: &str = "Welcome to the Orbit terminal!";
const DEFAULT_USER: &str = "orbit";

/// Something a session should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Output { session: SessionId, text: String },
    Clear { session: SessionId },
    Opened { session: SessionId },
    Closed { session: SessionId },
    /// Every session was destroyed; `orbit 1` follows
    Reset,
}

/// One job event tagged with its owner
#[derive(Debug)]
pub struct JobEvent {
    pub session: SessionId,
    pub job_id: JobId,
    pub event: ExecEvent,
}

/// Owner of all sessions
pub struct TerminalManager {
    sessions: BTreeMap<SessionId, TerminalSession>,
    next_id: u32,
    router: CommandRouter,
    user: String,
    output: mpsc::UnboundedSender<TerminalEvent>,
    jobs_tx: mpsc::UnboundedSender<JobEvent>,
    jobs_rx: mpsc::UnboundedReceiver<JobEvent>,
    packages: BTreeSet<String>,
}

impl TerminalManager {
    /// Create the manager with session `orbit 1` already open
    pub fn new(router: CommandRouter, output: mpsc::UnboundedSender<TerminalEvent>) -> Self {
        Self::with_user(router, DEFAULT_USER, output)
    }

    /// Same as [`TerminalManager::new`] with another prompt user label
    pub fn with_user(
        router: CommandRouter,
        user: impl Into<String>,
        output: mpsc::UnboundedSender<TerminalEvent>,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let mut manager = Self {
            sessions: BTreeMap::new(),
            next_id: 1,
            router,
            user: user.into(),
            output,
            jobs_tx,
            jobs_rx,
            packages: BTreeSet::new(),
        };
        manager.open_session();
        manager
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    fn palette(&self) -> Palette {
        self.router.palette()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn open_session(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        let session = TerminalSession::new(id);
        info!(session = %id, name = %session.display_name, "session opened");
        self.sessions.insert(id, session);

        self.emit_event(TerminalEvent::Opened { session: id });
        if id.0 == 1 {
            self.emit(id, format!("{}\r\n", WELCOME));
        }
        self.print_prompt(id);
        id
    }

    /// Destroy a session, killing its job
    pub fn close_session(&mut self, id: SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(&id) else {
            return false;
        };
        if let Some(job_id) = session.interrupt() {
            debug!(session = %id, %job_id, "killed job of closed session");
        }
        info!(session = %id, "session closed");
        self.emit_event(TerminalEvent::Closed { session: id });
        true
    }

    /// Destroy every session and start over with `orbit 1`
    pub fn reset(&mut self) {
        for session in self.sessions.values_mut() {
            session.interrupt();
        }
        self.sessions.clear();
        self.packages.clear();
        self.next_id = 1;
        info!("terminal reset");
        self.emit_event(TerminalEvent::Reset);
        self.open_session();
    }

    pub fn session(&self, id: SessionId) -> Option<&TerminalSession> {
        self.sessions.get(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &TerminalSession> {
        self.sessions.values()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Packages installed through `pip install` since the last reset
    pub fn installed_packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Feed raw terminal input (`\r` submits, `\x7f` erases, `\x03` interrupts)
    pub async fn handle_input(&mut self, id: SessionId, data: &str) {
        for c in data.chars() {
            let Some(session) = self.sessions.get_mut(&id) else {
                return;
            };
            match (session.mode(), c) {
                (_, '\x03') => self.interrupt(id),
                (InputMode::Prompt, '\r' | '\n') => {
                    let line = std::mem::take(&mut session.line_buffer);
                    self.submit(id, &line).await;
                }
                (InputMode::Prompt, '\x7f' | '\x08') => {
                    if session.line_buffer.pop().is_some() {
                        self.emit(id, "\x08 \x08".to_string());
                    }
                }
                (InputMode::Executing, '\r' | '\n') => {
                    let mut input = std::mem::take(&mut session.input_buffer);
                    input.push('\n');
                    if let Some(job) = session.active_job() {
                        if !job.handle.write(input) {
                            debug!(session = %id, "job no longer accepts input");
                        }
                    }
                    self.emit(id, "\r\n".to_string());
                }
                (InputMode::Executing, '\x7f' | '\x08') => {
                    if session.input_buffer.pop().is_some() {
                        self.emit(id, "\x08 \x08".to_string());
                    }
                }
                (_, c) if c.is_control() => {}
                (InputMode::Prompt, c) => {
                    session.line_buffer.push(c);
                    self.emit(id, c.to_string());
                }
                (InputMode::Executing, c) => {
                    session.input_buffer.push(c);
                    self.emit(id, c.to_string());
                }
            }
        }
    }

    /// Submit `line` as if typed, echoing it first
    pub async fn run_command(&mut self, id: SessionId, line: &str) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.mode() == InputMode::Executing {
            debug!(session = %id, "command injection ignored while executing");
            return;
        }
        session.line_buffer.clear();
        self.emit(id, line.to_string());
        self.submit(id, line).await;
    }

    fn interrupt(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if let Some(job_id) = session.interrupt() {
            info!(session = %id, %job_id, "job interrupted");
        }
        self.emit(id, "^C\r\n".to_string());
        self.print_prompt(id);
    }

    async fn submit(&mut self, id: SessionId, line: &str) {
        if line.trim().is_empty() {
            self.print_prompt(id);
            return;
        }
        self.emit(id, "\r\n".to_string());

        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let mut out = String::new();
        let routed = self.router.route(session, line, &mut out).await;
        if !out.is_empty() {
            self.emit(id, out);
        }

        match routed {
            Routed::Done => self.print_prompt(id),
            Routed::Clear => {
                self.emit_event(TerminalEvent::Clear { session: id });
                self.print_prompt(id);
            }
            Routed::Job(dispatch) => self.start_job(id, dispatch),
        }
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    fn start_job(&mut self, id: SessionId, dispatch: Dispatch) {
        let Dispatch {
            handle,
            stream,
            install,
        } = dispatch;
        let job_id = handle.job_id();
        let Some(session) = self.sessions.get_mut(&id) else {
            handle.kill();
            return;
        };
        session.begin_job(ActiveJob::new(handle, install));
        forward(id, job_id, stream, self.jobs_tx.clone());
    }

    /// Next event from any running job
    pub async fn next_job_event(&mut self) -> Option<JobEvent> {
        self.jobs_rx.recv().await
    }

    /// Apply one job event. Events of a job the session no longer owns
    /// (killed, replaced, closed session) are dropped.
    pub fn apply_job_event(&mut self, event: JobEvent) {
        let JobEvent {
            session: id,
            job_id,
            event,
        } = event;
        let palette = self.palette();
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!(session = %id, %job_id, "event for closed session");
            return;
        };
        if !session.owns(job_id) {
            debug!(session = %id, %job_id, "stale job event dropped");
            return;
        }

        match event {
            ExecEvent::Stdout(bytes) => {
                let text = session
                    .active_job_mut()
                    .map(|job| job.stdout.push(&bytes))
                    .unwrap_or_default();
                if !text.is_empty() {
                    self.emit(id, convert_eol(&text));
                }
            }
            ExecEvent::Stderr(bytes) => {
                let text = session
                    .active_job_mut()
                    .map(|job| job.stderr.push(&bytes))
                    .unwrap_or_default();
                if !text.is_empty() {
                    self.emit(id, palette.paint(&convert_eol(&text), Color::Red));
                }
            }
            ExecEvent::Exit(code) => {
                let Some(mut job) = session.finish_job(job_id) else {
                    return;
                };
                info!(session = %id, %job_id, code, "job exited");
                let rest = job.stdout.finish();
                let rest_err = job.stderr.finish();
                if !rest.is_empty() {
                    self.emit(id, convert_eol(&rest));
                }
                if !rest_err.is_empty() {
                    self.emit(id, palette.paint(&convert_eol(&rest_err), Color::Red));
                }
                if let Some(package) = job.install.take() {
                    if code == 0 {
                        let mut line = String::new();
                        writeln(&mut line, &palette.paint(&format!("Successfully installed {}", package), Color::Green));
                        self.emit(id, line);
                        self.packages.insert(package);
                    }
                }
                self.print_prompt(id);
            }
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Prompt text for a session: `\r\n<user> <cwd> $ `
    pub fn prompt(&self, id: SessionId) -> Option<String> {
        let session = self.sessions.get(&id)?;
        let palette = self.palette();
        Some(format!(
            "\r\n{}{}{}",
            palette.paint(&self.user, Color::Green),
            palette.paint(&format!(" {}", session.cwd), Color::Magenta),
            palette.paint(" $ ", Color::White),
        ))
    }

    fn print_prompt(&mut self, id: SessionId) {
        if let Some(prompt) = self.prompt(id) {
            self.emit(id, prompt);
        }
    }

    fn emit(&self, session: SessionId, text: String) {
        self.emit_event(TerminalEvent::Output { session, text });
    }

    fn emit_event(&self, event: TerminalEvent) {
        // the display may be gone during shutdown
        let _ = self.output.send(event);
    }
}

/// Pump a job stream into the manager's queue, stopping after `Exit`
fn forward(session: SessionId, job_id: JobId, mut stream: JobStream, tx: mpsc::UnboundedSender<JobEvent>) {
    tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            let exit = event.is_exit();
            if tx.send(JobEvent { session, job_id, event }).is_err() || exit {
                break;
            }
        }
    });
}
