//! Terminal session / router 통합 테스트
//!
//! `cargo test -p orbit-terminal --test session_test`

use async_trait::async_trait;
use orbit_exec::{
    BackendRegistry, ExecutionBackend, ExecutionHandle, ExecutionRequest, JobSink, JobStream,
};
use orbit_foundation::{BackendId, Error, FsNode, Result, Vfs, VfsStore, CANCELLED_EXIT_CODE};
use orbit_terminal::{
    CommandRouter, InputMode, Palette, SessionId, TerminalEvent, TerminalManager, VcsCollaborator,
    VcsOutcome, VcsRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const PROMPT_ROOT: &str = "\r\norbit / $ ";

// ============================================================================
// Fixtures
// ============================================================================

/// Echoes stdin lines; `exit N` ends the job with code N
struct EchoBackend;

impl ExecutionBackend for EchoBackend {
    fn id(&self) -> BackendId {
        BackendId::Remote
    }

    fn run(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream) {
        let (handle, mut control) = ExecutionHandle::pair(request.job_id);
        let (sink, stream) = JobSink::channel();
        tokio::spawn(async move {
            sink.stdout(format!("running {}\n", request.entry_path));
            loop {
                tokio::select! {
                    _ = control.cancel.cancelled() => return sink.exit(CANCELLED_EXIT_CODE),
                    data = control.stdin.recv() => match data {
                        Some(bytes) => {
                            let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
                            if let Some(code) = line.strip_prefix("exit ") {
                                sink.stderr("bye\n");
                                return sink.exit(code.parse().unwrap_or(1));
                            }
                            sink.stdout(format!("echo: {}\n", line));
                        }
                        None => return sink.exit(0),
                    }
                }
            }
        });
        (handle, stream)
    }
}

/// Marks every file under the cwd as modified
struct MarkingVcs;

#[async_trait]
impl VcsCollaborator for MarkingVcs {
    fn name(&self) -> &str {
        "marking"
    }

    async fn run(&self, request: VcsRequest<'_>) -> Result<VcsOutcome> {
        let folder = request.snapshot.folder(request.cwd)?;
        let statuses = folder
            .children()
            .filter(|c| c.is_file())
            .map(|c| (c.path().to_string(), Some("M".to_string())))
            .collect();
        Ok(VcsOutcome {
            lines: vec![format!("git {} ok", request.args.join(" "))],
            tree: None,
            statuses,
        })
    }
}

/// Fails like a collaborator whose backing store went away
struct BrokenVcs;

#[async_trait]
impl VcsCollaborator for BrokenVcs {
    fn name(&self) -> &str {
        "broken"
    }

    async fn run(&self, _request: VcsRequest<'_>) -> Result<VcsOutcome> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "object store missing",
        )))
    }
}

fn workspace() -> VfsStore {
    let vfs = Vfs::from_nodes(&[FsNode::folder(
        "/",
        vec![
            FsNode::folder("src", vec![FsNode::file("main.go", "package main")]),
            FsNode::file("readme.txt", "hello\nworld\n"),
        ],
    )])
    .unwrap();
    VfsStore::new(vfs)
}

struct Harness {
    manager: TerminalManager,
    rx: mpsc::UnboundedReceiver<TerminalEvent>,
    buffers: HashMap<SessionId, String>,
    events: Vec<TerminalEvent>,
}

impl Harness {
    fn new(router: CommandRouter) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = TerminalManager::new(router.with_palette(Palette::plain()), tx);
        let mut harness = Self {
            manager,
            rx,
            buffers: HashMap::new(),
            events: Vec::new(),
        };
        harness.output(SessionId(1));
        harness
    }

    fn with_echo() -> Self {
        let mut registry = BackendRegistry::with_default_routes();
        registry.register(Arc::new(EchoBackend));
        Self::new(CommandRouter::new(workspace(), Arc::new(registry)))
    }

    /// Output of `id` since the last call
    fn output(&mut self, id: SessionId) -> String {
        while let Ok(event) = self.rx.try_recv() {
            match &event {
                TerminalEvent::Output { session, text } => {
                    self.buffers.entry(*session).or_default().push_str(text);
                }
                other => self.events.push(other.clone()),
            }
        }
        self.buffers.remove(&id).unwrap_or_default()
    }

    async fn type_line(&mut self, id: SessionId, line: &str) -> String {
        self.manager.handle_input(id, &format!("{}\r", line)).await;
        self.output(id)
    }

    /// Apply job events until `id` is back at the prompt
    async fn wait_for_prompt(&mut self, id: SessionId) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.manager.session(id).map(|s| s.mode()) == Some(InputMode::Executing) {
            let event = tokio::time::timeout_at(deadline, self.manager.next_job_event())
                .await
                .expect("job never finished")
                .expect("job channel closed");
            self.manager.apply_job_event(event);
        }
        self.output(id)
    }

    /// Apply job events until `text` shows up in `id`'s output
    async fn wait_for_text(&mut self, id: SessionId, text: &str) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut seen = String::new();
        while !seen.contains(text) {
            let event = tokio::time::timeout_at(deadline, self.manager.next_job_event())
                .await
                .expect("text never appeared")
                .expect("job channel closed");
            self.manager.apply_job_event(event);
            seen.push_str(&self.output(id));
        }
        seen
    }
}

// ============================================================================
// Builtins
// ============================================================================

#[tokio::test]
async fn test_welcome_only_on_first_session() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = CommandRouter::new(workspace(), Arc::new(BackendRegistry::new()))
        .with_palette(Palette::plain());
    let mut manager = TerminalManager::new(router, tx);
    let second = manager.open_session();

    let mut first_text = String::new();
    let mut second_text = String::new();
    while let Ok(event) = rx.try_recv() {
        if let TerminalEvent::Output { session, text } = event {
            if session == SessionId(1) {
                first_text.push_str(&text);
            } else if session == second {
                second_text.push_str(&text);
            }
        }
    }
    assert_eq!(first_text, format!("Welcome to the Orbit terminal!\r\n{}", PROMPT_ROOT));
    assert_eq!(second_text, PROMPT_ROOT);
    assert_eq!(manager.session(second).unwrap().display_name, "orbit 2");
}

#[tokio::test]
async fn test_prompt_user_label() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = CommandRouter::new(workspace(), Arc::new(BackendRegistry::new()))
        .with_palette(Palette::plain());
    let mut manager = TerminalManager::with_user(router, "dev", tx);
    manager.run_command(SessionId(1), "cd src").await;

    let mut text = String::new();
    while let Ok(event) = rx.try_recv() {
        if let TerminalEvent::Output { text: chunk, .. } = event {
            text.push_str(&chunk);
        }
    }
    assert!(text.starts_with("Welcome to the Orbit terminal!\r\n\r\ndev / $ "));
    assert!(text.ends_with("\r\ndev /src $ "));
}

#[tokio::test]
async fn test_cd_is_per_session() {
    let mut h = Harness::with_echo();
    let a = SessionId(1);
    let b = h.manager.open_session();
    h.output(b);

    let out = h.type_line(a, "cd src").await;
    assert!(out.ends_with("\r\norbit /src $ "), "{:?}", out);
    assert_eq!(h.manager.session(a).unwrap().cwd, "/src");
    assert_eq!(h.manager.session(b).unwrap().cwd, "/");

    let out = h.type_line(b, "pwd").await;
    assert!(out.contains("/\r\n"), "{:?}", out);
}

#[tokio::test]
async fn test_failed_cd_keeps_cwd() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);
    h.type_line(id, "cd src").await;

    let out = h.type_line(id, "cd /nope").await;
    assert!(out.contains("cd: no such directory: /nope"), "{:?}", out);
    assert_eq!(h.manager.session(id).unwrap().cwd, "/src");

    let out = h.type_line(id, "cd main.go").await;
    assert!(out.contains("cd: no such directory: main.go"));
    assert_eq!(h.manager.session(id).unwrap().cwd, "/src");

    h.type_line(id, "cd ../../..").await;
    assert_eq!(h.manager.session(id).unwrap().cwd, "/");
}

#[tokio::test]
async fn test_file_builtins() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);

    assert!(h.type_line(id, "mkdir lib").await.ends_with(PROMPT_ROOT));
    h.type_line(id, "touch lib/util.py").await;
    let out = h.type_line(id, "ls").await;
    assert!(out.contains("lib  src  readme.txt"), "{:?}", out);

    let out = h.type_line(id, "ls lib").await;
    assert!(out.contains("util.py"));

    let out = h.type_line(id, "mkdir lib").await;
    assert!(out.contains("mkdir: cannot create directory 'lib': File exists"), "{:?}", out);

    let out = h.type_line(id, "cat readme.txt").await;
    assert!(out.contains("hello\r\nworld\r\n"), "{:?}", out);
    let out = h.type_line(id, "cat missing.txt").await;
    assert!(out.contains("File not found"));

    let out = h.type_line(id, "rm lib").await;
    assert!(out.contains("rm: cannot remove 'lib': Directory not empty"), "{:?}", out);
    h.type_line(id, "rm lib/util.py").await;
    h.type_line(id, "rm lib").await;
    let out = h.type_line(id, "rm lib").await;
    assert!(out.contains("rm: cannot remove 'lib': No such file or directory"));

    let snapshot = h.manager.router().vfs().snapshot();
    assert!(snapshot.find("/lib").is_none());
    assert!(snapshot.find("/readme.txt").is_some());
}

#[tokio::test]
async fn test_unknown_command_and_usage() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);

    let out = h.type_line(id, "frobnicate --now").await;
    assert!(out.contains("Command not found: frobnicate"));
    assert!(out.ends_with(PROMPT_ROOT));

    let out = h.type_line(id, "notes.md").await;
    assert!(out.contains("Command not found: notes.md"));

    assert!(h.type_line(id, "pip").await.contains("Usage: pip install <package_name>"));
    assert!(h.type_line(id, "python").await.contains("Usage: python <filename>"));
    assert!(h.type_line(id, "login alice").await.contains("Usage: login <username> <token>"));

    // empty line only reprints the prompt
    assert_eq!(h.type_line(id, "   ").await, format!("   {}", PROMPT_ROOT));
}

#[tokio::test]
async fn test_backspace_edits_line() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);
    h.manager.handle_input(id, "pwx\x7fd").await;
    let out = h.output(id);
    assert_eq!(out, "pwx\x08 \x08d");
    let out = h.type_line(id, "").await;
    assert!(out.contains("\r\n/\r\n"), "{:?}", out);
}

#[tokio::test]
async fn test_ctrl_c_at_prompt() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);
    h.manager.handle_input(id, "ls -la\x03").await;
    let out = h.output(id);
    assert!(out.ends_with(&format!("^C\r\n{}", PROMPT_ROOT)), "{:?}", out);
    assert!(h.manager.session(id).unwrap().line_buffer.is_empty());
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn test_job_roundtrip() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);

    h.type_line(id, "cd src").await;
    h.type_line(id, "main.go").await;
    assert_eq!(h.manager.session(id).unwrap().mode(), InputMode::Executing);
    let out = h.wait_for_text(id, "running /src/main.go").await;
    assert!(out.contains("running /src/main.go\r\n"));

    h.manager.handle_input(id, "hi\x7f\x7fhey\r").await;
    let out = h.wait_for_text(id, "echo: hey").await;
    assert!(out.contains("echo: hey\r\n"), "{:?}", out);

    h.manager.handle_input(id, "exit 3\r").await;
    let out = h.wait_for_prompt(id).await;
    assert!(out.contains("bye\r\n"));
    assert!(out.ends_with("\r\norbit /src $ "));
    assert_eq!(out.matches("orbit /src $").count(), 1);
}

#[tokio::test]
async fn test_ctrl_c_kills_job_and_ignores_late_exit() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);

    h.type_line(id, "run src/main.go").await;
    h.wait_for_text(id, "running").await;

    h.manager.handle_input(id, "abc\x03").await;
    let out = h.output(id);
    assert!(out.ends_with(&format!("^C\r\n{}", PROMPT_ROOT)), "{:?}", out);
    assert_eq!(h.manager.session(id).unwrap().mode(), InputMode::Prompt);

    // the killed job's exit arrives late and must not print another prompt
    let late = tokio::time::timeout(Duration::from_secs(2), h.manager.next_job_event())
        .await
        .unwrap()
        .unwrap();
    h.manager.apply_job_event(late);
    assert_eq!(h.output(id), "");

    // the session accepts commands again
    assert!(h.type_line(id, "pwd").await.contains("/\r\n"));
}

#[tokio::test]
async fn test_unregistered_backend_exits_once() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);

    h.type_line(id, "python readme.txt").await;
    let out = h.wait_for_prompt(id).await;
    assert!(out.contains("interpreter backend is not available"), "{:?}", out);
    assert_eq!(out.matches(PROMPT_ROOT).count(), 1);
}

#[tokio::test]
async fn test_entry_escaping_root_is_rejected_inline() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);
    let out = h.type_line(id, "run ../../main.go").await;
    assert!(out.contains("escapes the root folder"), "{:?}", out);
    assert_eq!(h.manager.session(id).unwrap().mode(), InputMode::Prompt);
}

#[tokio::test]
async fn test_sessions_run_jobs_independently() {
    let mut h = Harness::with_echo();
    let a = SessionId(1);
    let b = h.manager.open_session();
    h.output(b);

    h.type_line(a, "run src/main.go").await;
    h.wait_for_text(a, "running").await;

    // b is still at its prompt
    assert_eq!(h.manager.session(b).unwrap().mode(), InputMode::Prompt);
    assert!(h.type_line(b, "ls").await.contains("readme.txt"));

    assert!(h.manager.close_session(a));
    assert!(h.manager.session(a).is_none());
    assert!(!h.manager.close_session(a));
}

#[tokio::test]
async fn test_run_command_injection() {
    let mut h = Harness::with_echo();
    let id = SessionId(1);
    h.manager.run_command(id, "cat readme.txt").await;
    let out = h.output(id);
    assert!(out.starts_with("cat readme.txt\r\nhello"), "{:?}", out);
}

#[tokio::test]
async fn test_reset_recreates_first_session() {
    let mut h = Harness::with_echo();
    h.manager.open_session();
    h.type_line(SessionId(1), "cd src").await;

    h.manager.reset();
    let out = h.output(SessionId(1));
    assert!(out.starts_with("Welcome to the Orbit terminal!"));
    assert_eq!(h.manager.session_ids(), vec![SessionId(1)]);
    assert_eq!(h.manager.session(SessionId(1)).unwrap().cwd, "/");
    assert!(h.manager.installed_packages().is_empty());
    assert!(h.events.contains(&TerminalEvent::Reset));
}

// ============================================================================
// Collaborators
// ============================================================================

#[tokio::test]
async fn test_git_without_collaborator() {
    let mut h = Harness::with_echo();
    let out = h.type_line(SessionId(1), "git status").await;
    assert!(out.contains("git: version control is not available"));
    assert!(h.type_line(SessionId(1), "git").await.contains("Usage: git <command>"));
}

#[tokio::test]
async fn test_git_applies_status_markers() {
    let registry = Arc::new(BackendRegistry::with_default_routes());
    let router = CommandRouter::new(workspace(), registry).with_vcs(Arc::new(MarkingVcs));
    let mut h = Harness::new(router);
    let id = SessionId(1);

    let out = h.type_line(id, "git status").await;
    assert!(out.contains("git status ok"));
    let snapshot = h.manager.router().vfs().snapshot();
    assert_eq!(snapshot.find("/readme.txt").unwrap().vcs_status(), Some("M"));
    assert_eq!(snapshot.find("/readme.txt").unwrap().content(), Some("hello\nworld\n"));
    assert_eq!(snapshot.find("/src").unwrap().vcs_status(), None);
}

#[tokio::test]
async fn test_git_internal_failure_is_named() {
    let registry = Arc::new(BackendRegistry::with_default_routes());
    let router = CommandRouter::new(workspace(), registry).with_vcs(Arc::new(BrokenVcs));
    let mut h = Harness::new(router);

    let out = h.type_line(SessionId(1), "git pull").await;
    assert!(out.contains("git: IO error: object store missing"), "{}", out);
    assert!(out.ends_with(PROMPT_ROOT));
}

#[tokio::test]
async fn test_login_saves_credentials() {
    let mut h = Harness::with_echo();
    let out = h.type_line(SessionId(1), "login alice s3cret").await;
    assert!(out.contains("Credentials saved for this session."));
    let creds = h.manager.router().credentials().unwrap();
    assert_eq!(creds.username, "alice");
    assert!(!format!("{:?}", creds).contains("s3cret"));
}
