//! Sandbox pipeline - provision → compile → run → cleanup
//!
//! Every job gets a fresh, uniquely named directory. The VFS snapshot is
//! written into it, the entry file's toolchain is resolved, an optional
//! compile step runs to completion, and then the program runs with its
//! output streamed chunk by chunk. The directory is removed after the
//! job's `Exit` has been emitted, whatever the outcome.
//!
//! The remote executor server and the embedded compiled runtime share this
//! pipeline; they differ only in where the directory lives.

use crate::job::{ExecutionHandle, ExecutionRequest, JobControl, JobSink, JobStream, OutputSender};
use crate::toolchain::{TemplateVars, ToolchainTable};
use orbit_foundation::vfs::path;
use orbit_foundation::{Error, JobId, NodeRef, Result, ToolchainKind, ToolchainSpec, Vfs};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, info_span, warn, Instrument};

const READ_CHUNK: usize = 8 * 1024;

/// Grace period for output readers after the child was killed
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of a sandbox session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxPhase {
    Provisioning,
    Compiling,
    Running,
    Exited,
}

impl SandboxPhase {
    pub fn display_name(&self) -> &'static str {
        match self {
            SandboxPhase::Provisioning => "Provisioning",
            SandboxPhase::Compiling => "Compiling",
            SandboxPhase::Running => "Running",
            SandboxPhase::Exited => "Exited",
        }
    }
}

impl std::fmt::Display for SandboxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Entry resolution
// ============================================================================

/// Entry file resolved against a snapshot and the toolchain table
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// Normalized VFS path
    pub vpath: String,
    pub extension: String,
    pub spec: ToolchainSpec,
}

impl ResolvedEntry {
    /// Fails with a path error for a missing entry or one escaping the root,
    /// and a validation error for an extension without a toolchain.
    pub fn resolve(vfs: &Vfs, entry_path: &str, table: &ToolchainTable) -> Result<Self> {
        let vpath = path::normalize_strict(entry_path)?;
        vfs.file(&vpath)?;

        let extension = path::extension(&vpath)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                Error::validation(format!("unsupported file type: {}", path::file_name(&vpath)))
            })?;
        let spec = table
            .get(&extension)
            .cloned()
            .ok_or_else(|| Error::validation(format!("unsupported file type '.{}'", extension)))?;

        Ok(Self {
            vpath,
            extension,
            spec,
        })
    }

    /// Reject an entry whose toolchain is not of `kind`
    pub fn require(&self, kind: ToolchainKind) -> Result<()> {
        if self.spec.kind != kind {
            return Err(Error::validation(format!(
                "'{}' is not a {} source file",
                path::file_name(&self.vpath),
                kind
            )));
        }
        Ok(())
    }

    /// Location of the entry inside a materialized workspace
    pub fn host_path(&self, workspace: &Path) -> PathBuf {
        self.vpath
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(workspace.to_path_buf(), |acc, segment| acc.join(segment))
    }
}

// ============================================================================
// Materialization
// ============================================================================

/// Write every node under the snapshot root into `dir`. Returns the number
/// of files written.
pub async fn materialize(vfs: &Vfs, dir: &Path) -> Result<usize> {
    let mut plan: Vec<(PathBuf, Option<String>)> = Vec::new();
    if let Some(root) = vfs.root() {
        plan_tree(root, dir, &mut plan);
    }

    let mut files = 0;
    for (target, content) in plan {
        match content {
            None => tokio::fs::create_dir_all(&target).await?,
            Some(text) => {
                tokio::fs::write(&target, text).await?;
                files += 1;
            }
        }
    }
    Ok(files)
}

fn plan_tree(node: NodeRef<'_>, dir: &Path, plan: &mut Vec<(PathBuf, Option<String>)>) {
    for child in node.children() {
        let target = dir.join(child.name());
        if child.is_folder() {
            plan.push((target.clone(), None));
            plan_tree(child, &target, plan);
        } else {
            plan.push((target, child.content().map(str::to_string)));
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One provisioned workspace and the job running in it
#[derive(Debug)]
pub struct SandboxSession {
    job_id: JobId,
    dir: Option<TempDir>,
    workspace: PathBuf,
    phase: SandboxPhase,
    env: Vec<(String, String)>,
}

impl SandboxSession {
    /// Create a uniquely named directory under `root` (or the system temp
    /// directory) and materialize `snapshot` into it.
    pub async fn provision(root: Option<&Path>, job_id: JobId, snapshot: &Vfs) -> Result<Self> {
        let prefix = format!("orbit-exec-{}-", job_id.0.simple());
        let dir = match root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir()?,
        };
        let workspace = dir.path().to_path_buf();

        let mut session = Self {
            job_id,
            dir: Some(dir),
            workspace,
            phase: SandboxPhase::Provisioning,
            env: Vec::new(),
        };
        debug!(workspace = %session.workspace.display(), "provisioning");
        match materialize(snapshot, &session.workspace).await {
            Ok(files) => debug!(files, "workspace materialized"),
            Err(err) => {
                session.close();
                return Err(err);
            }
        }
        Ok(session)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn phase(&self) -> SandboxPhase {
        self.phase
    }

    /// Extra environment for every step of this session
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.push((key.into(), value.into()));
    }

    fn enter(&mut self, phase: SandboxPhase) {
        debug!(from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }

    /// Compile (if the toolchain has a compile step) and run `entry`
    pub async fn execute(
        &mut self,
        entry: &ResolvedEntry,
        control: &mut JobControl,
        sink: &JobSink,
    ) -> Result<i32> {
        if control.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let vars = TemplateVars::new(&self.workspace, &entry.host_path(&self.workspace));

        if let Some(compile) = &entry.spec.compile {
            self.enter(SandboxPhase::Compiling);
            compile_step(&vars.expand_all(compile), &self.workspace, &self.env, control).await?;
        }

        self.enter(SandboxPhase::Running);
        let output = sink
            .output()
            .ok_or_else(|| Error::Internal("job sink already closed".into()))?;
        run_step(
            &vars.expand_all(&entry.spec.run),
            &self.workspace,
            &self.env,
            control,
            output,
        )
        .await
    }

    /// Remove the workspace. Failures are logged, never propagated.
    pub fn close(&mut self) {
        self.phase = SandboxPhase::Exited;
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(workspace = %path.display(), "workspace removed"),
                Err(err) => warn!(workspace = %path.display(), "failed to remove workspace: {}", err),
            }
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Steps
// ============================================================================

fn command(argv: &[String], workspace: &Path, env: &[(String, String)]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Config("empty toolchain command".into()))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(workspace)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    Ok(cmd)
}

async fn compile_step(
    argv: &[String],
    workspace: &Path,
    env: &[(String, String)],
    control: &JobControl,
) -> Result<()> {
    let program = argv.first().cloned().unwrap_or_default();
    debug!(?argv, "compiling");

    let mut cmd = command(argv, workspace, env)?;
    cmd.stdin(Stdio::null());
    let child = cmd.spawn().map_err(|e| Error::spawn(&program, e))?;
    let pid = child.id();

    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = control.cancel.cancelled() => {
            kill_group(pid);
            return Err(Error::Cancelled);
        }
    };

    if output.status.success() {
        return Ok(());
    }

    let code = exit_code(output.status);
    let diagnostic = if !output.stderr.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else if !output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        format!("{} exited with code {}\n", program, code)
    };
    Err(Error::Compile { code, diagnostic })
}

/// Run one program to completion, forwarding stdin and streaming output
pub(crate) async fn run_step(
    argv: &[String],
    workspace: &Path,
    env: &[(String, String)],
    control: &mut JobControl,
    output: OutputSender,
) -> Result<i32> {
    let program = argv.first().cloned().unwrap_or_default();
    debug!(?argv, "running");

    let mut cmd = command(argv, workspace, env)?;
    cmd.stdin(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| Error::spawn(&program, e))?;
    let pid = child.id();

    let readers = spawn_readers(&mut child, output);
    let mut stdin = child.stdin.take();
    let mut killed = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = control.cancel.cancelled(), if !killed => {
                killed = true;
                kill_group(pid);
                let _ = child.start_kill();
            }
            data = control.stdin.recv(), if stdin.is_some() => match data {
                Some(bytes) => {
                    if let Some(pipe) = stdin.as_mut() {
                        if pipe.write_all(&bytes).await.is_err() || pipe.flush().await.is_err() {
                            stdin = None;
                        }
                    }
                }
                // handle dropped: the program sees end of input
                None => stdin = None,
            },
        }
    };

    for reader in readers {
        if killed {
            let _ = tokio::time::timeout(DRAIN_AFTER_KILL, reader).await;
        } else {
            let _ = reader.await;
        }
    }

    if killed {
        return Err(Error::Cancelled);
    }
    Ok(exit_code(status))
}

fn spawn_readers(child: &mut Child, output: OutputSender) -> Vec<tokio::task::JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        let out = output.clone();
        readers.push(tokio::spawn(pump(stdout, move |bytes| out.stdout(bytes))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, move |bytes| output.stderr(bytes))));
    }
    readers
}

async fn pump<R, F>(mut reader: R, emit: F)
where
    R: AsyncRead + Unpin,
    F: Fn(Vec<u8>),
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => emit(buf[..n].to_vec()),
        }
    }
}

/// Exit code of a finished process; signals map to `128 + signal`
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Kill the whole process group so helpers such as `go run`'s compiled
/// binary do not outlive the job
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: signals a process group this module created
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

// ============================================================================
// Sandbox (server-side executor core)
// ============================================================================

/// Runs jobs in per-job directories under a workspace root
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    toolchains: Arc<ToolchainTable>,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>, toolchains: Arc<ToolchainTable>) -> Self {
        Self {
            root: root.into(),
            toolchains,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn toolchains(&self) -> &Arc<ToolchainTable> {
        &self.toolchains
    }

    /// Start a job. The returned stream always ends with one `Exit`.
    pub fn spawn(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream) {
        let (handle, control) = ExecutionHandle::pair(request.job_id);
        let (sink, stream) = JobSink::channel();

        let span = info_span!(
            "sandbox",
            job_id = %request.job_id,
            session_id = %request.session_id
        );
        let root = self.root.clone();
        let toolchains = Arc::clone(&self.toolchains);
        tokio::spawn(
            async move {
                run_job(&root, &toolchains, request, control, sink).await;
            }
            .instrument(span),
        );

        (handle, stream)
    }
}

async fn run_job(
    root: &Path,
    toolchains: &ToolchainTable,
    request: ExecutionRequest,
    mut control: JobControl,
    sink: JobSink,
) {
    info!(entry = %request.entry_path, "job started");

    let entry = match ResolvedEntry::resolve(&request.workspace_snapshot, &request.entry_path, toolchains)
    {
        Ok(entry) => entry,
        Err(err) => {
            info!("job rejected: {}", err);
            return sink.fail(&err);
        }
    };

    let mut session =
        match SandboxSession::provision(Some(root), request.job_id, &request.workspace_snapshot).await {
            Ok(session) => session,
            Err(err) => {
                warn!("provisioning failed: {}", err);
                return sink.fail(&err);
            }
        };

    let outcome = session.execute(&entry, &mut control, &sink).await;
    match &outcome {
        Ok(code) => info!(code, "job finished"),
        Err(err) => info!(code = err.exit_code(), "job ended: {}", err),
    }
    // the workspace is gone before the client sees Exit
    session.close();
    sink.finish(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_foundation::FsNode;

    fn snapshot() -> Vfs {
        Vfs::from_nodes(&[
            FsNode::folder("src", vec![FsNode::file("util.py", "X = 1\n")]),
            FsNode::file("main.py", "print('hi')\n"),
            FsNode::file("notes", "plain"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_entry() {
        let table = ToolchainTable::default();
        let vfs = snapshot();

        let entry = ResolvedEntry::resolve(&vfs, "/src/../main.py", &table).unwrap();
        assert_eq!(entry.vpath, "/main.py");
        assert_eq!(entry.extension, "py");
        assert!(entry.require(ToolchainKind::Interpreted).is_ok());
        assert!(matches!(
            entry.require(ToolchainKind::Compiled),
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            ResolvedEntry::resolve(&vfs, "/../etc/passwd", &table),
            Err(Error::Path(_))
        ));
        assert!(matches!(
            ResolvedEntry::resolve(&vfs, "/missing.py", &table),
            Err(Error::Path(_))
        ));
        assert!(matches!(
            ResolvedEntry::resolve(&vfs, "/notes", &table),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ResolvedEntry::resolve(&vfs, "/src", &table),
            Err(Error::Path(_))
        ));
    }

    #[tokio::test]
    async fn test_materialize_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let files = materialize(&snapshot(), dir.path()).await.unwrap();
        assert_eq!(files, 3);
        let util = std::fs::read_to_string(dir.path().join("src").join("util.py")).unwrap();
        assert_eq!(util, "X = 1\n");
    }

    #[tokio::test]
    async fn test_session_close_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut session = SandboxSession::provision(Some(root.path()), JobId::new(), &snapshot())
            .await
            .unwrap();
        let workspace = session.workspace().to_path_buf();
        assert!(workspace.join("main.py").exists());
        assert_eq!(session.phase(), SandboxPhase::Provisioning);

        session.close();
        assert_eq!(session.phase(), SandboxPhase::Exited);
        assert!(!workspace.exists());
    }

    #[test]
    fn test_host_path() {
        let entry = ResolvedEntry {
            vpath: "/src/main.cpp".into(),
            extension: "cpp".into(),
            spec: ToolchainSpec::interpreted(&["x"]),
        };
        assert_eq!(
            entry.host_path(Path::new("/ws")),
            Path::new("/ws").join("src").join("main.cpp")
        );
    }
}
