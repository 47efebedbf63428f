//! `orbit run <file>` - one-shot execution
//!
//! Loads the workspace directory into a VFS and runs the entry either in a
//! local sandbox (default) or on the remote executor. Output is streamed to
//! this process's stdout/stderr and the job's exit code is returned.

use crate::workspace;
use anyhow::Context;
use orbit_exec::{
    ExecEvent, ExecutionBackend, ExecutionRequest, JobStream, RemoteBackend, Sandbox,
    ToolchainTable,
};
use orbit_foundation::{BackendId, OrbitConfig};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn run(
    config: &OrbitConfig,
    file: &Path,
    workspace_dir: Option<PathBuf>,
    remote: bool,
) -> anyhow::Result<i32> {
    let dir = match workspace_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let vfs = workspace::load(&dir)?;
    let entry = entry_path(&dir, file)?;
    tracing::debug!(%entry, nodes = vfs.len(), "workspace loaded");

    let request = ExecutionRequest::new(BackendId::Remote, entry, Arc::new(vfs))
        .with_session("run");
    let (_handle, stream) = if remote {
        RemoteBackend::new(config.client.server_url()).run(request)
    } else {
        let toolchains = Arc::new(ToolchainTable::from_config(config));
        let root = sandbox_root()?;
        Sandbox::new(root, toolchains).spawn(request)
    };

    stream_to_stdio(stream).await
}

/// Virtual entry path for `file`, given relative to `dir` or as a host path inside it
fn entry_path(dir: &Path, file: &Path) -> anyhow::Result<String> {
    let relative = if file.is_absolute() {
        let dir = dir.canonicalize()?;
        file.strip_prefix(&dir)
            .with_context(|| format!("{} is outside the workspace", file.display()))?
            .to_path_buf()
    } else {
        file.to_path_buf()
    };
    Ok(workspace::to_vpath(&relative))
}

fn sandbox_root() -> anyhow::Result<PathBuf> {
    let root = std::env::temp_dir().join("orbit-run");
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

async fn stream_to_stdio(mut stream: JobStream) -> anyhow::Result<i32> {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    while let Some(event) = stream.recv().await {
        match event {
            ExecEvent::Stdout(bytes) => {
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            ExecEvent::Stderr(bytes) => {
                stderr.write_all(&bytes)?;
                stderr.flush()?;
            }
            ExecEvent::Exit(code) => return Ok(code),
        }
    }
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_entry() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(entry_path(dir.path(), Path::new("src/main.c")).unwrap(), "/src/main.c");
    }

    #[test]
    fn test_absolute_entry_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let file = canonical.join("main.py");
        assert_eq!(entry_path(dir.path(), &file).unwrap(), "/main.py");
    }

    #[test]
    fn test_absolute_entry_outside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        assert!(entry_path(dir.path(), Path::new("/etc/passwd")).is_err());
    }
}
