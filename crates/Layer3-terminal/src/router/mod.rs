//! Command Router - one submitted line → builtin or job
//!
//! Lines are split on whitespace (no quoting). The first token picks a
//! builtin, a runtime command (`python`, `cpp`, `run`) or, when it looks
//! like a file name, the backend routed for its extension.
//!
//! Builtins run to completion against the shared VFS and write their text
//! into the caller's buffer. Runtime commands come back as a [`Dispatch`]
//! whose stream the session manager drains.

mod builtins;

use crate::session::TerminalSession;
use crate::style::{Color, Palette};
use crate::vcs::{Credentials, UnavailableVcs, VcsCollaborator};
use orbit_exec::{BackendRegistry, EmbeddedRuntime, ExecutionHandle, ExecutionRequest, JobStream};
use orbit_foundation::vfs::path;
use orbit_foundation::{BackendId, Error, JobId, VfsStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Parsing
// ============================================================================

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Ls(Option<String>),
    Pwd,
    Cd(Option<String>),
    Mkdir(Option<String>),
    Touch(Option<String>),
    Rm(Option<String>),
    Cat(Option<String>),
    Clear,
    Pip(Vec<String>),
    Login(Vec<String>),
    Git(Vec<String>),
    /// `python`, `cpp` or `run` with an optional entry argument
    Runtime {
        program: String,
        backend: BackendId,
        entry: Option<String>,
    },
    /// A bare file name, routed by extension
    File(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(base) = tokens.next() else {
            return Command::Empty;
        };
        let args: Vec<String> = tokens.map(str::to_string).collect();
        let first = args.first().cloned();

        let runtime = |backend, entry| Command::Runtime {
            program: base.to_string(),
            backend,
            entry,
        };

        match base {
            "ls" => Command::Ls(first),
            "pwd" => Command::Pwd,
            "cd" => Command::Cd(first),
            "mkdir" => Command::Mkdir(first),
            "touch" => Command::Touch(first),
            "rm" => Command::Rm(first),
            "cat" => Command::Cat(first),
            "clear" => Command::Clear,
            "pip" => Command::Pip(args),
            "login" => Command::Login(args),
            "git" => Command::Git(args),
            "python" => runtime(BackendId::Interpreter, first),
            "cpp" => runtime(BackendId::Compiled, first),
            "run" => runtime(BackendId::Remote, first),
            _ if path::extension(base).is_some() => Command::File(base.to_string()),
            _ => Command::Unknown(base.to_string()),
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

/// A started job handed back to the session manager
#[derive(Debug)]
pub struct Dispatch {
    pub handle: ExecutionHandle,
    pub stream: JobStream,
    /// Set for `pip install`
    pub install: Option<String>,
}

/// What the caller does after routing a line
#[derive(Debug)]
pub enum Routed {
    /// Builtin finished; print its output and a prompt
    Done,
    /// Clear the screen, then prompt
    Clear,
    /// Session enters EXECUTING
    Job(Dispatch),
}

/// Parses lines and runs builtins or dispatches jobs
pub struct CommandRouter {
    vfs: VfsStore,
    backends: Arc<BackendRegistry>,
    installer: Option<Arc<EmbeddedRuntime>>,
    vcs: Arc<dyn VcsCollaborator>,
    credentials: Option<Credentials>,
    palette: Palette,
}

impl CommandRouter {
    pub fn new(vfs: VfsStore, backends: Arc<BackendRegistry>) -> Self {
        Self {
            vfs,
            backends,
            installer: None,
            vcs: Arc::new(UnavailableVcs),
            credentials: None,
            palette: Palette::default(),
        }
    }

    /// Runtime used by `pip install`
    pub fn with_installer(mut self, runtime: Arc<EmbeddedRuntime>) -> Self {
        self.installer = Some(runtime);
        self
    }

    pub fn with_vcs(mut self, vcs: Arc<dyn VcsCollaborator>) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn vfs(&self) -> &VfsStore {
        &self.vfs
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Route one line for `session`. Text for the session goes into `out`.
    pub async fn route(&mut self, session: &mut TerminalSession, line: &str, out: &mut String) -> Routed {
        let command = Command::parse(line);
        debug!(session = %session.id, ?command, "routing");

        match command {
            Command::Empty => Routed::Done,
            Command::Ls(arg) => {
                self.ls(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Pwd => {
                writeln(out, &self.palette.paint(&session.cwd, Color::Blue));
                Routed::Done
            }
            Command::Cd(arg) => {
                self.cd(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Mkdir(arg) => {
                self.mkdir(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Touch(arg) => {
                self.touch(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Rm(arg) => {
                self.rm(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Cat(arg) => {
                self.cat(session, arg.as_deref(), out);
                Routed::Done
            }
            Command::Clear => Routed::Clear,
            Command::Login(args) => {
                self.login(&args, out);
                Routed::Done
            }
            Command::Git(args) => {
                self.git(session, &args, out).await;
                Routed::Done
            }
            Command::Pip(args) => self.pip(session, &args, out),
            Command::Runtime {
                program,
                backend,
                entry,
            } => match entry {
                Some(entry) => self.dispatch(session, backend, &entry, out),
                None => {
                    writeln(out, &format!("Usage: {} <filename>", program));
                    Routed::Done
                }
            },
            Command::File(name) => {
                let routed = path::extension(&name).and_then(|ext| self.backends.route(ext));
                match routed {
                    Some(backend) => self.dispatch(session, backend, &name, out),
                    None => {
                        self.error(out, &format!("Command not found: {}", name));
                        Routed::Done
                    }
                }
            }
            Command::Unknown(name) => {
                self.error(out, &format!("Command not found: {}", name));
                Routed::Done
            }
        }
    }

    /// Build an execution request against the current snapshot and run it
    fn dispatch(
        &self,
        session: &TerminalSession,
        backend: BackendId,
        entry: &str,
        out: &mut String,
    ) -> Routed {
        let raw = if entry.starts_with('/') {
            entry.to_string()
        } else {
            format!("{}/{}", session.cwd, entry)
        };
        let entry_path = match path::normalize_strict(&raw) {
            Ok(p) => p,
            Err(err) => {
                self.report(out, "run", &err);
                return Routed::Done;
            }
        };

        let request = ExecutionRequest::new(backend, entry_path, self.vfs.snapshot())
            .with_session(session.display_name.clone());
        info!(
            session = %session.id,
            job_id = %request.job_id,
            %backend,
            entry = %request.entry_path,
            "dispatching job"
        );
        let (handle, stream) = self.backends.run(request);
        Routed::Job(Dispatch {
            handle,
            stream,
            install: None,
        })
    }

    fn pip(&self, session: &TerminalSession, args: &[String], out: &mut String) -> Routed {
        let package = match args {
            [sub, package, ..] if sub == "install" => package,
            _ => {
                writeln(out, "Usage: pip install <package_name>");
                return Routed::Done;
            }
        };
        let Some(runtime) = &self.installer else {
            self.error(out, "pip: no embedded interpreter runtime is configured");
            return Routed::Done;
        };

        let job_id = JobId::new();
        info!(session = %session.id, %job_id, %package, "installing package");
        let (handle, stream) = runtime.install(package, job_id);
        Routed::Job(Dispatch {
            handle,
            stream,
            install: Some(package.clone()),
        })
    }

    fn error(&self, out: &mut String, text: &str) {
        writeln(out, &self.palette.paint(text, Color::Red));
    }

    /// Render a failure of `command`. Errors not written for the user are
    /// logged and shown under the command's name.
    fn report(&self, out: &mut String, command: &str, err: &Error) {
        if err.is_user_facing() {
            self.error(out, &err.to_string());
        } else {
            warn!(command, "command failed: {}", err);
            self.error(out, &format!("{}: {}", command, err));
        }
    }
}

/// Append one terminal line
pub(crate) fn writeln(out: &mut String, text: &str) {
    out.push_str(text);
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtins() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("ls"), Command::Ls(None));
        assert_eq!(Command::parse("cd  src "), Command::Cd(Some("src".into())));
        assert_eq!(
            Command::parse("pip install numpy"),
            Command::Pip(vec!["install".into(), "numpy".into()])
        );
        assert_eq!(Command::parse("frobnicate"), Command::Unknown("frobnicate".into()));
    }

    #[test]
    fn test_parse_runtime_commands() {
        assert_eq!(
            Command::parse("python main.py"),
            Command::Runtime {
                program: "python".into(),
                backend: BackendId::Interpreter,
                entry: Some("main.py".into()),
            }
        );
        assert_eq!(
            Command::parse("run"),
            Command::Runtime {
                program: "run".into(),
                backend: BackendId::Remote,
                entry: None,
            }
        );
        assert_eq!(Command::parse("main.cpp"), Command::File("main.cpp".into()));
        assert_eq!(Command::parse("./src/app.js"), Command::File("./src/app.js".into()));
    }

    #[test]
    fn test_tokenizer_has_no_quoting() {
        // known limitation: quotes are ordinary characters
        assert_eq!(
            Command::parse("cat \"my file.txt\""),
            Command::Cat(Some("\"my".into()))
        );
    }
}
