//! Builtins that run synchronously against the shared VFS
//!
//! None of these change the session's mode. Failures are printed inline.

use super::{writeln, CommandRouter};
use crate::session::TerminalSession;
use crate::style::{convert_eol, Color};
use crate::vcs::{Credentials, VcsRequest};
use orbit_foundation::vfs::path::{self, ROOT};
use orbit_foundation::FsNode;
use tracing::{debug, info, warn};

impl CommandRouter {
    pub(super) fn ls(&self, session: &TerminalSession, arg: Option<&str>, out: &mut String) {
        let target = match arg {
            Some(arg) => path::resolve(&session.cwd, arg),
            None => session.cwd.clone(),
        };
        let snapshot = self.vfs.snapshot();
        let folder = match snapshot.folder(&target) {
            Ok(folder) => folder,
            Err(_) => {
                let shown = arg.unwrap_or(&session.cwd);
                self.error(out, &format!("ls: cannot access '{}': No such file or directory", shown));
                return;
            }
        };

        let names: Vec<String> = folder
            .children()
            .map(|child| {
                let color = if child.is_folder() { Color::Blue } else { Color::Cyan };
                self.palette.paint(child.name(), color)
            })
            .collect();
        if !names.is_empty() {
            writeln(out, &names.join("  "));
        }
    }

    /// A failed `cd` never touches `cwd`
    pub(super) fn cd(&self, session: &mut TerminalSession, arg: Option<&str>, out: &mut String) {
        let Some(arg) = arg else { return };
        let target = path::resolve(&session.cwd, arg);
        if self.vfs.snapshot().folder(&target).is_ok() {
            debug!(session = %session.id, from = %session.cwd, to = %target, "cd");
            session.cwd = target;
        } else {
            self.error(out, &format!("cd: no such directory: {}", arg));
        }
    }

    pub(super) fn mkdir(&self, session: &TerminalSession, arg: Option<&str>, out: &mut String) {
        let Some(arg) = arg else {
            writeln(out, "Usage: mkdir <directory>");
            return;
        };
        if let Err(reason) = self.create(session, arg, FsNode::folder(path::file_name(arg), Vec::new())) {
            self.error(out, &format!("mkdir: cannot create directory '{}': {}", arg, reason));
        }
    }

    pub(super) fn touch(&self, session: &TerminalSession, arg: Option<&str>, out: &mut String) {
        let Some(arg) = arg else {
            writeln(out, "Usage: touch <file>");
            return;
        };
        let target = path::resolve(&session.cwd, arg);
        // touching an existing file is a no-op
        if self.vfs.snapshot().file(&target).is_ok() {
            return;
        }
        if let Err(reason) = self.create(session, arg, FsNode::file(path::file_name(arg), "")) {
            self.error(out, &format!("touch: cannot touch '{}': {}", arg, reason));
        }
    }

    /// Add `node` at `arg` resolved against the cwd
    fn create(&self, session: &TerminalSession, arg: &str, mut node: FsNode) -> Result<(), String> {
        let target = path::resolve(&session.cwd, arg);
        if target == ROOT {
            return Err("File exists".to_string());
        }
        let (parent, name) = path::split(&target);
        node.name = name.to_string();

        let snapshot = self.vfs.snapshot();
        if snapshot.find(&target).is_some() {
            return Err("File exists".to_string());
        }
        if snapshot.folder(parent).is_err() {
            return Err("No such file or directory".to_string());
        }

        self.vfs
            .update(|vfs| vfs.add(parent, node))
            .map(|created| debug!(path = %created, "created"))
            .map_err(|err| err.to_string())
    }

    pub(super) fn rm(&self, session: &TerminalSession, arg: Option<&str>, out: &mut String) {
        let Some(arg) = arg else {
            writeln(out, "Usage: rm <path>");
            return;
        };
        let target = path::resolve(&session.cwd, arg);

        {
            let snapshot = self.vfs.snapshot();
            let Some(node) = snapshot.find(&target) else {
                self.error(out, &format!("rm: cannot remove '{}': No such file or directory", arg));
                return;
            };
            if node.is_folder() && node.children().next().is_some() {
                self.error(out, &format!("rm: cannot remove '{}': Directory not empty", arg));
                return;
            }
        }

        if let Err(err) = self.vfs.update(|vfs| vfs.delete(&target)) {
            self.error(out, &format!("rm: cannot remove '{}': {}", arg, err));
        }
    }

    pub(super) fn cat(&self, session: &TerminalSession, arg: Option<&str>, out: &mut String) {
        let Some(arg) = arg else {
            writeln(out, "Usage: cat <file>");
            return;
        };
        let snapshot = self.vfs.snapshot();
        match snapshot.file(&path::resolve(&session.cwd, arg)) {
            Ok(file) => {
                let content = file.content().unwrap_or_default();
                if !content.is_empty() {
                    writeln(out, convert_eol(content).trim_end_matches("\r\n"));
                }
            }
            Err(_) => self.error(out, "File not found"),
        }
    }

    pub(super) fn login(&mut self, args: &[String], out: &mut String) {
        match args {
            [username, token, ..] => {
                info!(%username, "credentials saved");
                self.credentials = Some(Credentials {
                    username: username.clone(),
                    token: token.clone(),
                });
                writeln(out, &self.palette.paint("Credentials saved for this session.", Color::Green));
            }
            _ => writeln(out, "Usage: login <username> <token>"),
        }
    }

    /// Delegate to the version-control collaborator and apply what it returns
    pub(super) async fn git(&self, session: &TerminalSession, args: &[String], out: &mut String) {
        if args.is_empty() {
            writeln(out, "Usage: git <command> [options]");
            return;
        }

        let request = VcsRequest {
            args,
            cwd: &session.cwd,
            snapshot: self.vfs.snapshot(),
            credentials: self.credentials.as_ref(),
        };
        let outcome = match self.vcs.run(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report(out, "git", &err);
                return;
            }
        };

        for line in &outcome.lines {
            writeln(out, line);
        }
        if let Some(tree) = outcome.tree {
            self.vfs.replace(tree);
        }
        // markers are display-only; a path that vanished is not an error
        for (path, status) in outcome.statuses {
            if let Err(err) = self.vfs.update(|vfs| vfs.set_vcs_status(&path, status)) {
                warn!(collaborator = self.vcs.name(), "skipping status marker: {}", err);
            }
        }
    }
}
