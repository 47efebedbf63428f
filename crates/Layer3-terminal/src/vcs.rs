//! Version-control collaborator seam
//!
//! The terminal never runs version control itself. `git ...` is handed to a
//! [`VcsCollaborator`]; what comes back is text for the session plus
//! display-only status markers (and optionally a replacement tree after a
//! clone or pull).

use async_trait::async_trait;
use orbit_foundation::{Error, Result, Vfs};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Credentials captured by `login`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}

/// One `git` invocation
#[derive(Debug, Clone)]
pub struct VcsRequest<'a> {
    /// Arguments after `git`
    pub args: &'a [String],
    pub cwd: &'a str,
    pub snapshot: Arc<Vfs>,
    pub credentials: Option<&'a Credentials>,
}

/// Result of a `git` invocation
#[derive(Debug, Default)]
pub struct VcsOutcome {
    /// Lines printed to the session
    pub lines: Vec<String>,
    /// Replacement tree (clone, pull, checkout)
    pub tree: Option<Vfs>,
    /// `(path, marker)` pairs; `None` clears a marker
    pub statuses: Vec<(String, Option<String>)>,
}

#[async_trait]
pub trait VcsCollaborator: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, request: VcsRequest<'_>) -> Result<VcsOutcome>;
}

/// Collaborator used when nothing is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableVcs;

#[async_trait]
impl VcsCollaborator for UnavailableVcs {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn run(&self, _request: VcsRequest<'_>) -> Result<VcsOutcome> {
        Err(Error::validation("git: version control is not available"))
    }
}
