//! Toolchain and routing types shared by the config file, the router and
//! the sandbox pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a source file becomes a running program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolchainKind {
    /// An interpreter runs the entry file directly
    Interpreted,
    /// A compile step (possibly fused with the run step) precedes execution
    Compiled,
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainKind::Interpreted => write!(f, "interpreted"),
            ToolchainKind::Compiled => write!(f, "compiled"),
        }
    }
}

/// Command templates for one extension.
///
/// Arguments may contain `{entry}`, `{stem}`, `{dir}`, `{workspace}` and
/// `{bin}` placeholders; they are expanded against the provisioned workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainSpec {
    pub kind: ToolchainKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<Vec<String>>,

    pub run: Vec<String>,
}

impl ToolchainSpec {
    pub fn interpreted(run: &[&str]) -> Self {
        Self {
            kind: ToolchainKind::Interpreted,
            compile: None,
            run: run.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn compiled(compile: Option<&[&str]>, run: &[&str]) -> Self {
        Self {
            kind: ToolchainKind::Compiled,
            compile: compile.map(|c| c.iter().map(|s| s.to_string()).collect()),
            run: run.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Identifies one of the execution backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendId {
    /// In-process interpreter runtime
    Interpreter,
    /// In-process compile-then-run runtime
    Compiled,
    /// Out-of-process sandboxed executor on the server
    Remote,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Interpreter => "interpreter",
            BackendId::Compiled => "compiled",
            BackendId::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreter" => Ok(BackendId::Interpreter),
            "compiled" => Ok(BackendId::Compiled),
            "remote" => Ok(BackendId::Remote),
            other => Err(crate::Error::Config(format!("unknown backend '{}'", other))),
        }
    }
}
