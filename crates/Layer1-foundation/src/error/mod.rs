//! Error types for Orbit
//!
//! Every failure a terminal session can observe is one of these variants.
//! Builtins render them inline; execution backends turn them into a
//! stderr diagnostic plus a non-zero exit code.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code of a job that was killed on request (128 + SIGINT)
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Orbit error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Command usage
    // ========================================================================
    /// Malformed builtin usage or a request that makes no sense for its target
    #[error("{0}")]
    Validation(String),

    // ========================================================================
    // Virtual file system
    // ========================================================================
    /// Missing file/directory, wrong node kind, or a path escaping the root
    #[error("{0}")]
    Path(String),

    // ========================================================================
    // Execution
    // ========================================================================
    /// A process (compiler, interpreter, program) could not be started
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// The compile step of a compile-then-run pipeline exited non-zero
    #[error("compilation failed with exit code {code}")]
    Compile { code: i32, diagnostic: String },

    /// An in-process program raised instead of returning
    #[error("process exited with code {code}")]
    Runtime { code: i32, diagnostic: String },

    /// Transport to the remote executor is unavailable or dropped
    #[error("{0}")]
    Connection(String),

    /// The embedded runtime is already running another job
    #[error("{0}")]
    Busy(String),

    /// The job was killed on request; not a failure
    #[error("cancelled")]
    Cancelled,

    // ========================================================================
    // Ambient
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Path error helper
    pub fn path(message: impl Into<String>) -> Self {
        Error::Path(message.into())
    }

    /// Validation error helper
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Spawn error helper
    pub fn spawn(program: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Spawn {
            program: program.into(),
            message: err.to_string(),
        }
    }

    /// Errors whose message is meant to be shown to the user verbatim
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Path(_)
                | Error::Spawn { .. }
                | Error::Busy(_)
                | Error::Connection(_)
                | Error::Cancelled
        )
    }

    /// Exit code reported through the backend contract for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Compile { code, .. } | Error::Runtime { code, .. } if *code != 0 => *code,
            Error::Cancelled => CANCELLED_EXIT_CODE,
            _ => 1,
        }
    }

    /// Text written to the job's stderr stream for this failure.
    /// `None` for a cancelled job.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Error::Cancelled => None,
            Error::Compile { diagnostic, .. } | Error::Runtime { diagnostic, .. }
                if !diagnostic.is_empty() =>
            {
                Some(diagnostic.clone())
            }
            other => Some(format!("{}\n", other)),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_prefers_child_code() {
        let err = Error::Compile {
            code: 4,
            diagnostic: "main.cpp:1: error".to_string(),
        };
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.diagnostic().as_deref(), Some("main.cpp:1: error"));

        assert_eq!(Error::Busy("busy".into()).exit_code(), 1);
        let raised = Error::Runtime {
            code: 0,
            diagnostic: String::new(),
        };
        assert_eq!(raised.exit_code(), 1);
        assert_eq!(raised.diagnostic().as_deref(), Some("process exited with code 0\n"));
    }

    #[test]
    fn test_cancelled_is_silent() {
        assert_eq!(Error::Cancelled.diagnostic(), None);
        assert_eq!(Error::Cancelled.exit_code(), CANCELLED_EXIT_CODE);
        assert_eq!(
            Error::Busy("runtime busy".into()).diagnostic().as_deref(),
            Some("runtime busy\n")
        );
    }

    #[test]
    fn test_user_facing() {
        assert!(Error::path("cd: no such directory: x").is_user_facing());
        assert!(!Error::Internal("boom".into()).is_user_facing());
    }
}
