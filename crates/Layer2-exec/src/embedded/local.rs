//! Local toolchain engine - host interpreters and compilers inside the
//! private mount

use super::{Engine, EngineJob};
use crate::job::{JobControl, JobSink};
use crate::sandbox::{self, ResolvedEntry};
use async_trait::async_trait;
use orbit_foundation::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Runs any toolchain from the table through the sandbox pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalToolchainEngine;

#[async_trait]
impl Engine for LocalToolchainEngine {
    fn name(&self) -> &'static str {
        "local-toolchain"
    }

    fn handles(&self, _entry: &ResolvedEntry) -> bool {
        true
    }

    async fn execute(&self, job: EngineJob<'_>) -> Result<i32> {
        job.session.execute(job.entry, job.control, job.sink).await
    }
}

/// Reject names that could be read as options or that carry whitespace
pub(super) fn validate_package(package: &str) -> Result<()> {
    let valid = !package.is_empty()
        && !package.starts_with('-')
        && package
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.[],=<>!~".contains(c));
    if !valid {
        return Err(Error::validation(format!("invalid package name '{}'", package)));
    }
    Ok(())
}

/// `pip install` into the runtime's package directory
pub(super) async fn install(
    package: &str,
    target: &Path,
    mut control: JobControl,
    sink: &JobSink,
) -> Result<i32> {
    let argv: Vec<String> = [
        "python3",
        "-m",
        "pip",
        "install",
        "--disable-pip-version-check",
        "--quiet",
        "--target",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([target.to_string_lossy().into_owned(), package.to_string()])
    .collect();
    debug!(?argv, "installing package");

    let output = sink
        .output()
        .ok_or_else(|| Error::Internal("job sink already closed".into()))?;
    sandbox::run_step(&argv, target, &[], &mut control, output).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package() {
        assert!(validate_package("numpy").is_ok());
        assert!(validate_package("requests==2.31.0").is_ok());
        assert!(validate_package("--index-url").is_err());
        assert!(validate_package("a b").is_err());
        assert!(validate_package("").is_err());
    }
}
