//! Virtual path helpers
//!
//! Virtual paths are always absolute, `/`-separated and never end with a
//! separator (except the root itself).

use crate::{Error, Result};

/// Root path of every tree
pub const ROOT: &str = "/";

/// Normalize a path: drop empty and `.` segments, pop one segment per `..`
/// (never above the root) and re-join with a leading `/`.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

/// Like [`normalize`], but a `..` that would climb above the root is an error.
pub fn normalize_strict(path: &str) -> Result<String> {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::path(format!("'{}' escapes the root folder", path)));
                }
            }
            other => stack.push(other),
        }
    }
    Ok(format!("/{}", stack.join("/")))
}

/// Resolve `arg` against `cwd`; absolute arguments ignore `cwd`.
pub fn resolve(cwd: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        normalize(arg)
    } else {
        normalize(&format!("{}/{}", cwd, arg))
    }
}

/// Child path of `parent` (both normalized)
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Split a normalized non-root path into `(parent, name)`
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => (ROOT, &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (ROOT, path),
    }
}

/// Last segment of a path (`/` for the root)
pub fn file_name(path: &str) -> &str {
    if path == ROOT {
        ROOT
    } else {
        split(path).1
    }
}

/// Extension of the last segment, without the dot
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Check that `name` can be a single path segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(Error::validation(format!("invalid name '{}'", name)));
    }
    Ok(())
}
