//! Host directory → VFS
//!
//! Walks a directory with `ignore` so `.gitignore`d build output stays out of
//! the snapshot. Files that are not UTF-8 text are skipped.

use anyhow::Context;
use ignore::WalkBuilder;
use orbit_foundation::{vfs::path, FsNode, Vfs};
use std::path::Path;
use tracing::debug;

/// Files above this size are left out of the snapshot
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub fn load(dir: &Path) -> anyhow::Result<Vfs> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot open workspace {}", dir.display()))?;
    let mut vfs = Vfs::new();

    let walker = WalkBuilder::new(&dir)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping entry: {}", e);
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(&dir) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let vpath = to_vpath(relative);
        let (parent, name) = path::split(&vpath);
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        let node = if is_dir {
            FsNode::folder(name, Vec::new())
        } else {
            let too_big = entry
                .metadata()
                .map(|m| m.len() > MAX_FILE_BYTES)
                .unwrap_or(true);
            if too_big {
                debug!(path = %vpath, "file too large, skipped");
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(text) => FsNode::file(name, text),
                Err(_) => {
                    debug!(path = %vpath, "not a text file, skipped");
                    continue;
                }
            }
        };

        // a skipped folder leaves its children without a parent
        if let Err(e) = vfs.add(parent, node) {
            debug!(path = %vpath, "not added: {}", e);
        }
    }

    Ok(vfs)
}

/// Virtual path of a host path relative to the workspace
pub fn to_vpath(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.py"), "print('hi')\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let vfs = load(dir.path()).unwrap();

        assert_eq!(vfs.file("/src/main.py").unwrap().content(), Some("print('hi')\n"));
        assert_eq!(vfs.file("/readme.txt").unwrap().content(), Some("hello"));
        assert!(vfs.find("/blob.bin").is_none());
        let names: Vec<&str> = vfs.folder("/").unwrap().children().map(|n| n.name()).collect();
        assert_eq!(names, vec!["src", "readme.txt"]);
    }

    #[test]
    fn test_hidden_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        let vfs = load(dir.path()).unwrap();

        assert!(vfs.find("/.git").is_none());
        assert!(vfs.find("/main.go").is_some());
    }

    #[test]
    fn test_to_vpath() {
        assert_eq!(to_vpath(Path::new("src/lib/a.c")), "/src/lib/a.c");
        assert_eq!(to_vpath(Path::new("a.c")), "/a.c");
    }

    #[test]
    fn test_missing_directory() {
        assert!(load(Path::new("/definitely/not/here")).is_err());
    }
}
