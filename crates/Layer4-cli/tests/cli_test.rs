//! `orbit` 바이너리 통합 테스트
//!
//! `cargo test -p orbit-cli --test cli_test`
//!
//! 프로젝트 설정(`.orbit/config.json`)으로 셸 툴체인을 등록해서
//! `orbit run`을 로컬 샌드박스에서 실행합니다.

use std::path::Path;
use std::process::{Command, Output};

fn has_sh() -> bool {
    Command::new("sh")
        .args(["-c", "exit 0"])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn orbit(dir: &Path, args: &[&str]) -> Output {
    orbit_with_tmp(dir, &std::env::temp_dir(), args)
}

/// Run with `TMPDIR` pointed at `tmp`, where local sandboxes are created
fn orbit_with_tmp(dir: &Path, tmp: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_orbit"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .env("TMPDIR", tmp)
        .output()
        .unwrap()
}

/// Project with an `sh` toolchain in its `.orbit/config.json`
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".orbit")).unwrap();
    std::fs::write(
        dir.path().join(".orbit/config.json"),
        r#"{ "toolchains": { "sh": { "kind": "interpreted", "run": ["sh", "{entry}"] } } }"#,
    )
    .unwrap();
    dir
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let out = orbit(dir.path(), &["--help"]);

    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for sub in ["serve", "shell", "run"] {
        assert!(text.contains(sub), "missing {} in help", sub);
    }
}

#[test]
fn test_run_streams_output_and_exit_code() {
    if !has_sh() {
        return;
    }
    let dir = project();
    std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
    std::fs::write(dir.path().join("data.txt"), "payload").unwrap();
    std::fs::write(
        dir.path().join("scripts/main.sh"),
        "cat data.txt; echo; echo oops >&2; exit 3\n",
    )
    .unwrap();

    let out = orbit(dir.path(), &["run", "scripts/main.sh"]);

    assert_eq!(out.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "payload\n");
    assert!(String::from_utf8_lossy(&out.stderr).contains("oops"));
}

#[test]
fn test_run_leaves_no_workspace_behind() {
    if !has_sh() {
        return;
    }
    let dir = project();
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.sh"), "echo hi > scratch.txt; cat scratch.txt\n").unwrap();

    let out = orbit_with_tmp(dir.path(), tmp.path(), &["run", "main.sh"]);

    assert_eq!(out.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hi\n");
    let root = tmp.path().join("orbit-run");
    let left: Vec<_> = std::fs::read_dir(&root).unwrap().collect();
    assert!(left.is_empty(), "{} entries left in {}", left.len(), root.display());
}

#[test]
fn test_run_unsupported_file_fails() {
    let dir = project();
    std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();

    let out = orbit(dir.path(), &["run", "notes.md"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(!out.stderr.is_empty());
}
