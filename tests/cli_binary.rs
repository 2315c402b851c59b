//! Black-box tests of the `bisync` binary.

use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;

fn bisync() -> Command {
    Command::cargo_bin("bisync").expect("binary builds")
}

#[test]
fn mirror_run_succeeds_and_copies() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("hello.txt"), b"hello").unwrap();

    bisync()
        .arg(left.path())
        .arg(right.path())
        .args(["--variant", "mirror", "--deletion", "permanent", "--no-locks"])
        .assert()
        .success();

    assert_eq!(fs::read(right.path().join("hello.txt")).unwrap(), b"hello");
}

#[test]
fn conflicting_state_exits_with_warning_code() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();

    // establish the in-sync database
    fs::write(left.path().join("c.txt"), b"base").unwrap();
    bisync()
        .arg(left.path())
        .arg(right.path())
        .args(["--deletion", "permanent", "--no-locks"])
        .assert()
        .success();

    // diverge both sides
    fs::remove_file(left.path().join("c.txt")).unwrap();
    fs::write(right.path().join("c.txt"), b"independent").unwrap();
    filetime::set_file_mtime(
        right.path().join("c.txt"),
        filetime::FileTime::from_unix_time(1_600_000_000, 0),
    )
    .unwrap();

    bisync()
        .arg(left.path())
        .arg(right.path())
        .args(["--deletion", "permanent", "--no-locks"])
        .assert()
        .code(1);
}

#[test]
fn missing_versioning_folder_is_a_usage_error() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();

    bisync()
        .arg(left.path())
        .arg(right.path())
        .args(["--deletion", "versioning", "--no-locks"])
        .assert()
        .code(3);
}

#[test]
fn excludes_are_honored_end_to_end() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("keep.txt"), b"k").unwrap();
    fs::write(left.path().join("skip.log"), b"s").unwrap();

    bisync()
        .arg(left.path())
        .arg(right.path())
        .args([
            "--variant",
            "mirror",
            "--deletion",
            "permanent",
            "--no-locks",
            "--exclude",
            "*.log",
        ])
        .assert()
        .success();

    assert!(right.path().join("keep.txt").exists());
    assert!(!right.path().join("skip.log").exists());
}
