//! End-to-end: the `tarx` binary as a black box, driven via `std::process::Command`.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tarx::tar::{Entry, Header, BLOCK_SIZE};
use tempfile::TempDir;

fn tarx_bin() -> PathBuf {
    if let Ok(p) = std::env::var("CARGO_BIN_EXE_tarx") {
        return PathBuf::from(p);
    }
    let mut p = std::env::current_exe().unwrap();
    p.pop();
    if p.ends_with("deps") {
        p.pop();
    }
    p.push("tarx");
    p
}

fn write_archive_with_one_file(path: &std::path::Path, name: &str, content: &[u8]) {
    let entry = Entry::new_file(name, content.len() as u64);
    let header = Header::encode(&entry, &tarx::Context::new()).unwrap();
    let mut data = header.to_block(&tarx::Context::new()).unwrap().to_vec();
    data.extend_from_slice(content);
    let rem = content.len() % BLOCK_SIZE;
    if rem != 0 {
        data.extend(vec![0u8; BLOCK_SIZE - rem]);
    }
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);
    fs::write(path, data).unwrap();
}

#[test]
fn extract_subcommand_writes_the_file_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi there\n");
    let dest = dir.path().join("out");
    fs::create_dir(&dest).unwrap();

    let status = Command::new(tarx_bin())
        .args(["extract", archive.to_str().unwrap(), dest.to_str().unwrap()])
        .status()
        .expect("failed to run tarx extract");

    assert!(status.success(), "extract should exit 0");
    assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"hi there\n");
}

#[test]
fn extract_alias_x_behaves_identically() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi\n");
    let dest = dir.path().join("out");
    fs::create_dir(&dest).unwrap();

    let status = Command::new(tarx_bin())
        .args(["x", archive.to_str().unwrap(), dest.to_str().unwrap()])
        .status()
        .expect("failed to run tarx x");

    assert!(status.success());
    assert!(dest.join("hello.txt").exists());
}

#[test]
fn overwrite_flag_controls_extraction_onto_an_existing_file() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"new\n");
    let dest = dir.path().join("out");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("hello.txt"), b"old").unwrap();

    let status = Command::new(tarx_bin())
        .args(["extract", archive.to_str().unwrap(), dest.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(!status.success(), "extract without --overwrite must fail on an existing file");
    assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"old");

    let status = Command::new(tarx_bin())
        .args(["extract", "--overwrite", archive.to_str().unwrap(), dest.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(status.success(), "extract with --overwrite should replace the file");
    assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"new\n");
}

#[test]
fn path_traversal_is_rejected_with_a_nonzero_exit() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.tar");
    write_archive_with_one_file(&archive, "../../etc/passwd", b"x");
    let dest = dir.path().join("out");
    fs::create_dir(&dest).unwrap();

    let output = Command::new(tarx_bin())
        .args(["extract", archive.to_str().unwrap(), dest.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!dest.parent().unwrap().join("etc").exists());
}

#[test]
fn list_subcommand_prints_entry_metadata() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi there\n");

    let output = Command::new(tarx_bin())
        .args(["list", archive.to_str().unwrap()])
        .output()
        .expect("failed to run tarx list");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello.txt"), "list output should name the entry; got: {stdout}");
    assert!(stdout.contains('9'), "list output should show the 9-byte size; got: {stdout}");
}

#[test]
fn list_aliases_are_accepted() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi\n");

    for alias in ["l", "ls"] {
        let status = Command::new(tarx_bin())
            .args([alias, archive.to_str().unwrap()])
            .status()
            .unwrap();
        assert!(status.success(), "alias {alias} should behave like list");
    }
}

#[test]
fn test_subcommand_reports_ok_on_a_valid_archive() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi there\n");

    let output = Command::new(tarx_bin())
        .args(["test", archive.to_str().unwrap()])
        .output()
        .expect("failed to run tarx test");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 entries OK"), "got: {stdout}");
}

#[test]
fn test_alias_t_is_accepted() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    write_archive_with_one_file(&archive, "hello.txt", b"hi\n");

    let status = Command::new(tarx_bin())
        .args(["t", archive.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn test_subcommand_rejects_a_truncated_archive() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bad.tar");
    let entry = Entry::new_file("big.bin", 10_000);
    let header = Header::encode(&entry, &tarx::Context::new()).unwrap();
    let mut data = header.to_block(&tarx::Context::new()).unwrap().to_vec();
    data.extend(vec![0u8; 100]); // far short of the declared 10000-byte body
    fs::write(&archive, data).unwrap();

    let status = Command::new(tarx_bin())
        .args(["test", archive.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn nonexistent_archive_file_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.tar");
    let dest = dir.path().join("out");

    let status = Command::new(tarx_bin())
        .args(["extract", missing.to_str().unwrap(), dest.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn help_and_version_flags_exit_zero() {
    let help = Command::new(tarx_bin()).arg("--help").output().unwrap();
    assert!(help.status.success());
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&help.stdout),
        String::from_utf8_lossy(&help.stderr)
    );
    assert!(combined.to_lowercase().contains("usage"));

    let version = Command::new(tarx_bin()).arg("--version").output().unwrap();
    assert!(version.status.success());
    assert!(!String::from_utf8_lossy(&version.stdout).trim().is_empty());
}
