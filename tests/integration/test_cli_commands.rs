//! End-to-end CLI tests for the `recompress` and `check` commands.
//!
//! These tests run the actual `blockpipe` binary against temporary files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use blockpipe_lib::bgzf::BlockIndex;
use tempfile::TempDir;

use crate::helpers::{bgzf_input, gunzip, random_payloads, split_blocks};

fn blockpipe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blockpipe")).args(args).output().expect("failed to run blockpipe")
}

fn write_input(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_recompress_round_trips() {
    let dir = TempDir::new().unwrap();
    let input = bgzf_input(random_payloads(71, 30, 20_000), 1, true);
    let input_path = write_input(&dir, "input.gz", &input.bytes);
    let output_path = dir.path().join("output.gz");

    let output = blockpipe(&[
        "recompress",
        "-i",
        path_str(&input_path),
        "-o",
        path_str(&output_path),
        "--threads",
        "3",
        "--compression-level",
        "9",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let recompressed = fs::read(&output_path).unwrap();
    assert_eq!(gunzip(&recompressed), input.concatenated());
}

#[test]
fn test_recompress_writes_gzi_index() {
    let dir = TempDir::new().unwrap();
    let input = bgzf_input(random_payloads(72, 12, 50_000), 6, true);
    let input_path = write_input(&dir, "input.gz", &input.bytes);
    let output_path = dir.path().join("output.gz");
    let index_path = dir.path().join("output.gz.gzi");

    let output = blockpipe(&[
        "recompress",
        "-i",
        path_str(&input_path),
        "-o",
        path_str(&output_path),
        "--index",
        path_str(&index_path),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let recompressed = fs::read(&output_path).unwrap();
    let index = BlockIndex::read_from(&mut fs::File::open(&index_path).unwrap()).unwrap();
    assert_eq!(index.len(), split_blocks(&recompressed).len() - 1);
}

#[test]
fn test_recompress_fails_on_corrupt_input() {
    let dir = TempDir::new().unwrap();
    let mut input = bgzf_input(random_payloads(73, 10, 5000), 6, true);
    input.corrupt_crc(4);
    let input_path = write_input(&dir, "input.gz", &input.bytes);
    let output_path = dir.path().join("output.gz");

    let output = blockpipe(&["recompress", "-i", path_str(&input_path), "-o", path_str(&output_path)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("CRC32 mismatch"));
    // Blocks before the corrupt one were written.
    assert_eq!(gunzip(&fs::read(&output_path).unwrap()), input.prefix(4));
}

#[test]
fn test_recompress_rejects_missing_input() {
    let dir = TempDir::new().unwrap();
    let output = blockpipe(&[
        "recompress",
        "-i",
        path_str(&dir.path().join("absent.gz")),
        "-o",
        path_str(&dir.path().join("output.gz")),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_recompress_rejects_invalid_level() {
    let dir = TempDir::new().unwrap();
    let input = bgzf_input(random_payloads(74, 2, 100), 6, true);
    let input_path = write_input(&dir, "input.gz", &input.bytes);
    let output = blockpipe(&[
        "recompress",
        "-i",
        path_str(&input_path),
        "-o",
        path_str(&dir.path().join("output.gz")),
        "--compression-level",
        "20",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("compression level"));
}

#[test]
fn test_check_accepts_valid_files() {
    let dir = TempDir::new().unwrap();
    let first = write_input(&dir, "a.gz", &bgzf_input(random_payloads(75, 8, 4000), 6, true).bytes);
    let second = write_input(&dir, "b.gz", &bgzf_input(random_payloads(76, 3, 4000), 1, true).bytes);

    let output = blockpipe(&["check", "-i", path_str(&first), path_str(&second), "--threads", "2"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn test_check_rejects_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let mut input = bgzf_input(random_payloads(77, 8, 4000), 6, true);
    input.corrupt_crc(2);
    let path = write_input(&dir, "bad.gz", &input.bytes);

    let output = blockpipe(&["check", "-i", path_str(&path)]);
    assert!(!output.status.success());
}

#[test]
fn test_check_require_eof() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, "no_eof.gz", &bgzf_input(random_payloads(78, 4, 1000), 6, false).bytes);

    let lenient = blockpipe(&["check", "-i", path_str(&path)]);
    assert!(lenient.status.success(), "stderr: {}", String::from_utf8_lossy(&lenient.stderr));

    let strict = blockpipe(&["check", "-i", path_str(&path), "--require-eof"]);
    assert!(!strict.status.success());
}
