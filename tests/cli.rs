//! End-to-end runs of the `minimalloc` binary.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::{NamedTempFile, TempDir};

const EXAMPLE_CSV: &str = "id,lower,upper,size\nb1,0,3,4\nb2,3,9,4\nb3,0,9,4\nb4,9,21,4\nb5,0,21,4\n";

fn write_input(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file.flush().unwrap();
    file
}

fn run_minimalloc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minimalloc"))
        .args(args)
        .output()
        .expect("failed to run minimalloc")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_success() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "12",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Elapsed time:"));
    assert!(output_path.exists());

    let written = std::fs::read_to_string(&output_path).unwrap();
    assert!(written.starts_with("id,lower,upper,size,offset\n"));
}

#[test]
fn test_validation_passes() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "12",
        "--validate",
    ]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("PASS"));
}

#[test]
fn test_invalid_csv() {
    let input = write_input("invalid_header1,invalid_header2\nvalue1,value2\n");
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "12",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
    assert!(!output_path.exists());
}

#[test]
fn test_insufficient_capacity() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "1",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
    assert!(!output_path.exists());
}

#[test]
fn test_missing_capacity_is_rejected() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
}

#[test]
fn test_minimize_capacity() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--minimize-capacity",
        "--validate",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Elapsed time:"));
    assert!(stderr(&output).contains("PASS"));
    assert!(output_path.exists());
}

#[test]
fn test_optimization_toggles_are_accepted() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "12",
        "--no-canonical-only",
        "--no-section-inference",
        "--no-dynamic-ordering",
        "--no-check-dominance",
        "--no-unallocated-floor",
        "--no-static-preordering",
        "--no-dynamic-decomposition",
        "--no-monotonic-floor",
        "--no-hatless-pruning",
        "--preordering-heuristics",
        "TWA,WAT",
        "--timeout",
        "30s",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output_path.exists());
}

#[test]
fn test_invalid_timeout_is_rejected() {
    let input = write_input(EXAMPLE_CSV);
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("output.csv");

    let output = run_minimalloc(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output_path.to_str().unwrap(),
        "--capacity",
        "12",
        "--timeout",
        "10parsecs",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
}
