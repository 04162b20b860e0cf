use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn marker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_marker"))
}

fn setup_images(files: &[&str]) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let images = tmp.path().join("images");
    fs::create_dir_all(&images).unwrap();
    for f in files {
        fs::write(images.join(f), b"fake image bytes").unwrap();
    }
    (tmp, images)
}

fn run_marker(args: &[&str]) -> Output {
    let binary = marker_binary();
    Command::new(&binary)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run marker binary at {:?}: {}", binary, e))
}

fn run_marker_without_rust_log(args: &[&str]) -> Output {
    Command::new(marker_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_missing_image_dir_argument_prints_usage() {
    let output = run_marker(&[]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr_of(&output).contains("Usage"),
        "expected usage, got: {}",
        stderr_of(&output)
    );
}

#[test]
fn test_nonexistent_image_dir_exits_with_status_3() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("does-not-exist");
    let output = run_marker(&[path_arg(&missing)]);
    assert_eq!(output.status.code(), Some(3), "stderr={}", stderr_of(&output));
    assert!(stderr_of(&output).contains("does not exist"));
}

#[test]
fn test_uncreatable_marked_dir_exits_with_status_4() {
    let (_tmp, images) = setup_images(&["a.png"]);
    fs::write(images.join("marked"), b"in the way").unwrap();

    let output = run_marker(&[path_arg(&images)]);
    assert_eq!(output.status.code(), Some(4), "stderr={}", stderr_of(&output));
}

#[test]
fn test_bind_failure_exits_with_status_5() {
    let (tmp, images) = setup_images(&["a.png"]);
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port().to_string();
    let output_file = tmp.path().join("samples.txt");

    let output = run_marker(&[
        "--host",
        "127.0.0.1",
        "--port",
        &port,
        "--outputFile",
        path_arg(&output_file),
        path_arg(&images),
    ]);
    assert_eq!(output.status.code(), Some(5), "stderr={}", stderr_of(&output));
    // startup still created the marked directory before binding
    assert!(images.join("marked").is_dir());
    drop(blocker);
}

#[test]
fn test_invalid_port_exits_with_config_status() {
    let (_tmp, images) = setup_images(&[]);
    let output = run_marker(&["--port", "0", path_arg(&images)]);
    assert_eq!(output.status.code(), Some(6), "stderr={}", stderr_of(&output));
}

#[test]
fn test_stats_reports_counts() {
    let (tmp, images) = setup_images(&["a.png", "b.png", "c.png"]);
    let output_file = tmp.path().join("labels/samples.txt");
    fs::create_dir_all(images.join("marked")).unwrap();
    fs::rename(images.join("c.png"), images.join("marked/c.png")).unwrap();
    fs::create_dir_all(output_file.parent().unwrap()).unwrap();
    fs::write(&output_file, "../images/marked/c.png 1 1 2 3 4\n").unwrap();

    let output = run_marker(&[
        "stats",
        path_arg(&images),
        "--outputFile",
        path_arg(&output_file),
    ]);
    assert!(output.status.success(), "stderr={}", stderr_of(&output));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Unlabeled:   2"), "got: {}", stdout);
    assert!(stdout.contains("Marked:      1 / 3"), "got: {}", stdout);
    assert!(stdout.contains("Records:     1"), "got: {}", stdout);
    assert!(stdout.contains("Boxes:       1"), "got: {}", stdout);
}

#[test]
fn test_reconcile_lists_then_applies() {
    let (tmp, images) = setup_images(&["stuck.png", "fresh.png"]);
    let output_file = tmp.path().join("samples.txt");
    fs::write(&output_file, "images/marked/stuck.png 0\n").unwrap();

    let output = run_marker(&[
        "reconcile",
        path_arg(&images),
        "--outputFile",
        path_arg(&output_file),
    ]);
    assert!(output.status.success(), "stderr={}", stderr_of(&output));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Not moved:    1"), "got: {}", stdout);
    assert!(stdout.contains("stuck.png"));
    assert!(!stdout.contains("fresh.png"));
    assert!(images.join("stuck.png").exists(), "listing must not move");

    let output = run_marker(&[
        "reconcile",
        path_arg(&images),
        "--outputFile",
        path_arg(&output_file),
        "--apply",
    ]);
    assert!(output.status.success(), "stderr={}", stderr_of(&output));
    assert!(stdout_of(&output).contains("Moved:        1"));
    assert!(images.join("marked/stuck.png").is_file());
    assert!(images.join("fresh.png").is_file());
    assert_eq!(
        fs::read_to_string(&output_file).unwrap(),
        "images/marked/stuck.png 0\n"
    );
}

#[test]
fn test_output_file_alias() {
    let (tmp, images) = setup_images(&[]);
    let output_file = tmp.path().join("alias.txt");
    let output = run_marker(&[
        "stats",
        path_arg(&images),
        "--output-file",
        path_arg(&output_file),
    ]);
    assert!(output.status.success(), "stderr={}", stderr_of(&output));
    assert!(stdout_of(&output).contains("alias.txt"));
}

#[test]
fn test_log_flag_sets_filter() {
    let (tmp, images) = setup_images(&["a.png", "my cat.png"]);
    let output_file = tmp.path().join("samples.txt");
    let base = [
        "stats",
        path_arg(&images),
        "--outputFile",
        path_arg(&output_file),
    ];

    let quiet = run_marker_without_rust_log(&base);
    assert!(quiet.status.success(), "stderr={}", stderr_of(&quiet));
    assert!(!stderr_of(&quiet).contains("skipping file that cannot be labeled"));

    let mut args = base.to_vec();
    args.extend(["--log", "debug"]);
    let verbose = run_marker_without_rust_log(&args);
    assert!(verbose.status.success(), "stderr={}", stderr_of(&verbose));
    assert!(
        stderr_of(&verbose).contains("skipping file that cannot be labeled"),
        "got: {}",
        stderr_of(&verbose)
    );
    assert!(stdout_of(&verbose).contains("Unlabeled:   1"));
}
