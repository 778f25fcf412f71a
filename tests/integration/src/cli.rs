//! Integration tests for the fedmgr-server command line.

use crate::helpers::run_server;

#[test]
fn config_template_prints_defaults() {
    let output = run_server(&["--config-template"]);
    assert!(output.status.success(), "exit code: {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cluster_name"), "got: {stdout}");
    assert!(stdout.contains("[federation]"), "got: {stdout}");
    assert!(stdout.contains("ping_interval_secs = 5"), "got: {stdout}");
}

#[test]
fn missing_cluster_name_is_rejected() {
    let output = run_server(&["--port", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cluster-name"), "got: {stderr}");
}

#[test]
fn auth_pass_and_file_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("auth");
    std::fs::write(&file, "secret\n").unwrap();
    let output = run_server(&[
        "--cluster-name",
        "alpha",
        "--auth-pass",
        "secret",
        "--auth-pass-file",
        file.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mutually exclusive"), "got: {stderr}");
}

#[test]
fn unreadable_definitions_file_is_rejected() {
    let output = run_server(&[
        "--cluster-name",
        "alpha",
        "--federations-file",
        "/nonexistent/federations.toml",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("federations file"), "got: {stderr}");
}
