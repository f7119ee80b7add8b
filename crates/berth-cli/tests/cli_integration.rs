//! CLI subprocess integration tests.
//!
//! These tests invoke the `berth` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output stability.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn berth_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_berth"));
    // No DBaaS config is found under this home; probing stays disabled.
    cmd.env("HOME", "/nonexistent/berth-home");
    cmd.env_remove("BERTH_LOG");
    cmd
}

fn write_input(dir: &Path, doc: &Value) -> PathBuf {
    let path = dir.join("berth.json");
    std::fs::write(&path, doc.to_string()).unwrap();
    path
}

fn example_input() -> Value {
    json!({
        "environment": {
            "project": "example-project",
            "environment": "main",
            "branch": "main"
        },
        "compose": [
            {"name": "node", "labels": {"lagoon.type": "node"}, "image": "uselagoon/node-20"},
            {"name": "mariadb", "labels": {"lagoon.type": "mariadb"}, "image": "uselagoon/mariadb"}
        ],
        "manifest": {"environments": {"main": {
            "routes": [{"service": "node", "routes": [
                "example.com",
                {"domain": "wild.example.com", "wildcard": true}
            ]}]
        }}}
    })
}

fn run(input: &Path, args: &[&str]) -> Output {
    berth_bin()
        .arg("--input")
        .arg(input)
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON: {e}\nstdout: {stdout}"))
}

#[test]
fn cli_version_exits_zero() {
    let output = berth_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "berth --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("berth"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = berth_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("resolve"));
    assert!(stdout.contains("identify"));
}

#[test]
fn cli_identify_ingress_prints_route_set() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(&input, &["identify", "ingress"]);
    assert!(
        output.status.success(),
        "identify ingress must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        stdout_json(&output),
        json!({
            "primary": "https://example.com",
            "secondary": [
                "https://node-example-project-main.example.com",
                "https://example.com",
                "https://wild.example.com"
            ],
            "autogenerated": ["https://node-example-project-main.example.com"]
        })
    );
}

#[test]
fn cli_identify_created_ingress_prints_names() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(&input, &["identify", "created-ingress"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        r#"{"primary":"","secondary":["example.com","wildcard-wild.example.com"],"autogenerated":["node"]}"#
    );
}

#[test]
fn cli_identify_services_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(&input, &["--json", "identify", "services"]);
    assert!(output.status.success());
    let parsed = stdout_json(&output);
    assert_eq!(parsed["services"], json!(["node", "mariadb"]));
    assert_eq!(parsed["service_types"][1]["type"], "mariadb-single");
}

#[test]
fn cli_resolve_json_model() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(&input, &["--json", "resolve"]);
    assert!(
        output.status.success(),
        "resolve must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let model = stdout_json(&output);
    assert_eq!(model["namespace"], "example-project-main");
    assert_eq!(model["services"].as_array().unwrap().len(), 2);
    assert_eq!(model["services"][1]["is_dbaas"], false);
    assert_eq!(model["routes"]["route_set"]["primary"], "https://example.com");
}

#[test]
fn cli_resolve_human_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(&input, &["resolve"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("example-project-main"));
    assert!(stdout.contains("mariadb-single"));
    assert!(stdout.contains("pull uselagoon/node-20"));
}

#[test]
fn cli_toml_input_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("berth.toml");
    std::fs::write(
        &path,
        r#"
[environment]
project = "example-project"
environment = "main"
branch = "main"

[[compose]]
name = "node"
image = "uselagoon/node-20"
labels = { "lagoon.type" = "node" }
"#,
    )
    .unwrap();

    let output = run(&path, &["identify", "ingress"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        stdout_json(&output)["primary"],
        "https://node-example-project-main.example.com"
    );
}

#[test]
fn cli_missing_input_exits_with_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&dir.path().join("absent.json"), &["resolve"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: input error:"), "stderr: {stderr}");
}

#[test]
fn cli_missing_type_exits_with_resolution_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = example_input();
    doc["compose"][0]["labels"] = json!({});
    let input = write_input(dir.path(), &doc);

    let output = run(&input, &["resolve"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'node'"), "stderr must name the service: {stderr}");
    assert!(output.stdout.is_empty(), "no partial output on failure");
}

#[test]
fn cli_fastly_flags_reach_declared_routes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(
        &input,
        &[
            "--json",
            "--fastly-service-id",
            "cli-service",
            "resolve",
        ],
    );
    assert!(output.status.success());
    let model = stdout_json(&output);
    let declared = &model["routes"]["declared"][0];
    assert_eq!(declared["fastly"]["service_id"], "cli-service");
    assert_eq!(declared["fastly"]["watch"], true);
}

#[test]
fn cli_unreachable_dbaas_endpoint_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &example_input());

    let output = run(
        &input,
        &[
            "--json",
            "--dbaas-endpoint",
            "http://127.0.0.1:1",
            "identify",
            "services",
        ],
    );
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output)["service_types"][1]["type"],
        "mariadb-single"
    );
}

#[test]
fn cli_completions_bash() {
    let output = berth_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("berth"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("man");
    let output = berth_bin()
        .args(["man-pages", &out.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(out.join("berth.1").exists());
    assert!(out.join("berth-resolve.1").exists());
}
