#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn concord(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("concord").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("CONCORD_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("concord.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// concord init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    concord(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let data = std::fs::read_to_string(dir.path().join("concord.yaml")).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&data).unwrap();
    assert_eq!(value["server"]["port"].as_u64(), Some(8000));
    assert_eq!(value["requesting"]["base_path"].as_str(), Some("/api"));
}

#[test]
fn init_leaves_existing_config_alone() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "server:\n  port: 9001\n");

    concord(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    let data = std::fs::read_to_string(dir.path().join("concord.yaml")).unwrap();
    assert_eq!(data, "server:\n  port: 9001\n");
}

#[test]
fn init_honours_config_flag_and_json() {
    let dir = TempDir::new().unwrap();
    let output = concord(&dir)
        .args(["init", "--config", "conf/app.yaml", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["created"], true);
    assert!(dir.path().join("conf/app.yaml").exists());
}

// ---------------------------------------------------------------------------
// concord check
// ---------------------------------------------------------------------------

#[test]
fn check_passes_without_a_config_file() {
    let dir = TempDir::new().unwrap();
    concord(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn check_fails_on_config_errors() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "engine:\n  max_depth: 0\nrequesting:\n  passthrough: [\"not-a-path\"]\n",
    );

    concord(&dir)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] engine.max_depth"))
        .stdout(predicate::str::contains("not-a-path"))
        .stderr(predicate::str::contains("error: check found errors"));
}

#[test]
fn check_reports_warnings_as_json() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "requesting:\n  base_path: api\n");

    let output = concord(&dir).args(["check", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
    assert!(value["syncs"].as_u64().unwrap() > 0);
    assert!(value["rejected"].as_array().unwrap().is_empty());
}

#[test]
fn malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "engine: [oops\n");

    concord(&dir)
        .arg("syncs")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

// ---------------------------------------------------------------------------
// concord syncs / concepts
// ---------------------------------------------------------------------------

#[test]
fn syncs_lists_routes_and_workflows() {
    let dir = TempDir::new().unwrap();
    concord(&dir)
        .arg("syncs")
        .assert()
        .success()
        .stdout(predicate::str::contains("ListCreationNewListRequest"))
        .stdout(predicate::str::contains("NotifyOwnerOnNewList"))
        .stdout(predicate::str::contains("Requesting.respond"));
}

#[test]
fn syncs_json_names_each_rule_once() {
    let dir = TempDir::new().unwrap();
    let output = concord(&dir).args(["syncs", "-j"]).output().unwrap();
    assert!(output.status.success());

    let rows: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    let mut names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), total);

    let notify = rows
        .iter()
        .find(|r| r["name"] == "NotifyOwnerOnNewList")
        .unwrap();
    assert_eq!(notify["then"], serde_json::json!(["Notifying.notify"]));
}

#[test]
fn concepts_lists_actions_and_queries() {
    let dir = TempDir::new().unwrap();
    concord(&dir)
        .arg("concepts")
        .assert()
        .success()
        .stdout(predicate::str::contains("ListCreation"))
        .stdout(predicate::str::contains("_getNotifications"))
        .stdout(predicate::str::contains("query"));
}

#[test]
fn concepts_json_hides_the_await_query() {
    let dir = TempDir::new().unwrap();
    let output = concord(&dir).args(["concepts", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let requesting = value["concepts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["concept"] == "Requesting")
        .unwrap();
    let actions: Vec<&str> = requesting["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["request", "respond"]);
}

// ---------------------------------------------------------------------------
// concord serve
// ---------------------------------------------------------------------------

#[test]
fn serve_refuses_an_invalid_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "requesting:\n  timeout_ms: 0\n");

    concord(&dir)
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
