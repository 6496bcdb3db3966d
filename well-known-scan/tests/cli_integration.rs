// well-known-scan/tests/cli_integration.rs

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

const DOC_PATH: &str = "/.well-known/ai-plugin.json";

const PLUGIN_BODY: &str = r#"{
    "schema_version": "v1",
    "name_for_model": "todo",
    "description_for_model": "Manage a todo list.",
    "api": {"type": "openapi", "url": "https://a.test/openapi.yaml"}
}"#;

/// Helper to create a candidate list in rank,domain form
fn create_candidates_file(domains: &[&str]) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let content: Vec<String> = domains
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{},{}", i + 1, d))
        .collect();
    fs::write(file.path(), content.join("\n")).expect("Failed to write to temp file");
    file
}

/// A command isolated from the user's config files and environment
fn scan_cmd(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("well-known-scan").unwrap();
    cmd.current_dir(workdir)
        .env("HOME", workdir)
        .env("XDG_CONFIG_HOME", workdir.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("WKS_CONFIG")
        .env_remove("WKS_CONCURRENCY")
        .env_remove("WKS_TIMEOUT")
        .env_remove("WKS_MAX_ATTEMPTS")
        .env_remove("WKS_LIMIT")
        .env_remove("WKS_RESULTS_PATH")
        .env_remove("WKS_CACHE_PATH")
        .env_remove("WKS_URL_TEMPLATE");
    cmd
}

fn template_for(server: &mockito::Server) -> String {
    format!("{}/{{domain}}{}", server.url(), DOC_PATH)
}

#[test]
fn test_help_lists_flags() {
    let mut cmd = Command::cargo_bin("well-known-scan").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--concurrency"))
        .stdout(predicate::str::contains("--url-template"))
        .stdout(predicate::str::contains("--no-cache-transient"))
        .stdout(predicate::str::contains("--results"))
        .stdout(predicate::str::contains("--cache"));
}

#[test]
fn test_missing_input_argument() {
    let mut cmd = Command::cargo_bin("well-known-scan").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_unreadable_input_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    scan_cmd(dir.path())
        .arg("does-not-exist.csv")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("does-not-exist.csv"));
}

#[test]
fn test_empty_input_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.csv");
    fs::write(&input, "").unwrap();

    scan_cmd(dir.path())
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No candidate domains found"));
}

#[test]
fn test_invalid_concurrency_rejected() {
    let dir = TempDir::new().unwrap();
    let input = create_candidates_file(&["a.test"]);

    scan_cmd(dir.path())
        .arg(input.path())
        .args(["-c", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Concurrency must be between"));
}

#[test]
fn test_end_to_end_scan_and_resume() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();

    let found = server
        .mock("GET", "/a.test/.well-known/ai-plugin.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(PLUGIN_BODY)
        .expect(1)
        .create();
    let missing = server
        .mock("GET", "/b.test/.well-known/ai-plugin.json")
        .with_status(404)
        .expect(1)
        .create();

    let input = create_candidates_file(&["a.test", "b.test"]);
    let results = dir.path().join("plugins.json");
    let cache = dir.path().join("cache.json");
    let template = template_for(&server);

    for _ in 0..2 {
        scan_cmd(dir.path())
            .arg(input.path())
            .args(["--url-template", &template, "--quiet"])
            .arg("--results")
            .arg(&results)
            .arg("--cache")
            .arg(&cache)
            .assert()
            .success()
            .stdout(predicate::str::contains("found 1 plugins"));
    }

    // The second run is answered entirely from the cache
    found.assert();
    missing.assert();

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
    assert_eq!(written["a.test"]["name_for_model"], "todo");
    assert!(written.get("b.test").is_none());

    let cached: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cache).unwrap()).unwrap();
    assert_eq!(cached["b.test"]["status"], "not_found");
    assert_eq!(cached["a.test"]["status"], "found");
}

#[test]
fn test_limit_flag_truncates_candidates() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();

    let first = server
        .mock("GET", "/a.test/.well-known/ai-plugin.json")
        .with_status(404)
        .expect(1)
        .create();
    let second = server
        .mock("GET", "/b.test/.well-known/ai-plugin.json")
        .with_status(404)
        .expect(0)
        .create();

    let input = create_candidates_file(&["a.test", "b.test"]);

    scan_cmd(dir.path())
        .arg(input.path())
        .args(["--url-template", &template_for(&server), "--limit", "1", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("found 0 plugins"));

    first.assert();
    second.assert();
    // Default output paths land in the working directory
    assert!(dir.path().join("ai-plugins.json").exists());
    assert!(dir
        .path()
        .join("well-known-ai-plugins-by-domain.cache.json")
        .exists());
}

#[test]
fn test_config_file_integration() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();

    let found = server
        .mock("GET", "/a.test/.well-known/ai-plugin.json")
        .with_status(200)
        .with_body(PLUGIN_BODY)
        .create();

    let config_path = dir.path().join("scan.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[scan]
concurrency = 4
url_template = "{}"

[paths]
results = "from-config.json"
"#,
            template_for(&server)
        ),
    )
    .unwrap();

    let input = create_candidates_file(&["a.test"]);

    scan_cmd(dir.path())
        .arg(input.path())
        .arg("--config")
        .arg(&config_path)
        .arg("-q")
        .assert()
        .success()
        .stdout(predicate::str::contains("found 1 plugins"));

    found.assert();
    assert!(dir.path().join("from-config.json").exists());
}

#[test]
fn test_local_config_discovery() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();

    let found = server
        .mock("GET", "/a.test/.well-known/ai-plugin.json")
        .with_status(200)
        .with_body(PLUGIN_BODY)
        .create();

    fs::write(
        dir.path().join("well-known-scan.toml"),
        format!("[scan]\nurl_template = \"{}\"\n", template_for(&server)),
    )
    .unwrap();

    let input = create_candidates_file(&["a.test"]);

    scan_cmd(dir.path())
        .arg(input.path())
        .arg("-q")
        .assert()
        .success()
        .stdout(predicate::str::contains("found 1 plugins"));

    found.assert();
}

#[test]
fn test_precedence_cli_over_env() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();

    let _found = server
        .mock("GET", "/a.test/.well-known/ai-plugin.json")
        .with_status(200)
        .with_body(PLUGIN_BODY)
        .create();

    let input = create_candidates_file(&["a.test"]);

    scan_cmd(dir.path())
        .env("WKS_URL_TEMPLATE", template_for(&server))
        .env("WKS_RESULTS_PATH", "env.json")
        .arg(input.path())
        .args(["--results", "cli.json", "-q"])
        .assert()
        .success();

    assert!(dir.path().join("cli.json").exists());
    assert!(!dir.path().join("env.json").exists());
}

#[test]
fn test_broken_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "[scan]\nconcurrency = 0\n").unwrap();
    let input = create_candidates_file(&["a.test"]);

    scan_cmd(dir.path())
        .arg(input.path())
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}
