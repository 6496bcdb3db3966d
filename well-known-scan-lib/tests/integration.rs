//! End-to-end runs of the scanner against a local HTTP server.

use mockito::{Matcher, Server};
use std::time::Duration;
use tempfile::TempDir;
use well_known_scan_lib::{CacheStore, Outcome, ScanConfig, ScanError, Scanner};

const DOC_PATH: &str = "/.well-known/ai-plugin.json";

fn plugin_body(name: &str) -> String {
    serde_json::json!({
        "schema_version": "v1",
        "name_for_model": name,
        "description_for_model": format!("Plugin {name}"),
        "auth": {"type": "none"},
        "api": {"type": "openapi", "url": format!("https://{name}/openapi.yaml")}
    })
    .to_string()
}

fn doc_path(key: &str) -> String {
    format!("/{}{}", key, DOC_PATH)
}

fn config_for(server: &Server, dir: &TempDir) -> ScanConfig {
    ScanConfig::default()
        .with_url_template(format!("{}/{{domain}}{}", server.url(), DOC_PATH))
        .with_results_path(dir.path().join("ai-plugins.json"))
        .with_cache_path(dir.path().join("cache.json"))
        .with_attempt_timeout(Duration::from_secs(2))
        .with_retry_backoff(Duration::ZERO)
        .with_concurrency(4)
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_found_missing_and_failing_domains() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    let found = server
        .mock("GET", doc_path("a.com").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(plugin_body("a.com"))
        .expect(1)
        .create_async()
        .await;
    let missing = server
        .mock("GET", doc_path("b.com").as_str())
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let failing = server
        .mock("GET", doc_path("c.com").as_str())
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let config = config_for(&server, &dir);
    let input = keys(&["a.com", "b.com", "c.com"]);

    let report = Scanner::new(config.clone())
        .unwrap()
        .run(&input)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results["a.com"]["name_for_model"], "a.com");
    assert_eq!(report.summary.completed, 3);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.cache_entries, 3);

    found.assert_async().await;
    missing.assert_async().await;
    failing.assert_async().await;

    // Warm re-run never touches the network
    let rerun = Scanner::new(config.clone())
        .unwrap()
        .run(&input)
        .await
        .unwrap();
    assert_eq!(rerun.probes, 0);
    assert_eq!(rerun.cache_hits, 3);
    assert_eq!(rerun.results, report.results);

    found.assert_async().await;
    missing.assert_async().await;
    failing.assert_async().await;

    let cache = CacheStore::load(config.cache_path.clone()).await;
    assert_eq!(cache.get("b.com"), Some(Outcome::NotFound));
    assert_eq!(cache.get("c.com"), Some(Outcome::NotFound));
}

#[tokio::test]
async fn test_invalid_documents_are_negative() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    let bodies = [
        ("html.com", "<html>hello</html>".to_string()),
        ("array.com", "[1, 2, 3]".to_string()),
        (
            "no-api.com",
            r#"{"description_for_model": "d"}"#.to_string(),
        ),
        (
            "marker.com",
            r#"{"status": "404", "description_for_model": "d", "api": {}}"#.to_string(),
        ),
    ];
    for (key, body) in &bodies {
        server
            .mock("GET", doc_path(key).as_str())
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
    }

    let input: Vec<String> = bodies.iter().map(|(k, _)| k.to_string()).collect();
    let report = Scanner::new(config_for(&server, &dir))
        .unwrap()
        .run(&input)
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.cache_entries, 4);
}

#[tokio::test]
async fn test_transient_failures_retried_when_not_cached() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    let flaky = server
        .mock("GET", doc_path("flaky.com").as_str())
        .with_status(500)
        .expect(4)
        .create_async()
        .await;

    let config = config_for(&server, &dir)
        .with_max_attempts(2)
        .with_cache_transient_failures(false);
    let input = keys(&["flaky.com"]);

    for _ in 0..2 {
        let report = Scanner::new(config.clone())
            .unwrap()
            .run(&input)
            .await
            .unwrap();
        assert_eq!(report.probes, 1);
        assert_eq!(report.cache_entries, 0);
    }

    flaky.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_not_found() {
    let dir = TempDir::new().unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ScanConfig::default()
        .with_url_template(format!("http://127.0.0.1:{}/{{domain}}{}", port, DOC_PATH))
        .with_results_path(dir.path().join("ai-plugins.json"))
        .with_cache_path(dir.path().join("cache.json"))
        .with_retry_backoff(Duration::ZERO);

    let report = Scanner::new(config)
        .unwrap()
        .run(&keys(&["down.com"]))
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.cache_entries, 1);
}

#[tokio::test]
async fn test_results_are_pretty_printed_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    server
        .mock("GET", Matcher::Regex(r"^/plugin-\d+\.com/".to_string()))
        .with_status(200)
        .with_body(plugin_body("shared"))
        .create_async()
        .await;

    let config = config_for(&server, &dir);
    let input: Vec<String> = (0..5).map(|i| format!("plugin-{i}.com")).collect();
    Scanner::new(config.clone())
        .unwrap()
        .run(&input)
        .await
        .unwrap();

    let text = std::fs::read_to_string(&config.results_path).unwrap();
    assert!(text.contains("\n  \"plugin-0.com\": {"));

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value.as_object().unwrap().len(), 5);
}

#[tokio::test]
async fn test_unreadable_candidate_file() {
    let dir = TempDir::new().unwrap();
    let config = ScanConfig::default()
        .with_results_path(dir.path().join("r.json"))
        .with_cache_path(dir.path().join("c.json"));

    let err = Scanner::new(config)
        .unwrap()
        .run_file(dir.path().join("missing.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Input { .. }));
}
