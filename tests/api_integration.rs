//! Integration tests for the status API.
//!
//! Each test assembles the app against a temporary database, serves the
//! status routes on a random port, and exercises them with reqwest.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use content_pipeline::api::status_routes;
use content_pipeline::app::App;
use content_pipeline::config::AppConfig;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn config(db: &std::path::Path, extra: &[(&str, &str)]) -> AppConfig {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert("PIPELINE_DB_PATH".into(), db.display().to_string());
    map.insert("PIPELINE_SERVICE_URL".into(), "http://127.0.0.1:9".into());
    for (k, v) in extra {
        map.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
}

/// Start the status server on a random port, return (port, app).
async fn start_server(config: AppConfig) -> (u16, App) {
    let mut app = App::build(config).await.unwrap();
    app.start().unwrap();

    let router = status_routes(app.api_state());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, app)
}

async fn get_json(port: u16, path: &str) -> Value {
    let resp = reqwest::get(format!("http://127.0.0.1:{port}{path}"))
        .await
        .expect("request failed");
    assert!(resp.status().is_success(), "status {}", resp.status());
    resp.json().await.expect("invalid JSON from server")
}

#[tokio::test]
async fn health_reports_ok() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let (port, app) = start_server(config(&dir.path().join("p.db"), &[])).await;

        let body = get_json(port, "/health").await;
        assert_eq!(body["status"], "ok");

        app.stop();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn status_lists_enabled_lanes_and_scheduler() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let (port, app) = start_server(config(
            &dir.path().join("p.db"),
            &[("ENABLE_LANE_AUTHOR", "true")],
        ))
        .await;

        let body = get_json(port, "/api/status").await;

        let lanes: Vec<&str> = body["lanes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert_eq!(lanes, vec!["evaluate", "comments", "analyze", "author"]);
        assert_eq!(body["lanes"][0]["busy"], false);

        let scheduler = &body["scheduler"];
        assert_eq!(scheduler["name"], "discovery");
        assert_eq!(scheduler["schedule"], "*/5 * * * *");
        assert_eq!(scheduler["runs_total"], 0);
        assert_eq!(scheduler["coalesced_total"], 0);

        app.stop();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn disabled_components_report_null() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let (port, app) = start_server(config(
            &dir.path().join("p.db"),
            &[("ENABLE_WORKER", "false"), ("ENABLE_SCHEDULER", "off")],
        ))
        .await;

        let body = get_json(port, "/api/status").await;
        assert!(body["lanes"].is_null());
        assert!(body["scheduler"].is_null());

        app.stop();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_route_is_404() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let (port, app) = start_server(config(
            &dir.path().join("p.db"),
            &[("ENABLE_WORKER", "0"), ("ENABLE_SCHEDULER", "0")],
        ))
        .await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/api/nope"))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        app.stop();
    })
    .await
    .expect("test timed out");
}
