// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::*;
use diskmon::config::AppConfig;
use diskmon::models::{DeltaCapture, DeltaRow, SessionData};
use diskmon::monitor::Monitor;
use diskmon::routes;
use diskmon::session;
use diskmon::worker::{self, CaptureState, Sampler, SamplerConfig};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Duration;

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[capture]
interval_secs = 60
fetch_timeout_secs = 2

[source]
server_name = "SQLTEST"
command = "file-stats"

[publishing]
broadcast_capacity = 10
"#;

struct TestApp {
    app: axum::Router,
    monitor: Arc<Monitor>,
    captures_tx: broadcast::Sender<Arc<DeltaCapture>>,
    export_dir: tempfile::TempDir,
    // dropping this would stop the sampler
    _shutdown_tx: oneshot::Sender<()>,
}

fn test_app(source: ScriptedSource) -> TestApp {
    let mut config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let export_dir = tempfile::TempDir::new().unwrap();
    config.session.export_dir = export_dir.path().to_string_lossy().into_owned();
    let monitor = Arc::new(Monitor::new(
        config.capture.retention_cap,
        config.source.server_name.clone(),
        config.capture.interval_secs,
    ));
    let (captures_tx, _) = broadcast::channel(config.publishing.broadcast_capacity);
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let source = Arc::new(source);
    let sampler = Sampler::new(
        source.clone(),
        monitor.clone(),
        captures_tx.clone(),
        Duration::from_secs(config.capture.fetch_timeout_secs),
    );
    worker::spawn(
        sampler,
        SamplerConfig {
            interval_secs: config.capture.interval_secs,
            stats_log_interval_secs: 3600,
        },
        commands_rx,
        shutdown_rx,
    );
    let app = routes::app(
        monitor.clone(),
        commands_tx,
        captures_tx.clone(),
        source,
        config,
    );
    TestApp {
        app,
        monitor,
        captures_tx,
        export_dir,
        _shutdown_tx: shutdown_tx,
    }
}

fn seeded_app() -> (TestServer, TestApp) {
    let t = test_app(ScriptedSource::default());
    t.monitor.append(capture(
        0,
        vec![
            DeltaRow {
                read_iops: 4.0,
                ..delta_row("db1", 1, "C")
            },
            delta_row("db1", 2, "D"),
            delta_row("db2", 1, "D"),
        ],
    ));
    t.monitor.append(capture(60, vec![delta_row("db1", 1, "C")]));
    let server = TestServer::new(t.app.clone()).unwrap();
    (server, t)
}

async fn wait_for(monitor: &Monitor, done: impl Fn(&Monitor) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !done(monitor) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for sampler"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_root_endpoint() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("diskmon: database file I/O monitor");
}

#[tokio::test]
async fn test_version_endpoint() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("diskmon"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_status_and_intervals() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();

    let status: serde_json::Value = server.get("/api/status").await.json();
    assert_eq!(status["state"], "Idle");
    assert_eq!(status["server"], "SQLTEST");
    assert_eq!(status["intervalSeconds"], 60);

    let intervals: serde_json::Value = server.get("/api/intervals").await.json();
    let steps = intervals.as_array().unwrap();
    assert_eq!(steps.len(), 9);
    assert_eq!(steps[0]["seconds"], 1);
    assert_eq!(steps[8]["label"], "5 min");
}

#[tokio::test]
async fn test_series_with_grouping_and_hidden_keys() {
    let (server, _t) = seeded_app();
    let response = server
        .get("/api/series")
        .add_query_param("groupBy", "File")
        .add_query_param("hidden", "db1:2,db2:1")
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["groupBy"], "File");
    assert_eq!(json["groups"].as_array().unwrap().len(), 3);
    assert_eq!(json["groups"][1]["hidden"], true);
    let read_iops = &json["series"][2];
    assert_eq!(read_iops["metric"], "readIops");
    let groups = read_iops["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["key"], "db1:1");
    assert_eq!(groups[0]["points"][0]["y"], 4.0);
    assert_eq!(json["axis"]["xMax"], 60.0);
    assert!(json["groups"][0]["color"].as_str().unwrap().starts_with('#'));
}

#[tokio::test]
async fn test_series_with_filters() {
    let (server, _t) = seeded_app();
    let json: serde_json::Value = server
        .get("/api/series")
        .add_query_param("drive", "D")
        .add_query_param("database", "(All)")
        .await
        .json();
    let keys: Vec<&str> = json["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["db1", "db2"]);
}

#[tokio::test]
async fn test_filters_endpoint() {
    let (server, _t) = seeded_app();
    let json: serde_json::Value = server.get("/api/filters").await.json();
    assert_eq!(json["drives"], serde_json::json!(["C", "D"]));
    assert_eq!(json["databases"], serde_json::json!(["db1", "db2"]));
}

#[tokio::test]
async fn test_export_csv_endpoint() {
    let (server, _t) = seeded_app();
    let response = server.get("/api/export.csv").await;
    response.assert_status_ok();
    let content_type = response.header("content-type");
    assert!(content_type.to_str().unwrap().starts_with("text/csv"));
    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Timestamp,Database,FileId"));
    assert_eq!(lines.len(), 5);
}

#[tokio::test]
async fn test_session_endpoint_empty_then_populated() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    server
        .get("/api/session")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    t.monitor.append(capture(0, vec![delta_row("db1", 1, "C")]));
    let session: SessionData = server.get("/api/session").await.json();
    assert_eq!(session.server, "SQLTEST");
    assert_eq!(session.captures.len(), 1);
}

#[tokio::test]
async fn test_save_session_to_given_path() {
    let (server, t) = seeded_app();
    let response = server
        .post("/api/session/save")
        .json(&serde_json::json!({ "path": "nightly/saved.json" }))
        .await;
    response.assert_status_ok();
    let path = t.export_dir.path().join("nightly").join("saved.json");
    let json: serde_json::Value = response.json();
    assert_eq!(json["path"], path.display().to_string());
    let loaded = session::load(&path).await.unwrap();
    assert_eq!(loaded.captures.len(), 2);
}

#[tokio::test]
async fn test_save_session_outside_export_dir_is_rejected() {
    let (server, t) = seeded_app();
    let outside = tempfile::TempDir::new().unwrap();
    let absolute = outside.path().join("stolen.json");
    for path in [
        absolute.to_str().unwrap(),
        "../stolen.json",
        "nightly/../../stolen.json",
    ] {
        server
            .post("/api/session/save")
            .json(&serde_json::json!({ "path": path }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
    assert!(!absolute.exists());
    assert!(!t.export_dir.path().parent().unwrap().join("stolen.json").exists());
}

#[tokio::test]
async fn test_load_session_outside_export_dir_is_rejected() {
    let (server, t) = seeded_app();
    let outside = tempfile::TempDir::new().unwrap();
    let absolute = outside.path().join("archive.json");
    let archived = SessionData::new("intruder", at(0), 30, vec![capture(30, vec![])]);
    session::save(&absolute, &archived).await.unwrap();

    for path in [absolute.to_str().unwrap(), "../archive.json"] {
        let response = server
            .post("/api/session/load")
            .json(&serde_json::json!({ "path": path }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let json: serde_json::Value = response.json();
        assert!(json["error"].as_str().unwrap().contains("export directory"));
    }
    assert_eq!(t.monitor.status().server, "SQLTEST");
    assert_eq!(t.monitor.len(), 2);
}

#[tokio::test]
async fn test_save_session_without_captures_conflicts() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    server
        .post("/api/session/save")
        .json(&serde_json::json!({}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_load_session_errors_leave_history_untouched() {
    let (server, t) = seeded_app();
    let dir = t.export_dir.path();

    server
        .post("/api/session/load")
        .json(&serde_json::json!({ "path": "missing.json" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let garbage = dir.join("garbage.json");
    std::fs::write(&garbage, b"{ not json").unwrap();
    server
        .post("/api/session/load")
        .json(&serde_json::json!({ "path": "garbage.json" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let valid = dir.join("valid.json");
    let archived = SessionData::new("old", at(0), 30, vec![capture(30, vec![])]);
    session::save(&valid, &archived).await.unwrap();
    let far_future = (at(0) + chrono::Duration::days(1)).to_rfc3339();
    server
        .post("/api/session/load")
        .json(&serde_json::json!({ "path": "valid.json", "from": far_future }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    server
        .post("/api/session/load")
        .json(&serde_json::json!({ "path": "valid.json", "to": "yesterday" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(t.monitor.len(), 2);
    assert_eq!(t.monitor.status().server, "SQLTEST");
}

#[tokio::test]
async fn test_load_session_with_range_replaces_history() {
    let (server, t) = seeded_app();
    let path = t.export_dir.path().join("archive.json");
    let archived = SessionData::new(
        "archived",
        at(0),
        30,
        vec![
            capture(30, vec![delta_row("old", 1, "C")]),
            capture(60, vec![delta_row("old", 1, "C")]),
            capture(90, vec![delta_row("old", 1, "C")]),
        ],
    );
    session::save(&path, &archived).await.unwrap();

    let response = server
        .post("/api/session/load")
        .json(&serde_json::json!({
            "path": "archive.json",
            "from": at(60).to_rfc3339(),
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["captures"], 2);

    wait_for(&t.monitor, |m| m.status().server == "archived").await;
    assert_eq!(t.monitor.len(), 2);
    assert_eq!(t.monitor.history()[0].timestamp, at(60));
    assert_eq!(t.monitor.status().interval_seconds, 30);
}

#[tokio::test]
async fn test_capture_commands_drive_sampler() {
    let source = ScriptedSource::new(vec![Ok(vec![file_row(1, "db1", 1, "C")])]);
    let t = test_app(source);
    let server = TestServer::new(t.app.clone()).unwrap();

    server
        .post("/api/capture/start")
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for(&t.monitor, |m| m.status().state == CaptureState::Baseline).await;

    server
        .post("/api/capture/interval")
        .json(&serde_json::json!({ "seconds": 5 }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for(&t.monitor, |m| m.status().interval_seconds == 5).await;

    server
        .post("/api/capture/stop")
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for(&t.monitor, |m| m.status().state == CaptureState::Stopped).await;

    server
        .post("/api/capture/clear")
        .await
        .assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    server
        .post("/api/capture/interval")
        .json(&serde_json::json!({ "seconds": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_commands_unavailable_when_sampler_gone() {
    let TestApp {
        app,
        _shutdown_tx: shutdown_tx,
        ..
    } = test_app(ScriptedSource::default());
    let _ = shutdown_tx.send(());
    let server = TestServer::new(app).unwrap();
    // the sampler drops its receiver once it sees the shutdown
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let response = server.post("/api/capture/start").await;
        if response.status_code() == StatusCode::SERVICE_UNAVAILABLE {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "sampler never stopped");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_diagnostic_endpoint() {
    let source = ScriptedSource::new(vec![
        Ok(vec![counters(file_row(1, "db1", 1, "C"), 10, 0)]),
        Ok(vec![counters(file_row(1, "db1", 1, "C"), 25, 0)]),
    ]);
    let t = test_app(source);
    let server = TestServer::new(t.app.clone()).unwrap();
    let response = server.get("/api/diagnostic").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["server"], "SQLTEST");
    assert_eq!(json["filesWithIo"], 1);
    assert_eq!(json["rows"][0]["deltaReads"], 15);
    assert!(t.monitor.is_empty());
}

#[tokio::test]
async fn test_diagnostic_text_dump_is_named() {
    let source = ScriptedSource::new(vec![
        Ok(vec![counters(file_row(1, "db1", 1, "C"), 10, 0)]),
        Ok(vec![counters(file_row(1, "db1", 1, "C"), 10, 0)]),
    ]);
    let t = test_app(source);
    let server = TestServer::new(t.app.clone()).unwrap();
    let response = server.get("/api/diagnostic").add_query_param("format", "text").await;
    response.assert_status_ok();
    let disposition = response.header("content-disposition");
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("inline; filename=\"DiskMonitorDiag_"));
    assert!(disposition.ends_with(".txt\""));
    assert!(response.text().contains("Server: SQLTEST"));
    assert!(response.text().contains("No physical IO"));
}

#[tokio::test]
async fn test_diagnostic_fetch_failure_is_bad_gateway() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::new(t.app.clone()).unwrap();
    server
        .get("/api/diagnostic")
        .await
        .assert_status(StatusCode::BAD_GATEWAY);
}

// --- WebSocket message tests (require http_transport + ws feature) ---
// Receive until we get the wanted message type (server may send Ping first).

async fn receive_message_of_type(
    ws: &mut axum_test::TestWebSocket,
    kind: &str,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text)
            && v["type"] == kind
        {
            return v;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {kind} message"
        );
    }
}

#[tokio::test]
async fn test_ws_captures_sends_welcome_then_broadcasts() {
    let t = test_app(ScriptedSource::default());
    let server = TestServer::builder()
        .http_transport()
        .build(t.app.clone())
        .unwrap();
    let mut ws = server
        .get_websocket("/ws/captures")
        .await
        .into_websocket()
        .await;

    let welcome = receive_message_of_type(&mut ws, "info").await;
    assert_eq!(welcome["status"]["server"], "SQLTEST");
    assert_eq!(t.monitor.ws_client_count(), 1);

    let pushed = Arc::new(capture(42, vec![delta_row("db1", 7, "E")]));
    let tx = t.captures_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(pushed);
    });
    let message = receive_message_of_type(&mut ws, "capture").await;
    assert_eq!(message["capture"]["rows"][0]["fileId"], 7);
    assert_eq!(message["capture"]["rows"][0]["drive"], "E");
}
