use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{HeaderValue, header};
use axum_test::TestServer;
use marketresearch_core::{CrewConfig, ResearchBackend};
use marketresearch_gui::config::AppConfig;
use marketresearch_gui::routes::build_router;
use marketresearch_gui::state::AppState;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::{Duration, sleep, timeout};

const ACME_REPORT: &str = "# Overview of Acme Robotics

## Market Landscape
Demand is rising per [Grand View Research](https://www.grandviewresearch.com/industry-analysis/robotics).

## Coverage
- [Reuters coverage](https://www.reuters.com/technology/acme)
";

struct FixedBackend;

#[async_trait]
impl ResearchBackend for FixedBackend {
    async fn research(&self, _query: &str) -> Result<String> {
        Ok(ACME_REPORT.to_string())
    }
}

/// Same company every time, body varies with the query.
struct EchoBackend;

#[async_trait]
impl ResearchBackend for EchoBackend {
    async fn research(&self, query: &str) -> Result<String> {
        Ok(format!(
            "# Overview of Acme Robotics\n\n## Notes\n{query}\n- [Reuters](https://www.reuters.com/acme)\n"
        ))
    }
}

struct SlowBackend(Duration);

#[async_trait]
impl ResearchBackend for SlowBackend {
    async fn research(&self, _query: &str) -> Result<String> {
        sleep(self.0).await;
        Ok(ACME_REPORT.to_string())
    }
}

fn base_config(output_dir: &Path) -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_concurrency: 2,
        gui_enabled: false,
        auth_token: None,
        output_dir: output_dir.to_path_buf(),
        report_title: "Market Research Report".into(),
        generation_timeout: Duration::from_secs(5),
        max_reports: 100,
        log_level: "info".into(),
        crew: CrewConfig::default(),
    }
}

fn server_with(config: &AppConfig, backend: Arc<dyn ResearchBackend>) -> TestServer {
    let state = AppState::with_backend(config, backend).expect("state initialization failed");
    TestServer::new(build_router(state)).unwrap()
}

async fn start(server: &TestServer, payload: Value) -> String {
    let response = server.post("/api/reports").json(&payload).await;
    assert_eq!(response.status_code(), 202);
    let body = response.json::<Value>();
    assert_eq!(body["state"], "running");
    body["report_id"]
        .as_str()
        .expect("report id missing")
        .to_string()
}

async fn wait_for(server: &TestServer, report_id: &str, state: &str) -> Value {
    let path = format!("/api/reports/{report_id}");
    timeout(Duration::from_secs(10), async {
        loop {
            let response = server.get(&path).await;
            assert_eq!(response.status_code(), 200);
            let payload = response.json::<Value>();
            if payload["state"] == state {
                return payload;
            }
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("report did not reach the expected state in time")
}

#[tokio::test]
async fn readiness_requires_gui_flag() {
    let temp = TempDir::new().unwrap();

    let disabled = server_with(&base_config(temp.path()), Arc::new(FixedBackend));
    assert_eq!(disabled.get("/health/ready").await.status_code(), 503);
    assert_eq!(disabled.get("/health/live").await.status_code(), 200);
    assert_eq!(disabled.get("/api/reports").await.status_code(), 403);
    assert_eq!(disabled.get("/").await.status_code(), 404);

    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let enabled = server_with(&config, Arc::new(FixedBackend));
    let response = enabled.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["metrics"]["available_permits"], 2);

    let index = enabled.get("/").await;
    assert_eq!(index.status_code(), 200);
    assert!(index.text().contains("<form id=\"research\">"));
}

#[tokio::test]
async fn api_requires_bearer_token_when_configured() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.auth_token = Some("secret".into());
    let server = server_with(&config, Arc::new(FixedBackend));

    assert_eq!(server.get("/api/reports").await.status_code(), 401);

    let response = server
        .get("/api/reports")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/api/reports")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert!(body["reports"].as_array().is_some_and(|items| items.is_empty()));

    let response = server.get("/api/reports?access_token=secret").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn query_token_is_percent_decoded_and_reencoded() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.auth_token = Some("a+b/c=".into());
    let server = server_with(&config, Arc::new(FixedBackend));

    let response = server.get("/api/reports?access_token=a%2Bb%2Fc%3D").await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post("/api/reports")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer a+b/c="))
        .json(&json!({ "query": "Overview of Acme Robotics" }))
        .await;
    assert_eq!(response.status_code(), 202);
    let report_id = response.json::<Value>()["report_id"]
        .as_str()
        .unwrap()
        .to_string();

    let status_path = format!("/api/reports/{report_id}?access_token=a%2Bb%2Fc%3D");
    timeout(Duration::from_secs(10), async {
        while server.get(&status_path).await.json::<Value>()["state"] != "completed" {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap();

    let view = server
        .get(&format!("/api/reports/{report_id}/view?access_token=a%2Bb%2Fc%3D"))
        .await;
    assert_eq!(view.status_code(), 200);
    let download_path = format!("/api/reports/{report_id}/download?access_token=a%2Bb%2Fc%3D");
    assert!(view.text().contains(&format!("href=\"{download_path}\"")));

    let download = server.get(&download_path).await;
    assert_eq!(download.status_code(), 200);
    assert!(download.as_bytes().starts_with(b"PK"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let server = server_with(&config, Arc::new(FixedBackend));

    let response = server
        .post("/api/reports")
        .json(&json!({ "query": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["error"], "query must not be empty");

    assert_eq!(server.get("/api/reports/missing").await.status_code(), 404);
}

#[tokio::test]
async fn submitted_report_becomes_viewable_and_downloadable() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let server = server_with(&config, Arc::new(FixedBackend));

    let report_id = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    let status = wait_for(&server, &report_id, "completed").await;

    assert_eq!(status["filename"], "Market Analysis of Acme Robotics.docx");
    assert_eq!(status["source_count"], 2);
    assert_eq!(
        status["categories"],
        json!(["Market Research", "Industry News"])
    );
    assert!(
        temp.path()
            .join(&report_id)
            .join("Market Analysis of Acme Robotics.docx")
            .is_file()
    );

    let view = server.get(&format!("/api/reports/{report_id}/view")).await;
    assert_eq!(view.status_code(), 200);
    let html = view.text();
    assert!(html.contains("Overview of Acme Robotics"));
    assert!(html.contains("Industry News"));
    assert!(html.contains(&format!("href=\"/api/reports/{report_id}/download\"")));

    let download = server
        .get(&format!("/api/reports/{report_id}/download"))
        .await;
    assert_eq!(download.status_code(), 200);
    let disposition = download
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(
        disposition,
        "attachment; filename=\"Market Analysis of Acme Robotics.docx\""
    );
    assert!(download.as_bytes().starts_with(b"PK"));

    let stream = server
        .get(&format!("/api/reports/{report_id}/stream"))
        .await;
    assert_eq!(stream.status_code(), 200);
    let body = stream.text();
    assert!(
        body.contains("event: completed"),
        "stream did not include completed event: {body}"
    );
    assert!(
        body.contains("\"kind\":\"completed\""),
        "stream payload missing completed kind: {body}"
    );

    let listing = server.get("/api/reports").await.json::<Value>();
    assert_eq!(listing["capacity"]["total_reports"], 1);
    assert_eq!(listing["capacity"]["running_reports"], 0);
}

#[tokio::test]
async fn explicit_company_names_the_download() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let server = server_with(&config, Arc::new(FixedBackend));

    let report_id = start(
        &server,
        json!({ "query": "Overview of Acme Robotics", "company": "Acme Corp" }),
    )
    .await;
    let status = wait_for(&server, &report_id, "completed").await;
    assert_eq!(status["filename"], "Market Analysis of Acme Corp.docx");
}

#[tokio::test]
async fn view_conflicts_while_report_is_running() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let server = server_with(&config, Arc::new(SlowBackend(Duration::from_secs(2))));

    let report_id = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;

    let view = server.get(&format!("/api/reports/{report_id}/view")).await;
    assert_eq!(view.status_code(), 409);
    let download = server
        .get(&format!("/api/reports/{report_id}/download"))
        .await;
    assert_eq!(download.status_code(), 409);
}

#[tokio::test]
async fn slow_research_times_out() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.generation_timeout = Duration::from_millis(50);
    let server = server_with(&config, Arc::new(SlowBackend(Duration::from_secs(5))));

    let report_id = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    let status = wait_for(&server, &report_id, "failed").await;

    assert!(
        status["error"]
            .as_str()
            .is_some_and(|error| error.contains("timed out")),
        "unexpected failure payload: {status}"
    );

    let stream = server
        .get(&format!("/api/reports/{report_id}/stream"))
        .await;
    assert!(stream.text().contains("event: error"));
}

#[tokio::test]
async fn same_company_reports_keep_separate_files() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    let server = server_with(&config, Arc::new(EchoBackend));

    let first = start(&server, json!({ "query": "first look at Acme" })).await;
    let status = wait_for(&server, &first, "completed").await;
    assert_eq!(status["filename"], "Market Analysis of Acme Robotics.docx");
    let first_bytes = server
        .get(&format!("/api/reports/{first}/download"))
        .await
        .as_bytes()
        .to_vec();

    let second = start(&server, json!({ "query": "second look at Acme, with far more notes" })).await;
    let status = wait_for(&server, &second, "completed").await;
    assert_eq!(status["filename"], "Market Analysis of Acme Robotics.docx");
    let second_bytes = server
        .get(&format!("/api/reports/{second}/download"))
        .await
        .as_bytes()
        .to_vec();

    let first_again = server
        .get(&format!("/api/reports/{first}/download"))
        .await
        .as_bytes()
        .to_vec();
    assert_eq!(first_again, first_bytes);
    assert_ne!(first_bytes, second_bytes);
    assert!(temp.path().join(&first).is_dir());
    assert!(temp.path().join(&second).is_dir());
}

#[tokio::test]
async fn oldest_finished_report_is_evicted_at_the_cap() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.max_reports = 1;
    let server = server_with(&config, Arc::new(FixedBackend));

    let first = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    wait_for(&server, &first, "completed").await;

    let second = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    assert_eq!(
        server.get(&format!("/api/reports/{first}")).await.status_code(),
        404
    );
    assert_eq!(
        server
            .get(&format!("/api/reports/{first}/download"))
            .await
            .status_code(),
        404
    );
    wait_for(&server, &second, "completed").await;

    let listing = server.get("/api/reports").await.json::<Value>();
    assert_eq!(listing["reports"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["reports"][0]["report_id"], second.as_str());

    let evicted_dir = temp.path().join(&first);
    timeout(Duration::from_secs(5), async {
        while evicted_dir.exists() {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("evicted report files were not removed");
}

#[tokio::test]
async fn running_reports_are_never_evicted() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.max_reports = 1;
    let server = server_with(&config, Arc::new(SlowBackend(Duration::from_millis(300))));

    let first = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    let second = start(&server, json!({ "query": "Overview of Acme Robotics" })).await;

    assert_eq!(
        server.get(&format!("/api/reports/{first}")).await.status_code(),
        200
    );
    wait_for(&server, &first, "completed").await;
    wait_for(&server, &second, "completed").await;
}

#[tokio::test]
async fn readiness_reports_queued_reports() {
    let temp = TempDir::new().unwrap();
    let mut config = base_config(temp.path());
    config.gui_enabled = true;
    config.max_concurrency = 1;
    let server = server_with(&config, Arc::new(SlowBackend(Duration::from_secs(2))));

    start(&server, json!({ "query": "Overview of Acme Robotics" })).await;
    start(&server, json!({ "query": "Overview of Acme Robotics" })).await;

    let health = timeout(Duration::from_secs(5), async {
        loop {
            let response = server.get("/health/ready").await;
            assert_eq!(response.status_code(), 200);
            let body = response.json::<Value>();
            if body["metrics"]["generating_reports"] == 1 {
                return body;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first report never started generating");

    assert_eq!(health["status"], "queueing");
    assert_eq!(health["metrics"]["queued_reports"], 1);
    assert_eq!(health["accepting_immediately"], false);
}
