//! End-to-end refresh runs against real `sh` scripts.

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use portfolio_dash::api::{router, state::AppState};
use portfolio_dash::charts::generate_all;
use portfolio_dash::config::{ChartsConfig, ConcurrencyPolicy};
use portfolio_dash::refresh::{RefreshOutcome, RefreshService, RefreshSettings};

fn service(dir: &Path, script: &str, timeout: Duration) -> RefreshService {
    std::fs::write(dir.join("update_data.sh"), script).unwrap();
    RefreshService::new(RefreshSettings {
        interpreter: "sh".to_string(),
        script: "update_data.sh".into(),
        working_dir: Some(dir.to_path_buf()),
        timeout,
        concurrency: ConcurrencyPolicy::Join,
    })
}

fn charts(dir: &Path) -> ChartsConfig {
    ChartsConfig {
        data_dir: dir.join("data"),
        output_dir: dir.join("public/reports"),
        ..ChartsConfig::default()
    }
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn post(dir: &Path, service: RefreshService) -> (StatusCode, Value) {
    let app = router(AppState::new(service, charts(dir)));
    let (status, bytes) = send(app, Method::POST, "/api/update-data").await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_successful_script() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(
        dir.path(),
        "echo 'Fetching prices'\necho 'Optimizing portfolio'\n",
        Duration::from_secs(30),
    );

    let (status, body) = post(dir.path(), svc.clone()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "Fetching prices\nOptimizing portfolio\n");
    assert!(svc.status().last_success.is_some());
}

#[tokio::test]
async fn test_failing_script_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(
        dir.path(),
        "echo 'partial'\necho 'no network' >&2\nexit 3\n",
        Duration::from_secs(30),
    );

    let (status, body) = post(dir.path(), svc).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Data update failed");
    assert_eq!(body["error"], "no network\n");
    assert_eq!(body["output"], "partial\n");
}

#[tokio::test]
async fn test_script_runs_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), "touch ran_here\n", Duration::from_secs(30));

    let report = svc.trigger().await.unwrap();

    assert!(report.outcome.is_success());
    assert!(dir.path().join("ran_here").exists());
}

#[tokio::test]
async fn test_hung_script_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(
        dir.path(),
        "echo started\nexec sleep 30\n",
        Duration::from_millis(500),
    );

    let start = Instant::now();
    let (status, body) = post(dir.path(), svc.clone()).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["message"], "Data update timed out");
    assert!(start.elapsed() < Duration::from_secs(10));

    match svc.last_report().unwrap().outcome {
        RefreshOutcome::TimedOut { partial_stdout, .. } => {
            assert_eq!(partial_stdout, "started\n");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_interpreter_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let svc = RefreshService::new(RefreshSettings {
        interpreter: "/nonexistent/python3".to_string(),
        script: "update_data.py".into(),
        working_dir: Some(dir.path().to_path_buf()),
        timeout: Duration::from_secs(5),
        concurrency: ConcurrencyPolicy::Join,
    });

    let (status, body) = post(dir.path(), svc).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
    assert!(body["error"].as_str().unwrap().contains("/nonexistent/python3"));
}

#[tokio::test]
async fn test_refresh_serves_regenerated_charts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = charts(dir.path());
    std::fs::create_dir_all(&cfg.data_dir).unwrap();
    std::fs::write(
        cfg.metrics_path(),
        "date,cumulative_return\nOLD-DAY-1,0\nOLD-DAY-2,3\n",
    )
    .unwrap();
    generate_all(&cfg).unwrap();

    let svc = service(
        dir.path(),
        "printf 'date,cumulative_return\\nNEW-DAY-1,0\\nNEW-DAY-2,5\\n' > data/portfolio_metrics.csv\n",
        Duration::from_secs(30),
    );
    let app = router(AppState::new(svc, cfg));

    let (status, _) = send(app.clone(), Method::POST, "/api/update-data").await;
    assert_eq!(status, StatusCode::OK);

    let (status, svg) = send(app, Method::GET, "/reports/cumulative_returns.svg").await;
    assert_eq!(status, StatusCode::OK);
    let svg = String::from_utf8_lossy(&svg);
    assert!(svg.contains("NEW-DAY"));
    assert!(!svg.contains("OLD-DAY"));
}
