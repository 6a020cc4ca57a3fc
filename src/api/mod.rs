//! API layer -- axum routes, handlers, and middleware.

mod dashboard;
mod routes;
pub mod state;

use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use self::state::AppState;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    let reports = ServeDir::new(&state.charts.output_dir);
    Router::new()
        .nest("/api", routes::api_routes())
        .nest_service("/reports", reports)
        .route("/", get(dashboard::index))
        .fallback(fallback)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, Response};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{ChartsConfig, ConcurrencyPolicy};
    use crate::refresh::supervisor::testing::{FakeChild, FakeLauncher};
    use crate::refresh::{RefreshService, RefreshSettings};

    fn settings(concurrency: ConcurrencyPolicy) -> RefreshSettings {
        RefreshSettings {
            interpreter: "python3".to_string(),
            script: "scripts/update_data.py".into(),
            working_dir: Some(std::env::temp_dir()),
            timeout: Duration::from_secs(300),
            concurrency,
        }
    }

    fn app(launcher: Arc<FakeLauncher>, charts: ChartsConfig) -> Router {
        let refresh = RefreshService::with_launcher(settings(ConcurrencyPolicy::Join), launcher);
        router(AppState::new(refresh, charts))
    }

    /// Chart directories under `dir`, so successful refreshes render there.
    fn scratch_charts(dir: &std::path::Path) -> ChartsConfig {
        ChartsConfig {
            data_dir: dir.join("data"),
            output_dir: dir.join("reports"),
            ..ChartsConfig::default()
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
        app.oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_cors(response: &Response<Body>) {
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "POST");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    }

    #[tokio::test]
    async fn test_non_post_methods_are_rejected_without_spawning() {
        let launcher = Arc::new(FakeLauncher::default());
        for method in [
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
            Method::HEAD,
        ] {
            let response = send(
                app(launcher.clone(), ChartsConfig::default()),
                method.clone(),
                "/api/update-data",
            )
            .await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(response.headers()[header::ALLOW], "POST");
            assert_cors(&response);
            if method != Method::HEAD {
                let body = body_json(response).await;
                assert_eq!(body["success"], false);
                assert_eq!(body["error"], "Method not allowed");
            }
        }
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_success() {
        let child = FakeChild::new(Duration::from_secs(2), 0)
            .with_stdout(&[b"Fetching data...\n", b"Analysis complete\n"]);
        let launcher = Arc::new(FakeLauncher::with_child(child));
        let dir = tempfile::tempdir().unwrap();

        let response = send(
            app(launcher.clone(), scratch_charts(dir.path())),
            Method::POST,
            "/api/update-data",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Data updated successfully");
        assert_eq!(body["output"], "Fetching data...\nAnalysis complete\n");
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_failure_returns_stderr() {
        let child = FakeChild::new(Duration::from_secs(2), 1)
            .with_stdout(&[b"step 1\n"])
            .with_stderr(&[b"ModuleNotFoundError: pandas\n"]);
        let launcher = Arc::new(FakeLauncher::with_child(child));

        let response = send(
            app(launcher, ChartsConfig::default()),
            Method::POST,
            "/api/update-data",
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Data update failed");
        assert_eq!(body["error"], "ModuleNotFoundError: pandas\n");
        assert_eq!(body["output"], "step 1\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_timeout_is_408() {
        let child = FakeChild::new(Duration::from_secs(3_600), 0).with_stdout(&[b"partial"]);
        let kills = child.kills.clone();
        let launcher = Arc::new(FakeLauncher::with_child(child));

        let response = send(
            app(launcher, ChartsConfig::default()),
            Method::POST,
            "/api/update-data",
        )
        .await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "Data update timed out" })
        );
        assert_eq!(kills.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_error_is_internal_server_error() {
        let launcher = Arc::new(FakeLauncher::default());
        let response = send(
            app(launcher.clone(), ChartsConfig::default()),
            Method::POST,
            "/api/update-data",
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(body["error"].as_str().unwrap().contains("python3"));
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_policy_returns_409() {
        let child = FakeChild::new(Duration::from_secs(30), 0);
        let launcher = Arc::new(FakeLauncher::with_child(child));
        let refresh = RefreshService::with_launcher(settings(ConcurrencyPolicy::Reject), launcher.clone());
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(refresh, scratch_charts(dir.path())));

        let first = tokio::spawn(send(app.clone(), Method::POST, "/api/update-data"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = send(app, Method::POST, "/api/update-data").await;

        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert_eq!(body["message"], "Data update already in progress");
        assert_eq!(first.await.unwrap().status(), StatusCode::OK);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_status_health_and_fallback() {
        let launcher = Arc::new(FakeLauncher::default());

        let status = send(app(launcher.clone(), ChartsConfig::default()), Method::GET, "/api/status").await;
        assert_eq!(status.status(), StatusCode::OK);
        let body = body_json(status).await;
        assert_eq!(body["data"]["running"], false);
        assert!(body["data"]["last_success"].is_null());
        assert!(body["meta"]["timestamp"].is_string());

        let health = send(app(launcher.clone(), ChartsConfig::default()), Method::GET, "/api/health").await;
        assert_eq!(body_json(health).await["data"]["status"], "ok");

        let missing = send(app(launcher.clone(), ChartsConfig::default()), Method::GET, "/nope").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_cors(&missing);

        let page = send(app(launcher, ChartsConfig::default()), Method::GET, "/").await;
        assert_eq!(page.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_charts_endpoint_and_static_reports() {
        let dir = tempfile::tempdir().unwrap();
        let charts = scratch_charts(dir.path());
        std::fs::create_dir_all(&charts.data_dir).unwrap();
        std::fs::create_dir_all(&charts.output_dir).unwrap();
        std::fs::write(
            charts.metrics_path(),
            "date,cumulative_return\n2024-01-01,0\n2024-01-02,1.5\n",
        )
        .unwrap();
        std::fs::write(charts.output_dir.join("portfolio_report.html"), "<h1>report</h1>").unwrap();
        let launcher = Arc::new(FakeLauncher::default());

        let response = send(app(launcher.clone(), charts.clone()), Method::GET, "/api/charts").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["cumulative_returns"]["plot"]["type"], "line");
        assert!(body["data"]["strategy_weights"].is_null());

        let report = send(app(launcher, charts), Method::GET, "/reports/portfolio_report.html").await;
        assert_eq!(report.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_rerenders_served_charts() {
        let dir = tempfile::tempdir().unwrap();
        let charts = scratch_charts(dir.path());
        std::fs::create_dir_all(&charts.data_dir).unwrap();
        std::fs::write(
            charts.metrics_path(),
            "date,cumulative_return\nOLD-DAY-1,0\nOLD-DAY-2,3\n",
        )
        .unwrap();
        crate::charts::generate_all(&charts).unwrap();

        // The refresh script would write the new rows while it runs.
        std::fs::write(
            charts.metrics_path(),
            "date,cumulative_return\nNEW-DAY-1,0\nNEW-DAY-2,5\n",
        )
        .unwrap();
        let launcher = Arc::new(FakeLauncher::with_child(FakeChild::new(Duration::from_secs(2), 0)));
        let app = app(launcher, charts);

        let before = body_text(send(app.clone(), Method::GET, "/reports/cumulative_returns.svg").await).await;
        assert!(before.contains("OLD-DAY"));

        let response = send(app.clone(), Method::POST, "/api/update-data").await;
        assert_eq!(response.status(), StatusCode::OK);

        let after = send(app, Method::GET, "/reports/cumulative_returns.svg").await;
        assert_eq!(after.status(), StatusCode::OK);
        let after = body_text(after).await;
        assert!(after.contains("NEW-DAY"));
        assert!(!after.contains("OLD-DAY"));
    }
}
