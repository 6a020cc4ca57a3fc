//! API route definitions.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::error;

use super::state::AppState;
use crate::charts;
use crate::refresh::{RefreshError, RefreshOutcome};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/update-data",
            post(update_data).fallback(method_not_allowed),
        )
        .route("/status", get(refresh_status))
        .route("/charts", get(chart_data))
        .route("/health", get(health))
}

async fn update_data(State(state): State<AppState>) -> Response {
    match state.refresh.trigger().await {
        Ok(report) => outcome_response(&report.outcome),
        Err(e) => match e.as_ref() {
            RefreshError::AlreadyRunning => (
                StatusCode::CONFLICT,
                Json(json!({
                    "success": false,
                    "message": "Data update already in progress"
                })),
            )
                .into_response(),
            other => internal_error(other.to_string()),
        },
    }
}

fn outcome_response(outcome: &RefreshOutcome) -> Response {
    match outcome {
        RefreshOutcome::Succeeded { stdout } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Data updated successfully",
                "output": stdout
            })),
        )
            .into_response(),
        RefreshOutcome::Failed { stdout, stderr, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": "Data update failed",
                "error": stderr,
                "output": stdout
            })),
        )
            .into_response(),
        RefreshOutcome::TimedOut { .. } => (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "success": false,
                "message": "Data update timed out"
            })),
        )
            .into_response(),
    }
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "message": "Internal server error",
            "error": message
        })),
    )
        .into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(json!({ "success": false, "error": "Method not allowed" })),
    )
        .into_response()
}

async fn refresh_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": state.refresh.status(),
        "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
    }))
}

async fn chart_data(State(state): State<AppState>) -> Response {
    let config = state.charts.clone();
    match tokio::task::spawn_blocking(move || charts::build_figures(&config)).await {
        Ok(figures) => Json(json!({
            "data": figures,
            "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "chart build task failed");
            internal_error(e.to_string())
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}
