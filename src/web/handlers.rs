//! HTTP handlers for the exposition and API endpoints.

use crate::web::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus text exposition of every gauge.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no metrics recorder installed").into_response(),
    }
}

/// The loaded configuration, graphs included.
pub async fn get_config(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    serde_json::to_value(state.config.as_ref())
        .map(Json)
        .map_err(|e| {
            error!("Failed to serialize configuration: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Latest applied snapshot as JSON.
pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(snapshot) = state.snapshots.borrow().clone() else {
        return Err(StatusCode::NOT_FOUND);
    };

    match serde_json::to_value(snapshot.as_ref()) {
        Ok(json_value) => Ok(Json(json_value)),
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last_snapshot = state
        .snapshots
        .borrow()
        .as_ref()
        .map(|snapshot| snapshot.captured_at().to_rfc3339());

    Json(json!({
        "status": "ok",
        "service": "gaugewatch",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "last_snapshot": last_snapshot,
        "sources": state.config.sources.len(),
        "monitors": state.config.monitors.len(),
    }))
}

/// Built-in index listing the configured monitors.
pub async fn default_index(State(state): State<AppState>) -> Html<String> {
    let mut items = String::new();
    for monitor in &state.config.monitors {
        let title = if monitor.title.is_empty() { &monitor.id } else { &monitor.title };
        items.push_str(&format!(
            "      <li><code>{}</code> {} <small>({}/{})</small></li>\n",
            escape(&monitor.id),
            escape(title),
            escape(&monitor.value.source_id),
            escape(&monitor.value.record_id),
        ));
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>gaugewatch</title>
</head>
<body>
    <h1>gaugewatch</h1>
    <p>
      <a href="/metrics">/metrics</a> |
      <a href="/api/snapshot">/api/snapshot</a> |
      <a href="/config.json">/config.json</a> |
      <a href="/api/health">/api/health</a>
    </p>
    <ul>
{items}    </ul>
</body>
</html>
"#
    ))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
