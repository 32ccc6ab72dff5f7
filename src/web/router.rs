//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::{handlers, AppState};
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::default_index))
        .route("/metrics", get(handlers::metrics))
        .route("/config.json", get(handlers::get_config))
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/health", get(handlers::health_check))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::watch::data::{Records, Row, Snapshot};
    use crate::watch::sink::PrometheusGauge;
    use crate::watch::traits::GaugeSink;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::sync::watch;
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn state() -> (AppState, watch::Sender<Option<Arc<Snapshot>>>) {
        let (tx, rx) = watch::channel(None);
        (AppState::new(Arc::new(AppConfig::default()), rx), tx)
    }

    #[tokio::test]
    async fn test_snapshot_not_found_before_first_cycle() {
        let (state, _tx) = state();
        let app = create_app(&WebConfig::default(), state);
        let (status, _) = get(app, "/api/snapshot").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_snapshot_serves_latest() {
        let (state, tx) = state();
        let row = Row::from([("signal".to_string(), "-41".to_string())]);
        let records = Records::from([("wifi".to_string(), vec![row])]);
        tx.send_replace(Some(Arc::new(Snapshot::new(
            Instant::now(),
            Utc::now(),
            BTreeMap::from([("router".to_string(), records)]),
        ))));

        let app = create_app(&WebConfig::default(), state);
        let (status, body) = get(app, "/api/snapshot").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["sources"]["router"]["wifi"][0]["signal"], "-41");
        assert!(json["captured_at"].is_string());
    }

    #[tokio::test]
    async fn test_health_and_config() {
        let (state, _tx) = state();
        let app = create_app(&WebConfig::default(), state);

        let (status, body) = get(app.clone(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["last_snapshot"].is_null());

        let (status, body) = get(app, "/config.json").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["monitors"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (state, _tx) = state();
        let app = create_app(&WebConfig::default(), state);
        let (status, _) = get(app, "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_renders_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let gauge = PrometheusGauge::register("wifi_signal", "WiFi signal", vec!["ssid".into()]);
            gauge.set(&["s0".to_string()], 42.0);
        });

        let (state, _tx) = state();
        let app = create_app(&WebConfig::default(), state.with_prometheus(handle));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("wifi_signal{ssid=\"s0\"} 42"));
    }
}
