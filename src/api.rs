//! HTTP control surface for the relay.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::control::RelayController;
use crate::pipeline::RelayRequest;

/// Shared state for the control routes.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<RelayController>,
}

/// Acknowledgment body for `/start` and `/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// POST /start
///
/// Schedules a relay run and returns immediately. A run already in
/// progress is replaced.
async fn start_relay(
    State(state): State<ApiState>,
    Json(request): Json<RelayRequest>,
) -> Json<Ack> {
    state.controller.start(request).await;
    Ack::new("Relay started")
}

/// POST /stop
///
/// Signals the active run to stop. Succeeds when idle too. Any request
/// body is ignored.
async fn stop_relay(State(state): State<ApiState>) -> Json<Ack> {
    state.controller.stop().await;
    Ack::new("Relay stopped")
}

/// GET /status
async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// Build the control routes with CORS for `cors_origins`.
pub fn relay_routes(controller: Arc<RelayController>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/start", post(start_relay))
        .route("/stop", post(stop_relay))
        .route("/status", get(get_status))
        .layer(cors_layer(cors_origins))
        .with_state(ApiState { controller })
}

/// CORS for the listed origins, with credentials.
///
/// Wildcard methods or headers cannot be combined with credentials, so
/// both are listed explicitly.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn cors_allows_listed_origin_only() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(cors_layer(&["http://localhost:5000".to_string()]));

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:5000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5000"
        );
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );

        let denied = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(
            denied
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[test]
    fn invalid_origins_are_skipped() {
        // Must not panic on a header-invalid origin.
        let _ = cors_layer(&["http://ok.example".to_string(), "bad\norigin".to_string()]);
    }
}
