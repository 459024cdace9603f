//! Liveness and Metrics Endpoint
//!
//! Minimal HTTP responder so hosting platforms can tell the process is up.
//! It shares no state with the feed pipeline.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics in text format
//! - anything else - `200 OK` with a static body

use std::net::SocketAddr;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;

/// Body returned for every non-metrics request.
pub const LIVENESS_BODY: &str = "Trade stream relay is running";

// =============================================================================
// Liveness Server
// =============================================================================

/// Liveness HTTP server.
pub struct LivenessServer {
    port: u16,
    cancel: CancellationToken,
}

impl LivenessServer {
    /// Create a new liveness server.
    #[must_use]
    pub const fn new(port: u16, cancel: CancellationToken) -> Self {
        Self { port, cancel }
    }

    /// Build the HTTP router.
    #[must_use]
    pub fn router() -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .fallback(liveness_handler)
    }

    /// Run the liveness server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Liveness server listening");

        axum::serve(listener, Self::router())
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Liveness server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, LIVENESS_BODY)
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// Liveness server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use test_case::test_case;
    use tower::ServiceExt;

    use super::*;

    #[test_case(Method::GET, "/" ; "root")]
    #[test_case(Method::GET, "/healthz" ; "healthz path")]
    #[test_case(Method::POST, "/anything/else" ; "other method")]
    #[tokio::test]
    async fn answers_running_everywhere(method: Method, path: &str) {
        let response = LivenessServer::router()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], LIVENESS_BODY.as_bytes());
    }

    #[tokio::test]
    async fn metrics_unavailable_without_recorder() {
        let response = LivenessServer::router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let held = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = held.local_addr().unwrap().port();

        let err = LivenessServer::new(port, CancellationToken::new())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, HealthServerError::BindFailed(p, _) if p == port));
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = LivenessServer::new(0, cancel.clone());
        let handle = tokio::spawn(server.run());

        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
