// handlers/public/health.rs - GET /health and GET /metrics handlers

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::ApiError;
use crate::keystore::KeyStore;
use crate::metrics::ApiMetrics;
use crate::web::{Handler, HandlerResult, RequestContext};

/// GET /health - liveness plus the number of loaded signing keys.
pub struct Health {
    keys: Arc<KeyStore>,
}

impl Health {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Handler for Health {
    async fn call(&self, ctx: &mut RequestContext, _req: Request) -> HandlerResult {
        let status = if self.keys.is_empty() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };

        Ok(ctx.respond(
            status,
            json!({
                "success": status.is_success(),
                "data": {
                    "status": if status.is_success() { "ok" } else { "degraded" },
                    "version": env!("CARGO_PKG_VERSION"),
                    "timestamp": chrono::Utc::now(),
                    "keys": self.keys.len(),
                }
            }),
        ))
    }
}

/// GET /metrics - Prometheus text exposition.
pub struct MetricsExport {
    metrics: ApiMetrics,
}

impl MetricsExport {
    pub fn new(metrics: ApiMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Handler for MetricsExport {
    async fn call(&self, _ctx: &mut RequestContext, _req: Request) -> HandlerResult {
        let body = self.metrics.gather_and_encode().map_err(ApiError::internal)?;

        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response())
    }
}
