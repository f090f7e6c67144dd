use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use futures::FutureExt;

use crate::error::ApiError;
use crate::metrics::ApiMetrics;
use crate::web::{Handler, HandlerResult, Middleware, RequestContext};

/// Turns a panic anywhere inside the chain into `ApiError::Internal`.
///
/// Must be the outermost layer so the error path still produces a response.
pub struct Panics {
    metrics: Option<ApiMetrics>,
}

impl Panics {
    pub fn new(metrics: Option<ApiMetrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(PanicsHandler {
            metrics: self.metrics.clone(),
            next,
        })
    }
}

struct PanicsHandler {
    metrics: Option<ApiMetrics>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for PanicsHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        let outcome = AssertUnwindSafe(self.next.call(ctx, req)).catch_unwind().await;

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    trace_id = %ctx.trace_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    panic = %message,
                    "handler panicked"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_panic();
                }
                Err(ApiError::internal(format!("PANIC [{message}]")))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
