use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;

use crate::error::ApiError;
use crate::web::{Handler, HandlerResult, Middleware, RequestContext};

/// Abandons the inner chain when it runs longer than `timeout`.
///
/// The inner future is dropped on expiry, so no further work is done for the
/// request and the caller gets a 503 through the normal error path.
pub struct Deadline {
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for Deadline {
    fn name(&self) -> &'static str {
        "deadline"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(DeadlineHandler {
            timeout: self.timeout,
            next,
        })
    }
}

struct DeadlineHandler {
    timeout: Duration,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for DeadlineHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        match tokio::time::timeout(self.timeout, self.next.call(ctx, req)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "request deadline exceeded"
                );
                Err(ApiError::service_unavailable("request deadline exceeded"))
            }
        }
    }
}
