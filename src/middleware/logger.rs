use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;

use super::{observe, observed_status, resume};
use crate::web::{Handler, HandlerResult, Middleware, RequestContext};

/// Logs the start and completion of every request.
pub struct Logger;

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(LoggerHandler { next })
    }
}

struct LoggerHandler {
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for LoggerHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        let query = req.uri().query().unwrap_or_default().to_string();

        tracing::info!(
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
            query = %query,
            started_at = %ctx.started_at.to_rfc3339(),
            "request started"
        );

        let outcome = observe(&self.next, ctx, req).await;

        tracing::info!(
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
            status = observed_status(ctx, &outcome).as_u16(),
            elapsed_ms = ctx.elapsed_ms() as u64,
            panicked = outcome.is_err(),
            "request completed"
        );

        resume(outcome)
    }
}
