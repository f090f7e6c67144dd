use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;

use super::{observe, observed_status, resume};
use crate::metrics::ApiMetrics;
use crate::web::{Handler, HandlerResult, Middleware, RequestContext};

/// Records request count, duration, errors and the in-flight gauge.
pub struct Metrics {
    metrics: ApiMetrics,
}

impl Metrics {
    pub fn new(metrics: ApiMetrics) -> Self {
        Self { metrics }
    }
}

impl Middleware for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(MetricsHandler {
            metrics: self.metrics.clone(),
            next,
        })
    }
}

struct MetricsHandler {
    metrics: ApiMetrics,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for MetricsHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        let _in_flight = self.metrics.track_in_flight();

        let outcome = observe(&self.next, ctx, req).await;

        self.metrics.record_request(
            ctx.method.as_str(),
            &ctx.route,
            observed_status(ctx, &outcome).as_u16(),
            ctx.start.elapsed().as_secs_f64(),
        );

        resume(outcome)
    }
}
