//! Middleware for the request pipeline.
//!
//! The service's global chain, outermost first, is
//! `Panics -> Errors -> Metrics -> Logger -> Deadline`; protected routes add
//! `Authenticate` and `Authorize` inside it.

pub mod auth;
pub mod deadline;
pub mod errors;
pub mod logger;
pub mod metrics;
pub mod panics;

pub use auth::{Authenticate, Authorize};
pub use deadline::Deadline;
pub use errors::Errors;
pub use logger::Logger;
pub use metrics::Metrics;
pub use panics::Panics;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use futures::FutureExt;

use crate::web::{Handler, HandlerResult, RequestContext};

/// Result of the inner chain, or the payload of a panic raised inside it.
pub(crate) type Outcome = Result<HandlerResult, Box<dyn Any + Send>>;

/// Status the client will see for `result`.
fn outcome_status(ctx: &RequestContext, result: &HandlerResult) -> StatusCode {
    match result {
        Ok(response) => ctx.status_code.unwrap_or_else(|| response.status()),
        Err(err) => err.status(),
    }
}

/// Run `next`, holding a panic so the caller can record the request before
/// handing it on with [`resume`]. A panicked request is a 500.
pub(crate) async fn observe(
    next: &Arc<dyn Handler>,
    ctx: &mut RequestContext,
    req: Request,
) -> Outcome {
    let outcome = AssertUnwindSafe(next.call(ctx, req)).catch_unwind().await;
    if outcome.is_err() {
        ctx.status_code = Some(StatusCode::INTERNAL_SERVER_ERROR);
    }
    outcome
}

pub(crate) fn observed_status(ctx: &RequestContext, outcome: &Outcome) -> StatusCode {
    match outcome {
        Ok(result) => outcome_status(ctx, result),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Continue unwinding a panic held by [`observe`].
pub(crate) fn resume(outcome: Outcome) -> HandlerResult {
    outcome.unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}
