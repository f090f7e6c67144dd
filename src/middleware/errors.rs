use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::IntoResponse;

use crate::web::{Handler, HandlerResult, Middleware, RequestContext};

/// Writes the response for errors returned by inner layers.
///
/// Trusted errors are logged at `warn` and shown to the client as-is.
/// Untrusted ones are logged at `error` with their detail and the client gets
/// a generic 500 body.
pub struct Errors;

impl Middleware for Errors {
    fn name(&self) -> &'static str {
        "errors"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ErrorsHandler { next })
    }
}

struct ErrorsHandler {
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for ErrorsHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        let err = match self.next.call(ctx, req).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if err.is_trusted() {
            tracing::warn!(
                trace_id = %ctx.trace_id,
                status = err.status_code(),
                code = err.error_code(),
                "request failed: {}",
                err.message()
            );
        } else {
            tracing::error!(
                trace_id = %ctx.trace_id,
                status = err.status_code(),
                detail = err.detail(),
                "request failed with untrusted error"
            );
        }

        ctx.status_code = Some(err.status());
        Ok(err.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, INTERNAL_MESSAGE};
    use crate::middleware::testing::{ctx, request, untrusted};
    use crate::web::{handler_fn, Chain};
    use axum::http::StatusCode;
    use futures::FutureExt;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_untrusted_error_gets_generic_body() {
        let handler = Chain::new().with(Errors).then(handler_fn(untrusted));
        let mut ctx = ctx();

        let response = handler.call(&mut ctx, request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.status_code, Some(StatusCode::INTERNAL_SERVER_ERROR));

        let body = body_json(response).await;
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_trusted_error_message_is_shown() {
        let handler = Chain::new()
            .with(Errors)
            .then(handler_fn(|_ctx, _req| {
                async { Err(ApiError::validation_error("user_id must be a UUID", None)) }.boxed()
            }));

        let response = handler.call(&mut ctx(), request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "user_id must be a UUID");
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
