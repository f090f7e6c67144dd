// handlers/protected/test_auth.rs - GET /test/auth handler (ADMIN only)

use axum::extract::Request;
use axum::http::StatusCode;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use crate::auth::AuthError;
use crate::web::{HandlerResult, RequestContext};

/// GET /test/auth - echoes the caller's claims.
pub fn test_auth(ctx: &mut RequestContext, req: Request) -> BoxFuture<'_, HandlerResult> {
    handle(ctx, req).boxed()
}

async fn handle(ctx: &mut RequestContext, _req: Request) -> HandlerResult {
    let claims = ctx.claims.clone().ok_or(AuthError::MissingClaims)?;

    Ok(ctx.respond(
        StatusCode::OK,
        json!({
            "success": true,
            "data": {
                "status": "OK",
                "subject": claims.subject,
                "roles": claims.roles,
                "expires_at": claims.expires_at,
            }
        }),
    ))
}
