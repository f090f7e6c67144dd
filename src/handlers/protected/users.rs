// handlers/protected/users.rs - GET /users/:user_id handler (ADMIN or the user themselves)

use std::collections::HashMap;

use axum::extract::Request;
use axum::http::StatusCode;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::ApiError;
use crate::web::{HandlerResult, PathParams, RequestContext};

/// GET /users/:user_id
///
/// User records live in another service; this returns what the token says
/// about the caller alongside the requested id.
pub fn query_by_id(ctx: &mut RequestContext, req: Request) -> BoxFuture<'_, HandlerResult> {
    handle(ctx, req).boxed()
}

async fn handle(ctx: &mut RequestContext, req: Request) -> HandlerResult {
    let raw = req
        .extensions()
        .get::<PathParams>()
        .and_then(|params| params.get("user_id"))
        .unwrap_or_default()
        .to_string();

    let user_id = Uuid::parse_str(&raw).map_err(|_| {
        let mut field_errors = HashMap::new();
        field_errors.insert("user_id".to_string(), format!("Invalid UUID format: {}", raw));
        ApiError::validation_error("Invalid field format", Some(field_errors))
    })?;

    let claims = ctx.claims.clone().ok_or(AuthError::MissingClaims)?;

    Ok(ctx.respond(
        StatusCode::OK,
        json!({
            "success": true,
            "data": {
                "id": user_id,
                "requested_by": claims.subject,
                "self": claims.subject == raw,
            }
        }),
    ))
}
