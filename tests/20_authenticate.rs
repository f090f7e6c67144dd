mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::routing::MethodFilter;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use futures::FutureExt;
use serde_json::json;

use common::{TestApp, ISSUER, KID};
use sales_api::auth::{Claims, ROLE_ADMIN};
use sales_api::handlers::protected_chain;
use sales_api::middleware::Authorize;
use sales_api::policy::Policy;
use sales_api::web::handler_fn;

/// App with `/counted`, an admin-only route that counts handler invocations.
fn counted_app() -> Result<(TestApp, Arc<AtomicUsize>)> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let app = TestApp::builder()
        .routes(move |pipeline, cfg| {
            let handler = handler_fn(move |ctx, _req| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(ctx.respond(StatusCode::OK, json!({"status": "OK"}))) }.boxed()
            });
            pipeline.handle(
                MethodFilter::GET,
                "/counted",
                handler,
                protected_chain(cfg, Authorize::new(cfg.engine.clone(), Policy::AdminOnly)),
            )
        })
        .build()?;

    Ok((app, calls))
}

#[tokio::test]
async fn missing_authorization_header_is_rejected_before_handler() -> Result<()> {
    let (app, calls) = counted_app()?;

    let res = app.get("/counted", None).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let body = res.json()?;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(
        body["message"],
        "authentication failed: expected authorization header format: Bearer <token>"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_headers_are_rejected() -> Result<()> {
    let (app, calls) = counted_app()?;
    let token = app.token("12345678", &[ROLE_ADMIN])?;

    let headers = [
        "Bearer".to_string(),
        "Bearer ".to_string(),
        format!("Basic {token}"),
        format!("Bearer {token} extra"),
    ];
    for header in &headers {
        let res = app.get("/counted", Some(header.as_str())).await?;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "header {header:?}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn valid_admin_token_reaches_handler() -> Result<()> {
    let (app, calls) = counted_app()?;
    let token = app.token("12345678", &[ROLE_ADMIN])?;

    let res = app.get_bearer("/counted", &token).await?;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let claims = Claims::issued_at(
        "12345678",
        ISSUER,
        [ROLE_ADMIN],
        Utc::now() - Duration::hours(2),
        Duration::hours(1),
    );
    let token = app.sign(&claims)?;

    let res = app.get_bearer("/test/auth", &token).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()?["message"], "authentication failed: token has expired");
    Ok(())
}

#[tokio::test]
async fn token_issued_in_the_future_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let claims = Claims::issued_at(
        "12345678",
        ISSUER,
        [ROLE_ADMIN],
        Utc::now() + Duration::minutes(10),
        Duration::hours(1),
    );
    let token = app.sign(&claims)?;

    let res = app.get_bearer("/test/auth", &token).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()?["message"], "authentication failed: token is not valid yet");
    Ok(())
}

#[tokio::test]
async fn unsigned_token_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let claims = Claims::new("12345678", ISSUER, [ROLE_ADMIN], Duration::hours(1));

    let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"none","typ":"JWT","kid":"{KID}"}}"#));
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let token = format!("{header}.{payload}.");

    let res = app.get_bearer("/test/auth", &token).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(res.json()?["message"].as_str().unwrap_or_default().contains("'none'"));
    Ok(())
}

#[tokio::test]
async fn foreign_issuer_is_denied_by_authentication_policy() -> Result<()> {
    let app = TestApp::new()?;
    let claims = Claims::new("12345678", "someone else", [ROLE_ADMIN], Duration::hours(1));
    let token = app.sign(&claims)?;

    let res = app.get_bearer("/test/auth", &token).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(res.json()?["message"].as_str().unwrap_or_default().contains("policy"));
    Ok(())
}

#[tokio::test]
async fn token_from_unknown_key_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let other = TestApp::new()?;
    let token = other.token("12345678", &[ROLE_ADMIN])?;

    // Same kid, different key material.
    let res = app.get_bearer("/test/auth", &token).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()?["message"], "authentication failed: signature is invalid");
    Ok(())
}
