use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use serde_json::{Map, Value};

use crate::auth::{AuthError, Authenticator};
use crate::policy::{Policy, PolicyEngine};
use crate::web::{Handler, HandlerResult, Middleware, PathParams, RequestContext};

/// Validates the bearer token and stores its claims on the request context.
pub struct Authenticate {
    authenticator: Arc<Authenticator>,
}

impl Authenticate {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl Middleware for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(AuthenticateHandler {
            authenticator: self.authenticator.clone(),
            next,
        })
    }
}

struct AuthenticateHandler {
    authenticator: Arc<Authenticator>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        // A missing or non-ASCII header is treated like an empty one.
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        let claims = self.authenticator.authenticate(header).map_err(|err| {
            tracing::warn!(
                trace_id = %ctx.trace_id,
                code = err.code(),
                error = %err,
                "authentication failed"
            );
            err
        })?;

        tracing::debug!(trace_id = %ctx.trace_id, subject = %claims.subject, "authenticated");
        ctx.claims = Some(claims);

        self.next.call(ctx, req).await
    }
}

/// Evaluates a [`Policy`] against the authenticated claims.
///
/// The policy input is `{roles, subject}` plus, when an owner parameter is
/// configured, the value of that route parameter under the same name.
pub struct Authorize {
    engine: Arc<PolicyEngine>,
    policy: Policy,
    owner_param: Option<&'static str>,
}

impl Authorize {
    pub fn new(engine: Arc<PolicyEngine>, policy: Policy) -> Self {
        Self {
            engine,
            policy,
            owner_param: None,
        }
    }

    /// Pass the route parameter `name` (e.g. `user_id`) to the policy.
    pub fn with_owner_param(mut self, name: &'static str) -> Self {
        self.owner_param = Some(name);
        self
    }
}

impl Middleware for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(AuthorizeHandler {
            engine: self.engine.clone(),
            policy: self.policy,
            owner_param: self.owner_param,
            next,
        })
    }
}

struct AuthorizeHandler {
    engine: Arc<PolicyEngine>,
    policy: Policy,
    owner_param: Option<&'static str>,
    next: Arc<dyn Handler>,
}

impl AuthorizeHandler {
    fn input(&self, ctx: &RequestContext, req: &Request) -> Result<Map<String, Value>, AuthError> {
        let claims = ctx.claims.as_ref().ok_or(AuthError::MissingClaims)?;

        let mut input = Map::new();
        input.insert(
            "roles".to_string(),
            Value::Array(claims.roles.iter().cloned().map(Value::String).collect()),
        );
        input.insert("subject".to_string(), Value::String(claims.subject.clone()));

        if let Some(param) = self.owner_param {
            let owner = req
                .extensions()
                .get::<PathParams>()
                .and_then(|params| params.get(param));
            if let Some(owner) = owner {
                input.insert(param.to_string(), Value::String(owner.to_string()));
            }
        }

        Ok(input)
    }

    fn authorize(&self, ctx: &RequestContext, req: &Request) -> Result<(), AuthError> {
        let input = self.input(ctx, req)?;
        let rule = self.policy.to_string();

        match self.engine.check(self.policy, &input) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::Forbidden {
                rule,
                reason: "rule evaluated to false".to_string(),
            }),
            Err(err) => {
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    policy = %self.policy,
                    error = %err,
                    "policy evaluation failed"
                );
                Err(AuthError::Forbidden {
                    rule,
                    reason: "rule evaluation failed".to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Handler for AuthorizeHandler {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        if let Err(err) = self.authorize(ctx, &req) {
            tracing::warn!(
                trace_id = %ctx.trace_id,
                code = err.code(),
                policy = %self.policy,
                "authorization failed"
            );
            return Err(err.into());
        }

        self.next.call(ctx, req).await
    }
}
