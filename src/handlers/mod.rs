// handlers/mod.rs - Route table
//
// Public (global chain only) → Protected (Authenticate + Authorize per route)

pub mod protected;
pub mod public;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::MethodFilter;
use axum::Router;

use crate::auth::Authenticator;
use crate::keystore::KeyStore;
use crate::metrics::ApiMetrics;
use crate::middleware::{Authenticate, Authorize, Deadline, Errors, Logger, Metrics, Panics};
use crate::policy::{Policy, PolicyEngine};
use crate::web::{handler_fn, Chain, Pipeline};

/// Collaborators the routes are built from.
pub struct ApiMuxConfig {
    pub keys: Arc<KeyStore>,
    pub authenticator: Arc<Authenticator>,
    pub engine: Arc<PolicyEngine>,
    pub metrics: ApiMetrics,
    pub request_timeout: Duration,
}

/// Global middleware, outermost first.
pub fn global_chain(metrics: &ApiMetrics, request_timeout: Duration) -> Chain {
    Chain::new()
        .with(Panics::new(Some(metrics.clone())))
        .with(Errors)
        .with(Metrics::new(metrics.clone()))
        .with(Logger)
        .with(Deadline::new(request_timeout))
}

/// Authenticate, then `authorize`.
pub fn protected_chain(cfg: &ApiMuxConfig, authorize: Authorize) -> Chain {
    Chain::new()
        .with(Authenticate::new(cfg.authenticator.clone()))
        .with(authorize)
}

/// The service's pipeline with every route registered.
pub fn api_pipeline(cfg: &ApiMuxConfig) -> Pipeline {
    Pipeline::new(global_chain(&cfg.metrics, cfg.request_timeout))
        // Public
        .handle(
            MethodFilter::GET,
            "/health",
            Arc::new(public::Health::new(cfg.keys.clone())),
            Chain::new(),
        )
        .handle(
            MethodFilter::GET,
            "/metrics",
            Arc::new(public::MetricsExport::new(cfg.metrics.clone())),
            Chain::new(),
        )
        .handle(MethodFilter::GET, "/test", handler_fn(public::test), Chain::new())
        // Protected
        .handle(
            MethodFilter::GET,
            "/test/auth",
            handler_fn(protected::test_auth),
            protected_chain(cfg, Authorize::new(cfg.engine.clone(), Policy::AdminOnly)),
        )
        .handle(
            MethodFilter::GET,
            "/users/:user_id",
            handler_fn(protected::query_by_id),
            protected_chain(
                cfg,
                Authorize::new(cfg.engine.clone(), Policy::AdminOrSubject)
                    .with_owner_param("user_id"),
            ),
        )
}

pub fn api_mux(cfg: &ApiMuxConfig) -> Router {
    api_pipeline(cfg).into_router()
}
