//! Handler and middleware composition.
//!
//! A [`Handler`] takes the request context and the request and produces a
//! response or an [`ApiError`]. A [`Middleware`] wraps one handler in another.
//! [`Chain`] composes an ordered list of middleware, first entry outermost, and
//! [`Pipeline`] registers each route as `global(route(handler))` on an axum
//! router.

mod context;

pub use context::{PathParams, RequestContext};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::Router;
use futures::future::BoxFuture;

use crate::error::ApiError;

pub type HandlerResult = Result<Response, ApiError>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult;
}

/// Wraps a handler with cross-cutting behavior.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Request) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        (self.0)(ctx, req).await
    }
}

/// Turn a function returning a boxed future into a [`Handler`].
///
/// ```ignore
/// fn status(ctx: &mut RequestContext, _req: Request) -> BoxFuture<'_, HandlerResult> {
///     async move { Ok(ctx.respond(StatusCode::OK, json!({"status": "OK"}))) }.boxed()
/// }
/// let handler = handler_fn(status);
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut RequestContext, Request) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Records the status of successful responses on the context.
struct RecordStatus(Arc<dyn Handler>);

#[async_trait]
impl Handler for RecordStatus {
    async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
        let response = self.0.call(ctx, req).await?;
        ctx.status_code = Some(response.status());
        Ok(response)
    }
}

/// Ordered middleware list. The first entry is the outermost layer.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `handler` so the first layer runs first.
    pub fn then(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, middleware| middleware.wrap(next))
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Route table whose every handler runs inside the global middleware chain.
pub struct Pipeline {
    global: Chain,
    router: Router,
}

impl Pipeline {
    pub fn new(global: Chain) -> Self {
        Self {
            global,
            router: Router::new(),
        }
    }

    /// Register `handler` for `method` and `path`, wrapped in `route`
    /// middleware and then the global middleware.
    pub fn handle(
        mut self,
        method: MethodFilter,
        path: &str,
        handler: Arc<dyn Handler>,
        route: Chain,
    ) -> Self {
        let composed = self.global.then(route.then(Arc::new(RecordStatus(handler))));

        tracing::debug!(
            path,
            global = ?self.global,
            route = ?route,
            "route registered"
        );

        let template = path.to_string();
        let endpoint = move |params: Option<Path<HashMap<String, String>>>, mut req: Request| {
            let handler = composed.clone();
            let template = template.clone();
            async move {
                let params = params.map(|Path(params)| params).unwrap_or_default();
                req.extensions_mut().insert(PathParams(params));

                let mut ctx = RequestContext::new(req.method().clone(), req.uri().path(), template);
                match handler.call(&mut ctx, req).await {
                    Ok(response) => response,
                    Err(err) => err.into_response(),
                }
            }
        };

        self.router = self.router.route(path, on(method, endpoint));
        self
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use futures::FutureExt;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Tag {
        name: &'static str,
        trace: Trace,
    }

    struct Tagged {
        name: &'static str,
        trace: Trace,
        next: Arc<dyn Handler>,
    }

    #[async_trait]
    impl Handler for Tagged {
        async fn call(&self, ctx: &mut RequestContext, req: Request) -> HandlerResult {
            self.trace.lock().unwrap().push(format!("{}:in", self.name));
            let result = self.next.call(ctx, req).await;
            self.trace.lock().unwrap().push(format!("{}:out", self.name));
            result
        }
    }

    impl Middleware for Tag {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
            Arc::new(Tagged {
                name: self.name,
                trace: self.trace.clone(),
                next,
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn wrap(&self, _next: Arc<dyn Handler>) -> Arc<dyn Handler> {
            handler_fn(|_ctx, _req| async { Err(ApiError::forbidden("nope")) }.boxed())
        }
    }

    fn ok(ctx: &mut RequestContext, _req: Request) -> BoxFuture<'_, HandlerResult> {
        async move { Ok(ctx.respond(StatusCode::OK, json!({"status": "OK"}))) }.boxed()
    }

    fn echo_params(ctx: &mut RequestContext, req: Request) -> BoxFuture<'_, HandlerResult> {
        async move {
            let params = req.extensions().get::<PathParams>().cloned().unwrap_or_default();
            let body = json!({"id": params.get("id"), "route": ctx.route});
            Ok(ctx.respond(StatusCode::OK, body))
        }
        .boxed()
    }

    fn request(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_chain_runs_first_layer_outermost() {
        let trace: Trace = Arc::default();
        let chain = Chain::new()
            .with(Tag { name: "a", trace: trace.clone() })
            .with(Tag { name: "b", trace: trace.clone() });
        assert_eq!(chain.names(), vec!["a", "b"]);

        let handler = chain.then(handler_fn(ok));
        let mut ctx = RequestContext::new(axum::http::Method::GET, "/", "/");
        let response = handler.call(&mut ctx, request("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*trace.lock().unwrap(), vec!["a:in", "b:in", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_layers_but_unwinds_outer() {
        let trace: Trace = Arc::default();
        let chain = Chain::new()
            .with(Tag { name: "outer", trace: trace.clone() })
            .with(Reject)
            .with(Tag { name: "inner", trace: trace.clone() });

        let handler = chain.then(handler_fn(ok));
        let mut ctx = RequestContext::new(axum::http::Method::GET, "/", "/");
        let err = handler.call(&mut ctx, request("/")).await.unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert_eq!(*trace.lock().unwrap(), vec!["outer:in", "outer:out"]);
    }

    #[tokio::test]
    async fn test_pipeline_applies_global_then_route_middleware() {
        let trace: Trace = Arc::default();
        let global = Chain::new().with(Tag { name: "global", trace: trace.clone() });
        let route = Chain::new().with(Tag { name: "route", trace: trace.clone() });

        let router = Pipeline::new(global)
            .handle(MethodFilter::GET, "/open", handler_fn(ok), Chain::new())
            .handle(MethodFilter::GET, "/guarded", handler_fn(ok), route)
            .into_router();

        router.clone().oneshot(request("/open")).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["global:in", "global:out"]);

        trace.lock().unwrap().clear();
        router.oneshot(request("/guarded")).await.unwrap();
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["global:in", "route:in", "route:out", "global:out"]
        );
    }

    #[tokio::test]
    async fn test_pipeline_exposes_path_params_and_route_template() {
        let router = Pipeline::new(Chain::new())
            .handle(MethodFilter::GET, "/items/:id", handler_fn(echo_params), Chain::new())
            .into_router();

        let response = router.oneshot(request("/items/42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"id": "42", "route": "/items/:id"}));
    }

    #[tokio::test]
    async fn test_unhandled_error_still_produces_a_response() {
        let router = Pipeline::new(Chain::new().with(Reject))
            .handle(MethodFilter::GET, "/", handler_fn(ok), Chain::new())
            .into_router();

        let response = router.oneshot(request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_record_status_sets_context() {
        let handler: Arc<dyn Handler> = Arc::new(RecordStatus(handler_fn(|_ctx, _req| {
            async { Ok(StatusCode::ACCEPTED.into_response()) }.boxed()
        })));
        let mut ctx = RequestContext::new(axum::http::Method::GET, "/", "/");
        handler.call(&mut ctx, request("/")).await.unwrap();
        assert_eq!(ctx.status_code, Some(StatusCode::ACCEPTED));
    }
}
