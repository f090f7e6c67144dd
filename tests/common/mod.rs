#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sales_api::auth::{issue_token, Authenticator, Claims};
use sales_api::cli::commands::genkey::write_key;
use sales_api::handlers::{api_pipeline, ApiMuxConfig};
use sales_api::keystore::KeyStore;
use sales_api::metrics::ApiMetrics;
use sales_api::policy::PolicyEngine;
use sales_api::web::Pipeline;

pub const KID: &str = "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1";
pub const ISSUER: &str = "service project";

/// The service router over a fresh key folder.
pub struct TestApp {
    _dir: TempDir,
    pub keys: Arc<KeyStore>,
    pub metrics: ApiMetrics,
    pub router: Router,
}

pub struct TestAppBuilder {
    overrides: Vec<String>,
    request_timeout: Duration,
    extra: Option<Box<dyn FnOnce(Pipeline, &ApiMuxConfig) -> Pipeline>>,
}

impl TestAppBuilder {
    /// Replace bundled policy rules with the given module texts.
    pub fn policy(mut self, module: &str) -> Self {
        self.overrides.push(module.to_string());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Register extra routes inside the service's global chain.
    pub fn routes(
        mut self,
        extra: impl FnOnce(Pipeline, &ApiMuxConfig) -> Pipeline + 'static,
    ) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }

    pub fn build(self) -> Result<TestApp> {
        let dir = tempfile::tempdir()?;
        write_key(dir.path(), KID)?;
        let keys = Arc::new(KeyStore::load(dir.path())?);

        let engine = Arc::new(PolicyEngine::with_modules(&self.overrides)?);
        let authenticator = Authenticator::new(keys.clone(), ISSUER).with_policy(engine.clone());
        let metrics = ApiMetrics::new()?;

        let cfg = ApiMuxConfig {
            keys: keys.clone(),
            authenticator: Arc::new(authenticator),
            engine,
            metrics: metrics.clone(),
            request_timeout: self.request_timeout,
        };

        let mut pipeline = api_pipeline(&cfg);
        if let Some(extra) = self.extra {
            pipeline = extra(pipeline, &cfg);
        }

        Ok(TestApp {
            _dir: dir,
            keys,
            metrics,
            router: pipeline.into_router(),
        })
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).with_context(|| format!("body is not JSON: {}", self.body))
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            overrides: Vec::new(),
            request_timeout: Duration::from_secs(5),
            extra: None,
        }
    }

    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn token(&self, subject: &str, roles: &[&str]) -> Result<String> {
        let ttl = chrono::Duration::hours(1);
        let claims = Claims::new(subject, ISSUER, roles.iter().copied(), ttl);
        Ok(issue_token(&self.keys, KID, &claims)?)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(issue_token(&self.keys, KID, claims)?)
    }

    pub async fn get(&self, uri: &str, authorization: Option<&str>) -> Result<TestResponse> {
        let mut request = Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        let response = self.router.clone().oneshot(request.body(Body::empty())?).await?;

        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(TestResponse {
            status,
            body: String::from_utf8(bytes.to_vec())?,
        })
    }

    pub async fn get_bearer(&self, uri: &str, token: &str) -> Result<TestResponse> {
        self.get(uri, Some(&format!("Bearer {token}"))).await
    }
}
