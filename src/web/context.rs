use std::collections::HashMap;
use std::time::Instant;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Claims;

/// Per-request state threaded through the middleware chain by `&mut`.
///
/// Created by the router adapter before the outermost middleware runs and
/// dropped when the response has been produced. Never shared between requests.
#[derive(Debug)]
pub struct RequestContext {
    pub trace_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub start: Instant,
    pub method: Method,
    pub path: String,
    /// Route template the request matched, e.g. `/users/:user_id`.
    pub route: String,
    /// Set when a response is produced; read by the logger and metrics on the way out.
    pub status_code: Option<StatusCode>,
    /// Set by the authenticate middleware.
    pub claims: Option<Claims>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            started_at: Utc::now(),
            start: Instant::now(),
            method,
            path: path.into(),
            route: route.into(),
            status_code: None,
            claims: None,
        }
    }

    /// Build a JSON response and record its status.
    pub fn respond<T: Serialize>(&mut self, status: StatusCode, body: T) -> Response {
        self.status_code = Some(status);
        (status, Json(body)).into_response()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

/// Named path parameters of the matched route, inserted into request extensions.
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}
