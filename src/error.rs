// HTTP API Error Types
use axum::{response::IntoResponse, http::StatusCode, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::policy::PolicyError;

/// Message returned to clients for every untrusted error.
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Every variant except [`ApiError::Internal`] is *trusted*: its message is
/// written to the response body verbatim. `Internal` keeps its detail for the
/// server log and answers the client with [`INTERNAL_MESSAGE`].
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),

    // 500 Internal Server Error
    Internal { detail: String },
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::Internal { .. } => 500,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::Internal { .. } => INTERNAL_MESSAGE,
        }
    }

    /// Whether the message may be shown to the client as-is.
    pub fn is_trusted(&self) -> bool {
        !matches!(self, ApiError::Internal { .. })
    }

    /// Full server-side description, including untrusted detail.
    pub fn detail(&self) -> &str {
        match self {
            ApiError::Internal { detail } => detail,
            other => other.message(),
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl ApiError {
    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        ApiError::Internal { detail: detail.into() }
    }
}

// Authentication failures share one 401 class; the specific cause stays in the logs.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_authorization() {
            ApiError::forbidden(err.to_string())
        } else {
            ApiError::unauthorized(format!("authentication failed: {err}"))
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        ApiError::internal(err.to_string())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_never_in_body() {
        let err = ApiError::internal("connection refused to 10.0.0.3:5432");
        let body = err.to_json();

        assert_eq!(err.status_code(), 500);
        assert!(!err.is_trusted());
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        assert!(!body.to_string().contains("10.0.0.3"));
        assert_eq!(err.detail(), "connection refused to 10.0.0.3:5432");
    }

    #[test]
    fn test_validation_error_carries_field_errors() {
        let mut fields = HashMap::new();
        fields.insert("user_id".to_string(), "must be a UUID".to_string());
        let err = ApiError::validation_error("invalid input", Some(fields));

        let body = err.to_json();
        assert_eq!(err.status_code(), 400);
        assert!(err.is_trusted());
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["user_id"], "must be a UUID");
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        let err: ApiError = AuthError::TokenExpired.into();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.message(), "authentication failed: token has expired");

        let err: ApiError = AuthError::PolicyDenied("rule evaluated to false".into()).into();
        assert_eq!(err.status_code(), 401);

        let err: ApiError = AuthError::Forbidden {
            rule: "data.sales.authz.rule_admin_only".into(),
            reason: "rule evaluated to false".into(),
        }
        .into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[test]
    fn test_policy_errors_are_untrusted() {
        let err: ApiError = PolicyError::Evaluation("boom".into()).into();
        assert!(!err.is_trusted());
        assert_eq!(err.status_code(), 500);
    }
}
