use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_USER: &str = "USER";

/// Identity and role assertions carried by a verified token.
///
/// Serialized with the registered claim names (`sub`, `iss`, `iat`, `exp`,
/// `nbf`) plus the custom `roles` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub subject: String,

    #[serde(rename = "iss")]
    pub issuer: String,

    #[serde(default)]
    pub roles: BTreeSet<String>,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    #[serde(
        rename = "nbf",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub not_before: Option<DateTime<Utc>>,
}

impl Claims {
    /// Claims issued now and valid for `ttl`.
    pub fn new<I, R>(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        roles: I,
        ttl: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        // Token timestamps have second precision.
        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_else(Utc::now);
        Self::issued_at(subject, issuer, roles, now, ttl)
    }

    pub fn issued_at<I, R>(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        roles: I,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            issued_at,
            expires_at: issued_at + ttl,
            not_before: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
