//! Bearer token authentication.
//!
//! Tokens are compact JWS strings signed with Ed25519 (`alg: EdDSA`). The key
//! used for verification is resolved from the [`KeyStore`] by the `kid` in
//! the token header. Any other algorithm, `none` included, is rejected before
//! a key is ever looked up.

mod claims;
mod error;

pub use claims::{Claims, ROLE_ADMIN, ROLE_USER};
pub use error::AuthError;

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::keystore::{KeyStore, KeyStoreError};
use crate::policy::{Policy, PolicyEngine};

/// The only algorithm tokens may declare.
pub const SIGNING_ALGORITHM: &str = "EdDSA";

pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Verifies bearer tokens and produces [`Claims`].
///
/// Authentication never decides authorization; that is the job of the
/// [`PolicyEngine`] rules evaluated by the authorize middleware. When built
/// with [`Authenticator::with_policy`] the final accept/reject is however
/// delegated to the `Authenticate` policy, so issuer allow-lists and similar
/// checks can change without touching this code.
pub struct Authenticator {
    keys: Arc<KeyStore>,
    issuer: String,
    clock_skew: Duration,
    policy: Option<Arc<PolicyEngine>>,
}

impl Authenticator {
    pub fn new(keys: Arc<KeyStore>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS as i64),
            policy: None,
        }
    }

    pub fn with_clock_skew(mut self, skew: std::time::Duration) -> Result<Self, AuthError> {
        self.clock_skew =
            Duration::from_std(skew).map_err(|_| AuthError::ClockSkewOutOfRange(skew))?;
        Ok(self)
    }

    pub fn with_policy(mut self, engine: Arc<PolicyEngine>) -> Self {
        self.policy = Some(engine);
        self
    }

    /// Validate an `Authorization` header value of the form `Bearer <token>`.
    pub fn authenticate(&self, authorization: &str) -> Result<Claims, AuthError> {
        let token = parse_bearer(authorization)?;
        self.verify_at(token, Utc::now())
    }

    /// Verify a raw token as of `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let header = decode_token_header(token)?;

        if header.alg != SIGNING_ALGORITHM {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("header is missing 'kid'".into()))?;

        let public_pem = self.keys.public_key(&kid).map_err(|e| match e {
            KeyStoreError::NotFound(kid) => AuthError::KeyNotFound(kid),
            other => AuthError::KeyUnusable(other.to_string()),
        })?;

        let decoding_key = DecodingKey::from_ed_pem(public_pem.as_bytes())?;

        // Time checks are done below against `now` with our own skew handling.
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation)?.claims;

        self.check_times(&claims, now)?;

        if let Some(engine) = &self.policy {
            self.delegate(engine, &public_pem, token, &claims)?;
        }

        tracing::debug!(
            kid = %kid,
            subject = %claims.subject,
            "token verified"
        );

        Ok(claims)
    }

    fn check_times(&self, claims: &Claims, now: DateTime<Utc>) -> Result<(), AuthError> {
        if claims.expires_at <= claims.issued_at {
            return Err(AuthError::MalformedToken("exp must be after iat".into()));
        }
        // A bound past the representable range never trips.
        let expired = claims
            .expires_at
            .checked_add_signed(self.clock_skew)
            .is_some_and(|deadline| now > deadline);
        if expired {
            return Err(AuthError::TokenExpired);
        }

        if let Some(latest) = now.checked_add_signed(self.clock_skew) {
            let starts = claims
                .not_before
                .map_or(claims.issued_at, |nbf| nbf.max(claims.issued_at));
            if starts > latest {
                return Err(AuthError::TokenNotYetValid);
            }
        }
        Ok(())
    }

    fn delegate(
        &self,
        engine: &PolicyEngine,
        public_pem: &str,
        token: &str,
        claims: &Claims,
    ) -> Result<(), AuthError> {
        let mut input = Map::new();
        input.insert("key".into(), Value::String(public_pem.to_string()));
        input.insert("token".into(), Value::String(token.to_string()));
        input.insert("iss".into(), Value::String(claims.issuer.clone()));
        input.insert("expected_iss".into(), Value::String(self.issuer.clone()));

        match engine.check(Policy::Authenticate, &input) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::PolicyDenied("rule evaluated to false".into())),
            Err(e) => {
                tracing::warn!(error = %e, "authentication policy evaluation failed");
                Err(AuthError::PolicyDenied("rule evaluation failed".into()))
            }
        }
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn parse_bearer(authorization: &str) -> Result<&str, AuthError> {
    let mut parts = authorization.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::MalformedHeader),
    }
}

fn decode_token_header(token: &str) -> Result<TokenHeader, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(
            "token must have 3 parts separated by dots".into(),
        ));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|e| AuthError::MalformedToken(format!("decoding header: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("parsing header: {e}")))
}

/// Sign `claims` with the private key stored under `kid`.
pub fn issue_token(keys: &KeyStore, kid: &str, claims: &Claims) -> Result<String, AuthError> {
    let pair = keys.get(kid).map_err(|_| AuthError::KeyNotFound(kid.to_string()))?;
    let der = pair.private_der().map_err(|e| AuthError::KeyUnusable(e.to_string()))?;

    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(kid.to_string());

    jsonwebtoken::encode(&header, claims, &EncodingKey::from_ed_der(&der))
        .map_err(|e| AuthError::Signing(e.to_string()))
}
