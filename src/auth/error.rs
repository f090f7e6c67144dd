use thiserror::Error;

/// Authentication and authorization failures.
///
/// Every variant is safe to show to the client; [`AuthError::code`] gives a
/// stable identifier for logs so policy denials can be told apart from
/// cryptographic failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("expected authorization header format: Bearer <token>")]
    MalformedHeader,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("unknown key id '{0}'")]
    KeyNotFound(String),

    #[error("key material unusable: {0}")]
    KeyUnusable(String),

    #[error("signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is not valid yet")]
    TokenNotYetValid,

    #[error("authentication policy denied the token: {0}")]
    PolicyDenied(String),

    #[error("clock skew {0:?} is out of range")]
    ClockSkewOutOfRange(std::time::Duration),

    #[error("signing token: {0}")]
    Signing(String),

    #[error("no claims found, authenticate must run before authorize")]
    MissingClaims,

    #[error("you are not authorized for that action, rule[{rule}]: {reason}")]
    Forbidden { rule: String, reason: String },
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MalformedHeader => "MALFORMED_HEADER",
            AuthError::MalformedToken(_) => "MALFORMED_TOKEN",
            AuthError::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            AuthError::KeyNotFound(_) => "KEY_NOT_FOUND",
            AuthError::KeyUnusable(_) => "KEY_UNUSABLE",
            AuthError::SignatureInvalid => "SIGNATURE_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            AuthError::PolicyDenied(_) => "POLICY_DENIED",
            AuthError::ClockSkewOutOfRange(_) => "CLOCK_SKEW_OUT_OF_RANGE",
            AuthError::Signing(_) => "SIGNING_FAILED",
            AuthError::MissingClaims => "MISSING_CLAIMS",
            AuthError::Forbidden { .. } => "FORBIDDEN",
        }
    }

    /// True when the caller was identified but is not allowed to proceed (403),
    /// false for failures to establish identity (401).
    pub fn is_authorization(&self) -> bool {
        matches!(self, AuthError::Forbidden { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm("algorithm mismatch".into())
            }
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidKeyFormat => AuthError::KeyUnusable(err.to_string()),
            _ => AuthError::MalformedToken(err.to_string()),
        }
    }
}
