use thiserror::Error;

/// Failures while compiling or evaluating policy modules.
///
/// Every variant is a deny from the caller's point of view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("compiling policy module {module}: {reason}")]
    Compile { module: String, reason: String },

    #[error("unknown rule data.{package}.{rule}")]
    UnknownRule { package: String, rule: String },

    #[error("evaluating policy: {0}")]
    Evaluation(String),

    #[error("policy data.{package}.{rule} produced no result set")]
    NoResult { package: String, rule: String },

    #[error("binding '{binding}' is not a boolean: {found}")]
    BindingType { binding: String, found: String },
}

impl PolicyError {
    pub(crate) fn compile(module: impl Into<String>, reason: impl Into<String>) -> Self {
        PolicyError::Compile {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_rule(package: &str, rule: &str) -> Self {
        PolicyError::UnknownRule {
            package: package.to_string(),
            rule: rule.to_string(),
        }
    }
}
