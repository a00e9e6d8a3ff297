//! Config error types.

use shared_types::{ErrorKind, TracedError};
use thiserror::Error;

/// Errors from defining, setting or validating config properties.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid validation rule {rule:?}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid config name {0:?}")]
    InvalidName(String),

    #[error("default value of {name} does not satisfy {rule:?}")]
    InvalidDefault { name: String, rule: String },

    #[error("value of {name} does not satisfy {rule:?}")]
    InvalidValue { name: String, rule: String },

    #[error("config {0} is already defined")]
    Duplicate(String),

    #[error("config {0} is not defined")]
    Undefined(String),
}

impl ConfigError {
    pub(crate) fn rule(rule: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for TracedError {
    fn from(err: ConfigError) -> Self {
        TracedError::from_error(err).of_kind(ErrorKind::InvalidArgument)
    }
}
