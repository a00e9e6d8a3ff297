//! Subscription errors.

use shared_types::{ErrorKind, TracedError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubError {
    #[error("invalid subscription path {0:?}")]
    InvalidSpec(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("subscription has no host")]
    MissingHost,

    #[error("invalid queue name {0:?}")]
    InvalidQueue(String),
}

impl From<SubError> for TracedError {
    fn from(err: SubError) -> Self {
        TracedError::from_error(err).of_kind(ErrorKind::InvalidArgument)
    }
}
