//! Request construction errors.

use shared_types::{ErrorKind, TracedError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PubError {
    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request has no URL")]
    MissingUrl,

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("invalid body: {0}")]
    InvalidBody(String),
}

impl PubError {
    pub(crate) fn url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<PubError> for TracedError {
    fn from(err: PubError) -> Self {
        TracedError::from_error(err).of_kind(ErrorKind::InvalidArgument)
    }
}
