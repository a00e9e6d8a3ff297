//! Fragmentation error types.

use shared_types::{ErrorKind, FrameError, TracedError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragError {
    #[error("fragment {0} is missing")]
    MissingFragment(u32),

    #[error("fragment {0} has a bad content length")]
    BadLength(u32),

    #[error("fragment {0} has no body")]
    MissingBody(u32),

    #[error(transparent)]
    BadFragmentHeader(#[from] FrameError),

    #[error("invalid fragment size {0}")]
    InvalidSize(usize),
}

impl From<FragError> for TracedError {
    fn from(err: FragError) -> Self {
        let kind = match err {
            FragError::InvalidSize(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::MalformedFragment,
        };
        TracedError::from_error(err).of_kind(kind)
    }
}
