//! Connector error types.

use shared_types::{ErrorKind, TracedError};
use thiserror::Error;

/// HTTP status used when a call chain is too deep.
pub const LOOP_DETECTED: u16 = 508;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("invalid hostname {0:?}")]
    InvalidHostname(String),

    #[error("connector is already started")]
    AlreadyStarted,

    #[error("connector is not started")]
    NotStarted,

    #[error("connector was dropped")]
    Gone,

    #[error("call depth {depth} exceeds {max}")]
    CallDepthExceeded { depth: u32, max: u32 },

    #[error("callback {0:?} is already registered")]
    DuplicateCallback(String),
}

impl From<ConnectorError> for TracedError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::InvalidHostname(_) | ConnectorError::DuplicateCallback(_) => {
                TracedError::from_error(err).of_kind(ErrorKind::InvalidArgument)
            }
            ConnectorError::CallDepthExceeded { .. } => TracedError::from_error(err)
                .of_kind(ErrorKind::Internal)
                .with_status(LOOP_DETECTED),
            _ => TracedError::from_error(err).of_kind(ErrorKind::Internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: TracedError = ConnectorError::InvalidHostname("-".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: TracedError = ConnectorError::CallDepthExceeded { depth: 65, max: 64 }.into();
        assert_eq!(err.status_code(), LOOP_DETECTED);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
