//! Domain layer for outbound requests.

pub mod error;
pub mod options;
pub mod request;

pub use error::PubError;
pub use options::*;
pub use request::{parse_url, Request};
