//! Domain layer for subscriptions.

pub mod error;
pub mod options;
pub mod subscription;

pub use error::SubError;
pub use options::*;
pub use subscription::{new_sub, Subscription};
