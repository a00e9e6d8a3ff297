//! Domain layer: pending calls, reply messages, callbacks and errors.

pub mod callback;
pub mod error;
pub mod pending;
pub mod wire;

pub use callback::{callback, Callback, CallbackHandler};
pub use error::{ConnectorError, LOOP_DETECTED};
pub use pending::{PendingGuard, PendingStats, PendingStore};
pub use wire::{decode_error, encode_error, Reply, ReplyFrame};
