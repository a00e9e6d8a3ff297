//! # Shared Bus - Message Transport
//!
//! The fabric puts encoded HTTP messages on a subject-addressed bus. This
//! crate defines the `Transport` capability the dispatcher is written
//! against, plus an in-memory implementation used by tests and by services
//! that run in one process.
//!
//! ## Delivery Model
//!
//! ```text
//!                      publish("calc:443/add")
//!                               │
//!                               ▼
//!                     ┌──────────────────┐
//!                     │   InMemoryBus    │
//!                     └──────────────────┘
//!            ┌──────────────┼──────────────────┐
//!            ▼              ▼                  ▼
//!      pervasive #1    pervasive #2    queue "calc" (one of N)
//! ```
//!
//! - Every pervasive subscriber of a subject receives each message.
//! - Each queue group receives each message once, round-robin among members.
//! - `publish` reports how many subscribers the message was delivered to.
//! - Payloads above `max_payload` are rejected; callers fragment first.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod publisher;
pub mod subscriber;

pub use publisher::{InMemoryBus, Transport, TransportError};
pub use subscriber::{BusMessage, BusSubscription};

/// Messages to buffer per subscriber before dropping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default per-message payload limit (1 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;
