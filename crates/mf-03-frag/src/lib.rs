//! # MF-03 Frag
//!
//! Messages larger than the bus payload limit travel as a series of
//! fragments. Each fragment is a complete HTTP message with a copy of the
//! original head, a `Fabric-Fragment: i/N` header and a slice of the body.
//!
//! ## Reassembly
//!
//! - Fragments may arrive in any order and interleaved with other messages.
//! - `DefragAccumulator` holds the fragments of one message.
//! - `Defragger` keys accumulators by message and drops them on completion,
//!   on error, or when `reap_expired` finds them idle.

pub mod domain;
pub mod service;

pub use domain::{fragment, DefragAccumulator, FragError};
pub use service::Defragger;
