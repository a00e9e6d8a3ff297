//! # MF-05 Sub
//!
//! Inbound side of the fabric: where a service listens and what runs when a
//! request arrives.
//!
//! A subscription is an endpoint (`https://host:port/path`) plus a queue
//! policy. Subscriptions in a named queue group are load-balanced across the
//! instances of the service; pervasive subscriptions deliver every request to
//! every instance.

pub mod domain;
pub mod handler;

pub use domain::*;
pub use handler::{handler, json_response, ok, Handler, HandlerResult, Incoming};
