//! # MF-04 Pub
//!
//! Outbound side of the fabric.
//!
//! ```rust,ignore
//! use mf_04_pub::{header, json, post, time_budget, Publisher};
//!
//! let res = publisher
//!     .request(&ctx, vec![
//!         post("https://inventory.example/reserve"),
//!         header("X-Tenant", "acme"),
//!         json(&order),
//!         time_budget(Duration::from_secs(2)),
//!     ])
//!     .await?;
//! ```
//!
//! ## Time Budgets
//!
//! The frame carries the smaller of the request's own budget and what the
//! caller has left, so every hop sees a strictly shrinking deadline.

pub mod domain;
pub mod ports;
pub mod stream;

pub use domain::*;
pub use ports::Publisher;
pub use stream::{ResponseItem, ResponseSink, ResponseStream};
