//! # MF-06 Connector
//!
//! The dispatcher of a fabric service. A `Connector` binds handlers to
//! subscriptions, publishes requests on behalf of the service and its
//! handlers, and runs the startup, shutdown and ticker callbacks.
//!
//! ## Architecture
//!
//! ```text
//!            ┌────────────────────── Connector ──────────────────────┐
//! request ──►│ outbound: frame ─► fragment ─► publish ─► await replies │
//!            │ inbound:  read ─► ack ─► defrag ─► serve ─► reply       │
//!            │ tickers, reaper, lifecycle callbacks, config registry   │
//!            └─────────────────────────┬───────────────────────────────┘
//!                                      ▼
//!                              Transport (shared-bus)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mf_06_connector::Connector;
//! use mf_05_sub::{handler, ok, SubOption};
//!
//! let con = Connector::new("calc.example", bus.clone())?;
//! con.subscribe("/add", [], handler(|_req| async { ok("3") })).await?;
//! con.startup().await?;
//!
//! let res = con.request(&ctx, vec![get("https://calc.example/add?x=1&y=2")]).await?;
//! ```

pub mod config;
pub mod domain;
mod inbound;
mod outbound;
pub mod ports;
pub mod publisher;
pub mod service;

pub use config::ConnectorConfig;
pub use domain::{callback, Callback, CallbackHandler, ConnectorError, LOOP_DETECTED};
pub use ports::TraceSelector;
pub use publisher::WeakPublisher;
pub use service::{validate_hostname, Connector, ConnectorBuilder};
