//! End-to-end scenarios over the in-memory bus.

#[cfg(test)]
pub mod harness;

mod failures;
mod fragmentation;
mod lifecycle;
mod multicast;
mod request_response;
mod trace_selection;
