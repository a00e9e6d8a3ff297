//! # Shared Types Crate
//!
//! This crate contains the primitives shared by every fabric crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: The HTTP message model, the reserved frame
//!   headers and the error vocabulary are defined once, here.
//! - **Errors Carry Their Path**: `TracedError` accumulates a stack of frames
//!   as it travels, including across service boundaries.
//! - **Explicit Context**: Deadlines and cancellation travel in a
//!   `CallContext` passed to every async operation, never in task-locals.

pub mod clock;
pub mod context;
pub mod errors;
pub mod frame;
pub mod message;

pub use clock::{system_time_source, MockTimeSource, SharedTimeSource, SystemTimeSource, TimeSource};
pub use context::CallContext;
pub use errors::*;
pub use frame::{topic, Frame, FrameError, FrameMut, OpCode};
pub use message::{CodecError, HttpMessage, StartLine};
