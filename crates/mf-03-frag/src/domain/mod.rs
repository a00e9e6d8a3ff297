//! Domain layer for fragmentation.

pub mod accumulator;
pub mod error;
pub mod fragmenter;

pub use accumulator::DefragAccumulator;
pub use error::FragError;
pub use fragmenter::fragment;
