//! Core copy engine module
//!
//! Provides the copy orchestration and the reader/writer worker pools
//! that share the sequenced queue.

mod copier;
mod workers;

pub use copier::*;
pub use workers::*;
