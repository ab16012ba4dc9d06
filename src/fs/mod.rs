//! File system and stream access
//!
//! Opens the source and destination files and wraps the shared streams in
//! serialized line source / line sink adapters.

mod lines;
mod operations;

pub use lines::*;
pub use operations::*;
