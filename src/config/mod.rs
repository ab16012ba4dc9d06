//! Configuration module for SeqCopy
//!
//! Provides CLI arguments, runtime settings and their validation.

mod settings;

pub use settings::*;
