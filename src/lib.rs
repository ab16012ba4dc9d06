//! # SeqCopy - Order-Preserving Multi-Threaded Line Copy
//!
//! SeqCopy copies a text stream from a source to a destination with N
//! reader threads and N writer threads sharing one bounded queue. Readers
//! tag every line with a sequence number as it is queued, writers commit
//! lines strictly in that order, so the output is byte-identical to the
//! input no matter which writer wrote which line.
//!
//! ## Features
//!
//! - **Bounded Sequenced Queue**: fixed-capacity ring buffer, blocking when
//!   full and when empty
//! - **Head-of-line Commit**: writers wait, never spin, for their turn
//! - **Serialized Streams**: one lock per input and output stream
//! - **Clean Termination**: end-of-input broadcast, no deadlock on empty input
//!   or on failing streams
//!
//! ## Quick Start
//!
//! ```no_run
//! use seqcopy::core::copy_file;
//! use std::path::Path;
//!
//! let result = copy_file(4, Path::new("input.txt"), Path::new("output.txt")).unwrap();
//! println!("Copied {} lines ({} bytes)", result.lines_copied, result.bytes_copied);
//! ```
//!
//! ## In-Memory Streams
//!
//! ```
//! use seqcopy::config::CopyConfig;
//! use seqcopy::core::CopyEngine;
//! use std::io::Cursor;
//!
//! let engine = CopyEngine::new(CopyConfig {
//!     threads: 3,
//!     queue_capacity: 2,
//!     ..Default::default()
//! });
//!
//! let (result, out) = engine
//!     .run_streams(Cursor::new(b"one\ntwo\nthree\n".to_vec()), Vec::new())
//!     .unwrap();
//!
//! assert_eq!(result.lines_copied, 3);
//! assert_eq!(out, b"one\ntwo\nthree\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod queue;

// Re-export commonly used types
pub use config::{CliArgs, CopyConfig};
pub use core::{copy_file, CopyEngine, CopyResult};
pub use error::{Result, SeqCopyError};
pub use queue::{QueueItem, SequencedQueue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use seqcopy::prelude::*;
    //! ```

    pub use crate::config::{CopyConfig, MAX_THREADS, MIN_THREADS};
    pub use crate::core::{copy_file, CopyEngine, CopyResult};
    pub use crate::error::{Result, Role, SeqCopyError};
    pub use crate::fs::{LineSink, LineSource};
    pub use crate::queue::{QueueItem, QueueStats, SequencedQueue, Take};
}
