//! Configuration settings for SeqCopy
//!
//! Defines the CLI arguments, runtime configuration and defaults
//! for the copy operation.

use crate::error::{Result, SeqCopyError};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest accepted number of reader/writer threads
pub const MIN_THREADS: usize = 2;

/// Largest accepted number of reader/writer threads
pub const MAX_THREADS: usize = 10;

/// Default number of slots in the sequenced queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Default buffer size for the source reader and destination writer
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// SeqCopy - order-preserving multi-threaded line copy
#[derive(Parser, Debug, Clone)]
#[command(name = "seqcopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy a text file with N reader and N writer threads, preserving line order")]
#[command(long_about = r#"
SeqCopy copies a text file line by line through a bounded queue shared by
N reader threads and N writer threads. Every line is tagged with a sequence
number when it is queued and writers commit lines strictly in that order, so
the destination is byte-identical to the source.

Examples:
  seqcopy 4 input.txt output.txt
  RUST_LOG=debug seqcopy 10 big.log copy.log
"#)]
pub struct CliArgs {
    /// Number of reader threads and of writer threads (2-10)
    #[arg(value_name = "N")]
    pub threads: usize,

    /// Source file to copy
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination file (created or truncated)
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Number of readers, and separately of writers
    pub threads: usize,
    /// Queue capacity K
    pub queue_capacity: usize,
    /// Buffer size in bytes for buffered I/O
    pub buffer_size: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            threads: MIN_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl CopyConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let config = Self {
            source: args.source.clone(),
            destination: args.destination.clone(),
            threads: args.threads,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before any file is touched
    pub fn validate(&self) -> Result<()> {
        if !(MIN_THREADS..=MAX_THREADS).contains(&self.threads) {
            return Err(SeqCopyError::usage(format!(
                "n must be between {} and {}, got {}",
                MIN_THREADS, MAX_THREADS, self.threads
            )));
        }
        if self.queue_capacity == 0 {
            return Err(SeqCopyError::config("queue capacity must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(SeqCopyError::config("buffer size must be at least 1 byte"));
        }
        Ok(())
    }
}
