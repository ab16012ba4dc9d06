//! Error types for SeqCopy
//!
//! This module defines the error taxonomy used throughout the crate and the
//! mapping from each kind to the process exit code reported by the CLI.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Role of a worker thread, used for error context and thread names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Pulls lines from the source into the queue
    Reader,
    /// Commits lines from the queue to the destination
    Writer,
}

impl Role {
    /// Get lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for SeqCopy operations
#[derive(Error, Debug)]
pub enum SeqCopyError {
    /// Bad command line or out-of-range thread count
    #[error("{0}")]
    Usage(String),

    /// I/O error while opening or creating a file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source names something other than a readable file
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// Source and destination are the same
    #[error("Source and destination are the same: {0}")]
    SameSourceAndDestination(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A worker thread could not be created
    #[error("Failed to spawn {role} thread: {source}")]
    ThreadSpawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked before it could be joined cleanly
    #[error("Failed to join {role} thread {index}")]
    ThreadJoin { role: Role, index: usize },

    /// Head of the queue does not carry the sequence the writers expect
    #[error("Sequence invariant violated: expected {expected}, found {found} at queue head")]
    SequenceViolation { expected: u64, found: u64 },

    /// Enqueue attempted after end-of-input was signalled
    #[error("Queue is closed for input")]
    QueueClosed,

    /// Every writer detached, nobody is left to drain the queue
    #[error("No writers left to drain the queue")]
    NoConsumers,

    /// The copy was aborted after a fatal error elsewhere
    #[error("Copy aborted")]
    Aborted,

    /// Read or write failure on an individual line
    #[error("{role} {index} stream error: {source}")]
    Stream {
        role: Role,
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

impl SeqCopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a stream error for a worker
    pub fn stream(role: Role, index: usize, source: std::io::Error) -> Self {
        Self::Stream {
            role,
            index,
            source,
        }
    }

    /// Check if this error is fatal for the whole run
    ///
    /// Fatal errors mean the coordination invariants can no longer be
    /// guaranteed and map to exit code 2.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ThreadSpawn { .. } | Self::ThreadJoin { .. } | Self::SequenceViolation { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            2
        } else {
            1
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotAFile(path)
            | Self::SameSourceAndDestination(path) => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for SeqCopy operations
pub type Result<T> = std::result::Result<T, SeqCopyError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| SeqCopyError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SeqCopyError::io("/test/path", io_err);
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/path"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SeqCopyError::usage("bad").exit_code(), 1);
        assert_eq!(
            SeqCopyError::ThreadJoin {
                role: Role::Writer,
                index: 3
            }
            .exit_code(),
            2
        );
        assert_eq!(
            SeqCopyError::SequenceViolation {
                expected: 4,
                found: 9
            }
            .exit_code(),
            2
        );
        assert!(!SeqCopyError::NoConsumers.is_fatal());
    }

    #[test]
    fn test_with_path() {
        let res: std::io::Result<()> =
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let err = res.with_path("/dest").unwrap_err();
        assert!(err.to_string().contains("/dest"));
    }

    #[test]
    fn test_stream_error_display() {
        let err = SeqCopyError::stream(
            Role::Reader,
            1,
            std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
        );
        assert_eq!(err.to_string(), "reader 1 stream error: disk gone");
    }
}
