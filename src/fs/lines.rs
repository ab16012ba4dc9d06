//! Serialized line source and line sink
//!
//! Readers and writers share one input stream and one output stream. Each
//! stream sits behind its own lock so no two tasks ever interleave partial
//! reads or writes.

use crate::error::{Result, Role, SeqCopyError};
use crate::queue::SequencedQueue;
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};

/// Outcome of one read-and-enqueue step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// A line was read and queued
    Line {
        /// Sequence assigned by the queue
        sequence: u64,
        /// Length of the line in bytes
        bytes: usize,
    },
    /// The source is exhausted and the queue has been closed
    EndOfInput,
}

/// The single input stream, shared by all readers
pub struct LineSource<R> {
    inner: Mutex<R>,
}

impl<R: BufRead> LineSource<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            inner: Mutex::new(reader),
        }
    }

    /// Read the next line including its terminator
    ///
    /// Returns `None` at end of input. Reader threads go through
    /// [`feed`](Self::feed) instead, which keeps the read and the enqueue in
    /// one critical section.
    pub fn read_line(&self) -> io::Result<Option<Vec<u8>>> {
        let mut reader = self.inner.lock();
        next_line(&mut *reader)
    }

    /// Read one line and enqueue it as a single critical section
    ///
    /// The source lock is held until the queue has assigned the line its
    /// sequence number, so sequence order always matches read order. Lock
    /// order is source first, queue second. At end of input the queue is
    /// closed before the source lock is released.
    pub fn feed(&self, queue: &SequencedQueue, reader: usize) -> Result<Feed> {
        let mut source = self.inner.lock();

        match next_line(&mut *source).map_err(|e| SeqCopyError::stream(Role::Reader, reader, e))? {
            Some(line) => {
                let bytes = line.len();
                let sequence = queue.enqueue(line)?;
                Ok(Feed::Line { sequence, bytes })
            }
            None => {
                queue.close();
                Ok(Feed::EndOfInput)
            }
        }
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

fn next_line<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) if line.is_empty() => return Ok(None),
            Ok(_) => return Ok(Some(line)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// The single output stream, shared by all writers
pub struct LineSink<W> {
    inner: Mutex<W>,
}

impl<W: Write> LineSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Write one whole line
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        self.inner.lock().write_all(line)
    }

    /// Flush buffered output
    pub fn flush(&self) -> io::Result<()> {
        self.inner.lock().flush()
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}
