//! Reader and writer tasks
//!
//! Readers move lines from the shared source into the queue, writers move
//! them from the queue into the shared sink in sequence order. Both run on
//! plain OS threads and share one [`CopyContext`].

use crate::error::{Result, Role, SeqCopyError};
use crate::fs::{Feed, LineSink, LineSource};
use crate::queue::SequencedQueue;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything the tasks of one copy share
pub struct CopyContext<R, W> {
    /// Queue between readers and writers
    pub queue: SequencedQueue,
    /// Serialized input stream
    pub source: LineSource<R>,
    /// Serialized output stream
    pub sink: LineSink<W>,
}

impl<R: BufRead, W: Write> CopyContext<R, W> {
    /// Create a context for `writers` writers over a queue of `capacity` slots
    pub fn new(reader: R, writer: W, capacity: usize, writers: usize) -> Self {
        Self {
            queue: SequencedQueue::new(capacity, writers),
            source: LineSource::new(reader),
            sink: LineSink::new(writer),
        }
    }
}

/// What a single task did before it stopped
#[derive(Debug)]
pub struct TaskReport {
    /// Task role
    pub role: Role,
    /// Task index within its role
    pub index: usize,
    /// Lines read or committed
    pub lines: u64,
    /// Bytes read or committed
    pub bytes: u64,
    /// Error that stopped the task early
    pub error: Option<SeqCopyError>,
}

impl TaskReport {
    fn new(role: Role, index: usize) -> Self {
        Self {
            role,
            index,
            lines: 0,
            bytes: 0,
            error: None,
        }
    }

    fn record(&mut self, bytes: usize) {
        self.lines += 1;
        self.bytes += bytes as u64;
    }

    /// Check if the task stopped because of a per-line stream failure
    pub fn is_stream_error(&self) -> bool {
        matches!(self.error, Some(SeqCopyError::Stream { .. }))
    }
}

/// Detaches a writer from the queue however it exits
struct ConsumerGuard<'a> {
    queue: &'a SequencedQueue,
}

impl Drop for ConsumerGuard<'_> {
    fn drop(&mut self) {
        // A panicking writer may hold the in-flight line
        if thread::panicking() {
            self.queue.abort();
        }
        self.queue.detach_consumer();
    }
}

/// Reader loop: read, tag, enqueue until end of input or an error
pub fn run_reader<R: BufRead, W>(ctx: &CopyContext<R, W>, index: usize) -> TaskReport {
    let mut report = TaskReport::new(Role::Reader, index);
    tracing::debug!(reader = index, "reader started");

    loop {
        match ctx.source.feed(&ctx.queue, index) {
            Ok(Feed::Line { bytes, .. }) => report.record(bytes),
            Ok(Feed::EndOfInput) => break,
            Err(e) => {
                match &e {
                    SeqCopyError::Stream { .. } => {
                        tracing::warn!(reader = index, error = %e, "read failed, reader stopping")
                    }
                    _ => tracing::debug!(reader = index, reason = %e, "reader stopping early"),
                }
                report.error = Some(e);
                break;
            }
        }
    }

    tracing::debug!(reader = index, lines = report.lines, "reader finished");
    report
}

/// Writer loop: take the next line in order, write it, commit it
pub fn run_writer<R, W: Write>(ctx: &CopyContext<R, W>, index: usize) -> TaskReport {
    let _guard = ConsumerGuard { queue: &ctx.queue };
    let mut report = TaskReport::new(Role::Writer, index);
    tracing::debug!(writer = index, "writer started");

    loop {
        let item = match ctx.queue.take_next() {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(e) => {
                if !matches!(e, SeqCopyError::Aborted) {
                    tracing::error!(writer = index, error = %e, "writer stopping");
                }
                report.error = Some(e);
                break;
            }
        };

        let written = ctx.sink.write_line(&item.payload);

        // Commit even on a failed write so later lines are not stranded
        if let Err(e) = ctx.queue.complete_commit(item.sequence) {
            tracing::error!(writer = index, error = %e, "commit rejected");
            report.error = Some(e);
            break;
        }

        match written {
            Ok(()) => report.record(item.len()),
            Err(e) => {
                let err = SeqCopyError::stream(Role::Writer, index, e);
                tracing::warn!(
                    writer = index,
                    sequence = item.sequence,
                    error = %err,
                    "write failed, writer stopping"
                );
                report.error = Some(err);
                break;
            }
        }
    }

    tracing::debug!(writer = index, lines = report.lines, "writer finished");
    report
}

/// Spawn `threads` readers and `threads` writers over a shared context
///
/// Handles are pushed as soon as each thread starts. On a spawn failure the
/// queue is aborted so the threads already running stop, and the caller
/// still joins everything that was pushed.
pub fn spawn_tasks<R, W>(
    ctx: &Arc<CopyContext<R, W>>,
    threads: usize,
    readers: &mut Vec<JoinHandle<TaskReport>>,
    writers: &mut Vec<JoinHandle<TaskReport>>,
) -> Result<()>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    for index in 0..threads {
        let reader_ctx = Arc::clone(ctx);
        let handle = spawn_named(Role::Reader, index, move || run_reader(&reader_ctx, index))
            .inspect_err(|_| ctx.queue.abort())?;
        readers.push(handle);

        let writer_ctx = Arc::clone(ctx);
        let handle = spawn_named(Role::Writer, index, move || run_writer(&writer_ctx, index))
            .inspect_err(|_| ctx.queue.abort())?;
        writers.push(handle);
    }
    Ok(())
}

fn spawn_named<F>(role: Role, index: usize, task: F) -> Result<JoinHandle<TaskReport>>
where
    F: FnOnce() -> TaskReport + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-{}", role, index))
        .spawn(task)
        .map_err(|source| SeqCopyError::ThreadSpawn { role, source })
}

/// Join handles in order, returning the reports and the first join failure
pub fn join_tasks(
    role: Role,
    handles: Vec<JoinHandle<TaskReport>>,
) -> (Vec<TaskReport>, Option<SeqCopyError>) {
    let mut reports = Vec::with_capacity(handles.len());
    let mut failure = None;

    for (index, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(report) => reports.push(report),
            Err(_) => {
                tracing::error!(%role, index, "worker thread panicked");
                failure.get_or_insert(SeqCopyError::ThreadJoin { role, index });
            }
        }
    }

    (reports, failure)
}
