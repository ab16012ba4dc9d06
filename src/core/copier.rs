//! Main copy engine
//!
//! Validates the configuration, opens the files, runs the reader and writer
//! pools over one shared context and collects the result.

use crate::config::CopyConfig;
use crate::core::{join_tasks, spawn_tasks, CopyContext, TaskReport};
use crate::error::{Result, Role, SeqCopyError};
use crate::fs::{create_destination, open_source};
use crate::queue::QueueStats;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Copy operation result
#[derive(Debug)]
pub struct CopyResult {
    /// Lines pulled from the source
    pub lines_read: u64,
    /// Lines written to the destination
    pub lines_copied: u64,
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Readers and writers per role
    pub threads: usize,
    /// Queue capacity used
    pub queue_capacity: usize,
    /// Queue counters at the end of the run
    pub queue: QueueStats,
    /// Per-line read/write failures, logged and not escalated
    pub stream_errors: Vec<SeqCopyError>,
    /// Total duration
    pub duration: Duration,
    /// Average throughput in bytes/second
    pub throughput: f64,
}

impl CopyResult {
    /// Check if every line was copied without a stream error
    pub fn is_success(&self) -> bool {
        self.stream_errors.is_empty() && self.lines_read == self.lines_copied
    }

    /// Emit the summary through the log
    pub fn log_summary(&self) {
        let throughput = humansize::format_size(self.throughput as u64, humansize::BINARY);
        tracing::info!(
            lines = self.lines_copied,
            bytes = %humansize::format_size(self.bytes_copied, humansize::BINARY),
            threads = self.threads,
            peak_queue = self.queue.peak_depth,
            capacity = self.queue_capacity,
            duration = ?self.duration,
            throughput = %format!("{}/s", throughput),
            "copy finished"
        );

        for error in &self.stream_errors {
            tracing::warn!(%error, "partial copy");
        }
    }
}

/// Main copy engine
pub struct CopyEngine {
    /// Configuration
    config: CopyConfig,
}

impl CopyEngine {
    /// Create a new copy engine
    pub fn new(config: CopyConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Execute the copy operation between the configured files
    pub fn execute(&self) -> Result<CopyResult> {
        self.config.validate()?;

        let source = open_source(&self.config.source, self.config.buffer_size)?;
        let destination = create_destination(
            &self.config.source,
            &self.config.destination,
            self.config.buffer_size,
        )?;

        let (mut result, mut destination) = self.run_streams(source, destination)?;

        if let Err(e) = destination.flush() {
            tracing::warn!(error = %e, "final flush of destination failed");
            result
                .stream_errors
                .push(SeqCopyError::io(&self.config.destination, e));
        }

        Ok(result)
    }

    /// Run the reader and writer pools over arbitrary streams
    ///
    /// Returns the result together with the writer so the caller can flush
    /// or inspect it.
    pub fn run_streams<R, W>(&self, reader: R, writer: W) -> Result<(CopyResult, W)>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        self.config.validate()?;

        let start_time = Instant::now();
        let threads = self.config.threads;
        let ctx = Arc::new(CopyContext::new(
            reader,
            writer,
            self.config.queue_capacity,
            threads,
        ));

        tracing::debug!(
            threads,
            capacity = self.config.queue_capacity,
            "starting reader and writer pools"
        );

        let mut readers = Vec::with_capacity(threads);
        let mut writers = Vec::with_capacity(threads);
        let spawned = spawn_tasks(&ctx, threads, &mut readers, &mut writers);

        let (read_reports, reader_failure) = join_tasks(Role::Reader, readers);
        // Readers that stopped on an error never signalled end of input
        ctx.queue.close();
        let (write_reports, writer_failure) = join_tasks(Role::Writer, writers);

        spawned?;
        if let Some(failure) = reader_failure.or(writer_failure) {
            return Err(failure);
        }

        let queue = ctx.queue.stats();
        let ctx = Arc::try_unwrap(ctx).map_err(|_| SeqCopyError::Aborted)?;
        let writer = ctx.sink.into_inner();

        let result = collect_result(
            read_reports,
            write_reports,
            threads,
            self.config.queue_capacity,
            queue,
            start_time.elapsed(),
        )?;

        Ok((result, writer))
    }
}

fn collect_result(
    read_reports: Vec<TaskReport>,
    write_reports: Vec<TaskReport>,
    threads: usize,
    queue_capacity: usize,
    queue: QueueStats,
    duration: Duration,
) -> Result<CopyResult> {
    let lines_read = read_reports.iter().map(|r| r.lines).sum();
    let lines_copied = write_reports.iter().map(|r| r.lines).sum();
    let bytes_copied: u64 = write_reports.iter().map(|r| r.bytes).sum();

    let mut stream_errors = Vec::new();
    for report in read_reports.into_iter().chain(write_reports) {
        match report.error {
            Some(e) if e.is_fatal() => return Err(e),
            Some(e @ SeqCopyError::Stream { .. }) => stream_errors.push(e),
            _ => {}
        }
    }

    let throughput = if duration.as_secs_f64() > 0.0 {
        bytes_copied as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    Ok(CopyResult {
        lines_read,
        lines_copied,
        bytes_copied,
        threads,
        queue_capacity,
        queue,
        stream_errors,
        duration,
        throughput,
    })
}

/// Copy `source` to `destination` with `threads` readers and writers
pub fn copy_file(threads: usize, source: &Path, destination: &Path) -> Result<CopyResult> {
    let config = CopyConfig {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        threads,
        ..Default::default()
    };

    CopyEngine::new(config).execute()
}
