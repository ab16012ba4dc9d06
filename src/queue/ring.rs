//! Fixed-capacity ring buffer of sequence-tagged lines
//!
//! A single mutex guards the ring, the sequence counter, the commit state
//! and the end-of-input flag. Two condition variables carry the blocking
//! semantics:
//!
//! - `not_full`: producers wait here while `count == capacity`
//! - `not_empty`: consumers wait here while there is nothing they may take
//!
//! Sequence numbers are assigned under the same lock that stores the item,
//! so the ring is always a strict FIFO of consecutive sequence numbers and
//! the head always carries the smallest outstanding sequence.
//!
//! # Head-of-line commit
//!
//! A consumer may only take the head when its sequence equals
//! `next_expected` and no other consumer is still committing. The taker
//! writes the line outside the queue lock and then calls
//! [`SequencedQueue::complete_commit`], which advances `next_expected` and
//! wakes every waiting consumer. While a commit is in flight the head
//! carries `next_expected + 1` and consumers block on `not_empty` instead of
//! spinning. Any other head sequence is an invariant violation: the queue is
//! aborted and the consumer gets [`SeqCopyError::SequenceViolation`].

use crate::error::{Result, SeqCopyError};
use parking_lot::{Condvar, Mutex};

/// A line in flight between a reader and a writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Position of the line in the source, starting at 0
    pub sequence: u64,
    /// Line bytes including the terminator (the last line may lack one)
    pub payload: Vec<u8>,
}

impl QueueItem {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Commit position shared by all writers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteState {
    /// Sequence that must be committed next
    pub next_expected: u64,
    /// A writer holds `next_expected` and has not finished committing it
    pub in_flight: bool,
}

/// Counters collected while the queue is in use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items enqueued
    pub enqueued: u64,
    /// Items whose commit completed
    pub committed: u64,
    /// Highest number of items held at once
    pub peak_depth: usize,
    /// Times a producer blocked on a full queue
    pub full_waits: u64,
    /// Times a consumer blocked on an empty queue
    pub empty_waits: u64,
    /// Times a consumer blocked behind another consumer's commit
    pub order_waits: u64,
}

/// Result of a non-blocking take attempt
#[derive(Debug, PartialEq, Eq)]
pub enum Take {
    /// The head was the next line to commit and now belongs to the caller
    Item(QueueItem),
    /// Nothing queued yet, more input may arrive
    Empty,
    /// Another writer is committing the previous line
    Pending {
        /// Sequence at the head of the queue
        head: u64,
    },
    /// End of input was signalled and the queue is drained
    Exhausted,
}

struct Ring {
    slots: Box<[Option<QueueItem>]>,
    head: usize,
    tail: usize,
    count: usize,
    current_sequence: u64,
    write: WriteState,
    end_of_input: bool,
    aborted: bool,
    consumers: usize,
    stats: QueueStats,
}

impl Ring {
    fn new(capacity: usize, consumers: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
            current_sequence: 0,
            write: WriteState::default(),
            end_of_input: false,
            aborted: false,
            consumers,
            stats: QueueStats::default(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Why a producer cannot enqueue right now, ignoring capacity
    fn refuse_input(&self) -> Option<SeqCopyError> {
        if self.aborted {
            Some(SeqCopyError::Aborted)
        } else if self.end_of_input {
            Some(SeqCopyError::QueueClosed)
        } else if self.consumers == 0 {
            Some(SeqCopyError::NoConsumers)
        } else {
            None
        }
    }

    fn push(&mut self, payload: Vec<u8>) -> u64 {
        debug_assert!(!self.is_full());

        let sequence = self.current_sequence;
        self.current_sequence += 1;

        self.slots[self.tail] = Some(QueueItem { sequence, payload });
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;

        self.stats.enqueued += 1;
        self.stats.peak_depth = self.stats.peak_depth.max(self.count);
        sequence
    }

    fn head_sequence(&self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        self.slots[self.head].as_ref().map(|item| item.sequence)
    }

    fn pop(&mut self) -> Option<QueueItem> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        item
    }

    /// Inspect the head against the commit state, taking it when allowed
    fn try_take(&mut self) -> Result<Take> {
        if self.aborted {
            return Err(SeqCopyError::Aborted);
        }

        let Some(found) = self.head_sequence() else {
            return Ok(if self.end_of_input {
                Take::Exhausted
            } else {
                Take::Empty
            });
        };

        let expected = self.write.next_expected;
        if !self.write.in_flight && found == expected {
            let item = self.pop().ok_or(SeqCopyError::Aborted)?;
            self.write.in_flight = true;
            Ok(Take::Item(item))
        } else if self.write.in_flight && found == expected + 1 {
            Ok(Take::Pending { head: found })
        } else {
            self.aborted = true;
            Err(SeqCopyError::SequenceViolation { expected, found })
        }
    }
}

/// Bounded multi-producer/multi-consumer queue with ordered commit
pub struct SequencedQueue {
    state: Mutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl SequencedQueue {
    /// Create a queue with `capacity` slots drained by `consumers` writers
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, consumers: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");

        Self {
            state: Mutex::new(Ring::new(capacity, consumers)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if end of input was signalled
    pub fn is_closed(&self) -> bool {
        self.state.lock().end_of_input
    }

    /// Check if the queue was aborted
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Current commit state
    pub fn write_state(&self) -> WriteState {
        self.state.lock().write
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats
    }

    /// Append a line, blocking while the queue is full
    ///
    /// Returns the sequence number assigned to the line. Fails instead of
    /// blocking once the queue is closed, aborted, or every consumer has
    /// detached.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<u64> {
        let mut ring = self.state.lock();
        loop {
            if let Some(err) = ring.refuse_input() {
                return Err(err);
            }
            if !ring.is_full() {
                break;
            }
            ring.stats.full_waits += 1;
            self.not_full.wait(&mut ring);
        }

        let sequence = ring.push(payload);
        drop(ring);

        self.not_empty.notify_one();
        Ok(sequence)
    }

    /// Take the head if it is the next line to commit, without blocking
    pub fn try_take_next(&self) -> Result<Take> {
        let mut ring = self.state.lock();
        let take = ring.try_take();
        drop(ring);
        self.after_take(take)
    }

    /// Take the head only if the caller's `expected` is the next sequence to commit
    ///
    /// Returns `Ok(None)` without touching the queue when `expected` is not
    /// `next_expected`, when a commit is still in flight, or when nothing
    /// takeable is queued yet.
    pub fn try_take_if_next(&self, expected: u64) -> Result<Option<QueueItem>> {
        let mut ring = self.state.lock();
        if ring.aborted {
            return Err(SeqCopyError::Aborted);
        }
        if ring.write.in_flight || ring.write.next_expected != expected {
            return Ok(None);
        }
        let take = ring.try_take();
        drop(ring);

        match self.after_take(take)? {
            Take::Item(item) => Ok(Some(item)),
            _ => Ok(None),
        }
    }

    /// Take the next line to commit, blocking until it is available
    ///
    /// Returns `Ok(None)` once end of input is set and the queue is empty.
    /// The caller owns the returned item and must call
    /// [`complete_commit`](Self::complete_commit) after writing it.
    pub fn take_next(&self) -> Result<Option<QueueItem>> {
        let mut ring = self.state.lock();
        loop {
            match ring.try_take() {
                Ok(Take::Empty) => {
                    ring.stats.empty_waits += 1;
                    self.not_empty.wait(&mut ring);
                }
                Ok(Take::Pending { .. }) => {
                    ring.stats.order_waits += 1;
                    self.not_empty.wait(&mut ring);
                }
                other => {
                    drop(ring);
                    return match self.after_take(other)? {
                        Take::Item(item) => Ok(Some(item)),
                        _ => Ok(None),
                    };
                }
            }
        }
    }

    fn after_take(&self, take: Result<Take>) -> Result<Take> {
        match &take {
            Ok(Take::Item(_)) => {
                self.not_full.notify_one();
            }
            Err(SeqCopyError::SequenceViolation { expected, found }) => {
                tracing::error!(expected, found, "queue head out of order, aborting copy");
                self.wake_all();
            }
            _ => {}
        }
        take
    }

    /// Finish committing the line with the given sequence
    ///
    /// Advances `next_expected` and wakes every consumer so the one that can
    /// take the new head proceeds. Must be called exactly once per taken
    /// item, whether or not the write succeeded.
    pub fn complete_commit(&self, sequence: u64) -> Result<()> {
        let mut ring = self.state.lock();
        let expected = ring.write.next_expected;

        if !ring.write.in_flight || sequence != expected {
            ring.aborted = true;
            drop(ring);
            self.wake_all();
            return Err(SeqCopyError::SequenceViolation {
                expected,
                found: sequence,
            });
        }

        ring.write.next_expected += 1;
        ring.write.in_flight = false;
        ring.stats.committed += 1;
        drop(ring);

        self.not_empty.notify_all();
        Ok(())
    }

    /// Signal end of input; idempotent
    pub fn close(&self) {
        let mut ring = self.state.lock();
        let first = !ring.end_of_input;
        ring.end_of_input = true;
        drop(ring);

        if first {
            tracing::debug!("end of input reached");
        }
        self.wake_all();
    }

    /// Register that one consumer stopped draining
    ///
    /// When the last consumer detaches, producers blocked on a full queue
    /// are released with [`SeqCopyError::NoConsumers`].
    pub fn detach_consumer(&self) {
        let mut ring = self.state.lock();
        ring.consumers = ring.consumers.saturating_sub(1);
        let last = ring.consumers == 0;
        drop(ring);

        if last {
            self.not_full.notify_all();
        }
    }

    /// Abort the copy, failing every current and future wait
    pub fn abort(&self) {
        self.state.lock().aborted = true;
        self.wake_all();
    }

    fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl std::fmt::Debug for SequencedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.state.lock();
        f.debug_struct("SequencedQueue")
            .field("capacity", &self.capacity)
            .field("count", &ring.count)
            .field("head", &ring.head)
            .field("tail", &ring.tail)
            .field("current_sequence", &ring.current_sequence)
            .field("write", &ring.write)
            .field("end_of_input", &ring.end_of_input)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn line(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_fifo_sequences() {
        let queue = SequencedQueue::new(4, 1);

        assert_eq!(queue.enqueue(line("a\n")).unwrap(), 0);
        assert_eq!(queue.enqueue(line("b\n")).unwrap(), 1);
        assert_eq!(queue.enqueue(line("c\n")).unwrap(), 2);
        assert_eq!(queue.len(), 3);

        for (expected, text) in [(0, "a\n"), (1, "b\n"), (2, "c\n")] {
            let item = queue.take_next().unwrap().unwrap();
            assert_eq!(item.sequence, expected);
            assert_eq!(item.payload, line(text));
            queue.complete_commit(item.sequence).unwrap();
        }

        assert!(queue.is_empty());
        assert_eq!(queue.write_state().next_expected, 3);
    }

    #[test]
    fn test_ring_wraps_within_capacity() {
        let queue = SequencedQueue::new(2, 1);

        for i in 0..7u64 {
            assert_eq!(queue.enqueue(vec![i as u8]).unwrap(), i);
            let item = queue.take_next().unwrap().unwrap();
            assert_eq!(item.sequence, i);
            queue.complete_commit(i).unwrap();
        }

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 7);
        assert_eq!(stats.committed, 7);
        assert_eq!(stats.peak_depth, 1);
    }

    #[test]
    fn test_try_take_states() {
        let queue = SequencedQueue::new(4, 1);
        assert_eq!(queue.try_take_next().unwrap(), Take::Empty);

        queue.enqueue(line("a\n")).unwrap();
        queue.enqueue(line("b\n")).unwrap();

        let first = match queue.try_take_next().unwrap() {
            Take::Item(item) => item,
            other => panic!("expected item, got {:?}", other),
        };
        assert_eq!(first.sequence, 0);

        // Line 0 is still being committed
        assert_eq!(queue.try_take_next().unwrap(), Take::Pending { head: 1 });

        queue.complete_commit(0).unwrap();
        assert!(matches!(queue.try_take_next().unwrap(), Take::Item(item) if item.sequence == 1));
        queue.complete_commit(1).unwrap();

        queue.close();
        assert_eq!(queue.try_take_next().unwrap(), Take::Exhausted);
    }

    #[test]
    fn test_take_if_next_checks_expected() {
        let queue = SequencedQueue::new(4, 1);
        assert_eq!(queue.try_take_if_next(0).unwrap(), None);

        queue.enqueue(Vec::new()).unwrap();
        queue.enqueue(line("b\n")).unwrap();

        // Wrong sequence leaves the head queued
        assert_eq!(queue.try_take_if_next(1).unwrap(), None);
        assert_eq!(queue.len(), 2);

        let first = queue.try_take_if_next(0).unwrap().unwrap();
        assert_eq!(first.sequence, 0);
        assert!(first.is_empty());

        // Nobody may take while line 0 is being committed
        assert_eq!(queue.try_take_if_next(0).unwrap(), None);
        assert_eq!(queue.try_take_if_next(1).unwrap(), None);
        assert_eq!(queue.len(), 1);

        queue.complete_commit(0).unwrap();
        let second = queue.try_take_if_next(1).unwrap().unwrap();
        assert_eq!(second.sequence, 1);
        assert!(!second.is_empty());
        assert_eq!(second.len(), 2);
        queue.complete_commit(1).unwrap();

        queue.abort();
        assert!(matches!(queue.try_take_if_next(2), Err(SeqCopyError::Aborted)));
    }

    #[test]
    fn test_exhausted_after_close() {
        let queue = SequencedQueue::new(4, 1);
        queue.enqueue(line("only\n")).unwrap();
        queue.close();
        queue.close();

        let item = queue.take_next().unwrap().unwrap();
        queue.complete_commit(item.sequence).unwrap();
        assert!(queue.take_next().unwrap().is_none());
        assert!(matches!(queue.enqueue(line("late\n")), Err(SeqCopyError::QueueClosed)));
    }

    #[test]
    fn test_enqueue_blocks_when_full() {
        let queue = Arc::new(SequencedQueue::new(2, 1));
        queue.enqueue(line("0\n")).unwrap();
        queue.enqueue(line("1\n")).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(line("2\n")))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2);
        assert!(!producer.is_finished());

        let item = queue.take_next().unwrap().unwrap();
        queue.complete_commit(item.sequence).unwrap();

        assert_eq!(producer.join().unwrap().unwrap(), 2);
        assert_eq!(queue.len(), 2);
        assert!(queue.stats().full_waits >= 1);
    }

    #[test]
    fn test_take_blocks_until_input() {
        let queue = Arc::new(SequencedQueue::new(2, 1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take_next())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        queue.enqueue(line("hello\n")).unwrap();
        let item = consumer.join().unwrap().unwrap().unwrap();
        assert_eq!(item.sequence, 0);
    }

    #[test]
    fn test_close_wakes_waiting_consumers() {
        let queue = Arc::new(SequencedQueue::new(2, 3));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.take_next())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for consumer in consumers {
            assert!(consumer.join().unwrap().unwrap().is_none());
        }
    }

    #[test]
    fn test_waiting_writer_resumes_after_commit() {
        let queue = Arc::new(SequencedQueue::new(4, 2));
        queue.enqueue(line("a\n")).unwrap();
        queue.enqueue(line("b\n")).unwrap();

        let first = queue.take_next().unwrap().unwrap();

        let second = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take_next())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!second.is_finished());

        queue.complete_commit(first.sequence).unwrap();
        let item = second.join().unwrap().unwrap().unwrap();
        assert_eq!(item.sequence, 1);
        assert!(queue.stats().order_waits >= 1);
    }

    #[test]
    fn test_commit_out_of_order_fails_fast() {
        let queue = SequencedQueue::new(4, 1);
        queue.enqueue(line("a\n")).unwrap();

        let err = queue.complete_commit(5).unwrap_err();
        assert!(matches!(
            err,
            SeqCopyError::SequenceViolation {
                expected: 0,
                found: 5
            }
        ));
        assert!(queue.is_aborted());
        assert!(matches!(queue.take_next(), Err(SeqCopyError::Aborted)));
        assert!(matches!(queue.enqueue(line("b\n")), Err(SeqCopyError::Aborted)));
    }

    #[test]
    fn test_last_detach_releases_producer() {
        let queue = Arc::new(SequencedQueue::new(1, 2));
        queue.enqueue(line("0\n")).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(line("1\n")))
        };

        queue.detach_consumer();
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        queue.detach_consumer();
        assert!(matches!(
            producer.join().unwrap(),
            Err(SeqCopyError::NoConsumers)
        ));
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        const LINES: u64 = 2_000;
        let queue = Arc::new(SequencedQueue::new(8, 4));
        let committed = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..LINES / 4 {
                        queue.enqueue(line("x\n")).unwrap();
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let committed = Arc::clone(&committed);
                thread::spawn(move || {
                    while let Some(item) = queue.take_next().unwrap() {
                        assert!(queue.len() <= queue.capacity());
                        committed.lock().push(item.sequence);
                        queue.complete_commit(item.sequence).unwrap();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();
        for consumer in consumers {
            consumer.join().unwrap();
        }

        let committed = committed.lock();
        assert_eq!(*committed, (0..LINES).collect::<Vec<_>>());
        assert!(queue.stats().peak_depth <= 8);
    }
}
