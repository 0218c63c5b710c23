//! Bounded, priority-ordered message queue shared between threads.
//!
//! Mirrors the semantics of a POSIX message queue: a fixed capacity set at
//! creation, blocking `send` when full, blocking `receive` when empty, and
//! delivery of the highest-priority message first with FIFO order among
//! messages of equal priority.
//!
//! [`MessageQueue::close`] is the shutdown marker. Once closed, senders fail
//! immediately and receivers drain what is left before failing.

pub mod namespace;

pub use namespace::{Namespace, QueueGuard};

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Priority used for every message unless the caller asks otherwise.
pub const DEFAULT_PRIORITY: u32 = 1;

/// Fixed attributes of a queue, chosen at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    /// Maximum number of messages held at once.
    pub max_messages: usize,
    /// Size in bytes of the largest record the queue accepts.
    pub message_size: usize,
}

impl QueueAttributes {
    /// Attributes sized for records of type `T`.
    pub fn for_records<T>(max_messages: usize) -> Self {
        Self {
            max_messages,
            message_size: std::mem::size_of::<T>(),
        }
    }
}

/// A failed send. The message is handed back so it is never lost.
#[derive(Debug)]
pub struct SendError<T> {
    pub item: T,
    pub reason: Error,
}

impl<T> From<SendError<T>> for Error {
    fn from(err: SendError<T>) -> Self {
        err.reason
    }
}

struct Envelope<T> {
    priority: u32,
    seq: u64,
    item: T,
}

// Max-heap: higher priority first, then lower arrival sequence first.
impl<T> Ord for Envelope<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Envelope<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Envelope<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<T> Eq for Envelope<T> {}

struct QueueState<T> {
    heap: BinaryHeap<Envelope<T>>,
    next_seq: u64,
    closed: bool,
}

/// A bounded blocking queue of fixed-size records.
pub struct MessageQueue<T> {
    name: String,
    attrs: QueueAttributes,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    peak_len: AtomicUsize,
}

impl<T> MessageQueue<T> {
    /// Create an anonymous queue. Named queues come from [`Namespace::create`].
    pub fn new(name: impl Into<String>, attrs: QueueAttributes) -> Result<Self> {
        validate_attributes::<T>(&attrs)?;
        Ok(Self {
            name: name.into(),
            attrs,
            state: Mutex::new(QueueState {
                heap: BinaryHeap::with_capacity(attrs.max_messages),
                next_seq: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            peak_len: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> QueueAttributes {
        self.attrs
    }

    pub fn capacity(&self) -> usize {
        self.attrs.max_messages
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Highest number of messages the queue has held at once.
    pub fn peak_len(&self) -> usize {
        self.peak_len.load(Ordering::Relaxed)
    }

    /// Send at [`DEFAULT_PRIORITY`], blocking while the queue is full.
    pub fn send(&self, item: T) -> std::result::Result<(), SendError<T>> {
        self.send_with_priority(item, DEFAULT_PRIORITY)
    }

    /// Send at the given priority, blocking while the queue is full.
    pub fn send_with_priority(
        &self,
        item: T,
        priority: u32,
    ) -> std::result::Result<(), SendError<T>> {
        let mut state = self.state.lock();
        while !state.closed && state.heap.len() >= self.attrs.max_messages {
            self.not_full.wait(&mut state);
        }
        self.push_locked(state, item, priority)
    }

    /// Send at [`DEFAULT_PRIORITY`], giving up after `timeout`.
    pub fn send_timeout(&self, item: T, timeout: Duration) -> std::result::Result<(), SendError<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.closed && state.heap.len() >= self.attrs.max_messages {
            if self.not_full.wait_until(&mut state, deadline).timed_out()
                && state.heap.len() >= self.attrs.max_messages
                && !state.closed
            {
                self.record("send_timeout");
                return Err(SendError {
                    item,
                    reason: self.timeout_error("send", timeout),
                });
            }
        }
        self.push_locked(state, item, DEFAULT_PRIORITY)
    }

    /// Take the oldest highest-priority message, blocking while empty.
    pub fn receive(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.pop_locked(&mut state) {
                return Ok(item);
            }
            if state.closed {
                return Err(Error::QueueClosed(self.name.clone()));
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`receive`](Self::receive) but fails with [`Error::Timeout`]
    /// when nothing arrives within `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.pop_locked(&mut state) {
                return Ok(item);
            }
            if state.closed {
                return Err(Error::QueueClosed(self.name.clone()));
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                if let Some(item) = self.pop_locked(&mut state) {
                    return Ok(item);
                }
                self.record("receive_timeout");
                return Err(self.timeout_error("receive", timeout));
            }
        }
    }

    /// Non-blocking receive. `Ok(None)` when the queue is empty but open.
    pub fn try_receive(&self) -> Result<Option<T>> {
        let mut state = self.state.lock();
        match self.pop_locked(&mut state) {
            Some(item) => Ok(Some(item)),
            None if state.closed => Err(Error::QueueClosed(self.name.clone())),
            None => Ok(None),
        }
    }

    /// Mark the queue closed and wake every blocked sender and receiver.
    ///
    /// Idempotent. Messages already queued stay receivable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.record("close");
        tracing::debug!(queue = %self.name, "queue closed");
    }

    fn push_locked(
        &self,
        mut state: MutexGuard<'_, QueueState<T>>,
        item: T,
        priority: u32,
    ) -> std::result::Result<(), SendError<T>> {
        if state.closed {
            return Err(SendError {
                item,
                reason: Error::QueueClosed(self.name.clone()),
            });
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Envelope {
            priority,
            seq,
            item,
        });
        self.peak_len.fetch_max(state.heap.len(), Ordering::Relaxed);
        drop(state);
        self.not_empty.notify_one();
        self.record("send");
        Ok(())
    }

    fn pop_locked(&self, state: &mut MutexGuard<'_, QueueState<T>>) -> Option<T> {
        let envelope = state.heap.pop()?;
        self.not_full.notify_one();
        self.record("receive");
        Some(envelope.item)
    }

    fn timeout_error(&self, operation: &'static str, timeout: Duration) -> Error {
        Error::Timeout {
            queue: self.name.clone(),
            operation,
            timeout,
        }
    }

    fn record(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

pub(crate) fn validate_attributes<T>(attrs: &QueueAttributes) -> Result<()> {
    if attrs.max_messages == 0 {
        return Err(Error::InvalidAttributes(
            "max_messages must be at least 1".to_string(),
        ));
    }
    let needed = std::mem::size_of::<T>();
    if attrs.message_size < needed {
        return Err(Error::InvalidAttributes(format!(
            "message_size {} is smaller than the {needed}-byte record",
            attrs.message_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> MessageQueue<u64> {
        MessageQueue::new("/test", QueueAttributes::for_records::<u64>(capacity)).unwrap()
    }

    #[test]
    fn equal_priority_is_fifo() {
        let q = queue(4);
        for v in [10, 20, 30] {
            q.send(v).unwrap();
        }
        assert_eq!(q.receive().unwrap(), 10);
        assert_eq!(q.receive().unwrap(), 20);
        assert_eq!(q.receive().unwrap(), 30);
    }

    #[test]
    fn higher_priority_is_delivered_first() {
        let q = queue(4);
        q.send_with_priority(1, 1).unwrap();
        q.send_with_priority(2, 5).unwrap();
        q.send_with_priority(3, 1).unwrap();
        q.send_with_priority(4, 5).unwrap();
        let order: Vec<u64> = (0..4).map(|_| q.receive().unwrap()).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn send_timeout_returns_the_item_when_full() {
        let q = queue(1);
        q.send(7).unwrap();
        let err = q.send_timeout(8, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.item, 8);
        assert!(err.reason.is_retryable());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn receive_timeout_on_empty_queue() {
        let q = queue(1);
        let err = q.receive_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "receive", .. }));
    }

    #[test]
    fn closed_queue_rejects_sends_and_drains_receives() {
        let q = queue(2);
        q.send(1).unwrap();
        q.close();
        let err = q.send(2).unwrap_err();
        assert_eq!(err.item, 2);
        assert!(matches!(err.reason, Error::QueueClosed(_)));
        assert_eq!(q.receive().unwrap(), 1);
        assert!(matches!(q.receive(), Err(Error::QueueClosed(_))));
        assert!(matches!(q.try_receive(), Err(Error::QueueClosed(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let attrs = QueueAttributes::for_records::<u64>(0);
        assert!(matches!(
            MessageQueue::<u64>::new("/q", attrs),
            Err(Error::InvalidAttributes(_))
        ));
    }

    #[test]
    fn undersized_messages_are_rejected() {
        let attrs = QueueAttributes {
            max_messages: 1,
            message_size: 2,
        };
        assert!(MessageQueue::<u64>::new("/q", attrs).is_err());
    }

    #[test]
    fn peak_len_tracks_high_water_mark() {
        let q = queue(3);
        q.send(1).unwrap();
        q.send(2).unwrap();
        q.receive().unwrap();
        q.send(3).unwrap();
        assert_eq!(q.peak_len(), 2);
        assert_eq!(q.try_receive().unwrap(), Some(2));
    }
}
