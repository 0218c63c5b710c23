//! Pipeline engine: one producer thread and one consumer thread joined by a
//! single bounded queue.
//!
//! The coordinator creates the queue, runs both workers on scoped threads
//! that borrow it, joins them unconditionally, and releases the queue
//! identity on every exit path.

pub mod consumer;
pub mod producer;

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{EventSink, EventStream};
use crate::model::{Retirement, WorkItem, steps_to_one};
use crate::queue::{MessageQueue, Namespace, QueueAttributes, SendError};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_run_result, start_run_span};

pub use consumer::consume;
pub use producer::{create_rng, generate_items, produce};

/// Timeouts and retry limits shared by both workers.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub send_retries: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings::from(&Config::default())
    }
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            receive_timeout: config.receive_timeout,
            send_timeout: config.send_timeout,
            send_retries: config.send_retries,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    /// Items as the producer created them, in index order.
    pub produced: Vec<WorkItem>,
    /// Retirements in the order the consumer saw them.
    pub retired: Vec<Retirement>,
    /// Queue capacity the run was configured with.
    pub capacity: usize,
    /// Most items the queue held at once.
    pub peak_queue_depth: usize,
}

impl PipelineReport {
    pub fn total_steps(&self) -> u64 {
        self.retired.iter().map(|r| u64::from(r.step_count)).sum()
    }

    /// Check conservation, step counts against the reference trajectory,
    /// and that the queue never exceeded its capacity.
    pub fn verify(&self) -> Result<()> {
        if self.retired.len() != self.produced.len() {
            return Err(Error::Verification(format!(
                "{} sequences produced but {} retired",
                self.produced.len(),
                self.retired.len()
            )));
        }

        let starts: HashMap<u32, u64> = self
            .produced
            .iter()
            .map(|item| (item.index, item.start_value))
            .collect();
        let mut seen = HashSet::with_capacity(self.retired.len());

        for r in &self.retired {
            if !seen.insert(r.index) {
                return Err(Error::Verification(format!("#{} retired twice", r.index)));
            }
            let Some(&start) = starts.get(&r.index) else {
                return Err(Error::Verification(format!(
                    "#{} retired but was never produced",
                    r.index
                )));
            };
            if start != r.start_value {
                return Err(Error::Verification(format!(
                    "#{} started at {start} but retired as {}",
                    r.index, r.start_value
                )));
            }
            let expected = steps_to_one(start)?;
            if expected != r.step_count {
                return Err(Error::Verification(format!(
                    "#{} from {start}: reported {} steps, reference says {expected}",
                    r.index, r.step_count
                )));
            }
        }

        if self.peak_queue_depth > self.capacity {
            return Err(Error::Verification(format!(
                "queue held {} items with capacity {}",
                self.peak_queue_depth, self.capacity
            )));
        }
        Ok(())
    }
}

/// Validate `config`, generate its items and run the pipeline.
pub fn run(config: &Config, namespace: &Namespace, sink: &dyn EventSink) -> Result<PipelineReport> {
    config.validate()?;
    let items = generate_items(config.messages, config.max_random, &mut create_rng(config.seed))?;
    run_items(
        items,
        &config.queue_name,
        &WorkerSettings::from(config),
        namespace,
        sink,
    )
}

/// Run the pipeline over explicit items. The queue capacity is `items.len()`.
pub fn run_items(
    items: Vec<WorkItem>,
    queue_name: &str,
    settings: &WorkerSettings,
    namespace: &Namespace,
    sink: &dyn EventSink,
) -> Result<PipelineReport> {
    if items.is_empty() {
        return Err(Error::Config(
            "the number of messages must be at least 1".to_string(),
        ));
    }

    let run_id = Uuid::new_v4();
    let expected = items.len();
    let span = start_run_span(&run_id, expected);
    let _enter = span.enter();
    let started = Instant::now();

    let result = run_queue(items.clone(), queue_name, settings, namespace, sink);

    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::pipeline_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("result", outcome)],
    );

    let (retired, peak_queue_depth) = result?;
    record_run_result(&span, retired.len());
    info!(
        run_id = %run_id,
        retired = retired.len(),
        peak_queue_depth,
        "pipeline complete"
    );

    Ok(PipelineReport {
        run_id,
        produced: items,
        retired,
        capacity: expected,
        peak_queue_depth,
    })
}

fn run_queue(
    items: Vec<WorkItem>,
    queue_name: &str,
    settings: &WorkerSettings,
    namespace: &Namespace,
    sink: &dyn EventSink,
) -> Result<(Vec<Retirement>, usize)> {
    let expected = items.len();

    // A previous run that died without cleanup may have left the name behind.
    if namespace.unlink(queue_name) {
        warn!(queue = queue_name, "removed stale queue");
    }
    let queue = namespace.create::<WorkItem>(
        queue_name,
        QueueAttributes::for_records::<WorkItem>(expected),
    )?;

    // `queue` is closed and unlinked when it drops, on every path out.
    let events = EventStream::new(sink);
    let retired = join_workers(&queue, items, expected, settings, &events)?;
    Ok((retired, queue.peak_len()))
}

fn join_workers(
    queue: &MessageQueue<WorkItem>,
    items: Vec<WorkItem>,
    expected: usize,
    settings: &WorkerSettings,
    events: &EventStream<'_>,
) -> Result<Vec<Retirement>> {
    let parent = tracing::Span::current();

    thread::scope(|s| -> Result<Vec<Retirement>> {
        let consumer_span = parent.clone();
        let consumer = thread::Builder::new()
            .name("collatz-consumer".to_string())
            .spawn_scoped(s, move || {
                let _close = CloseOnPanic(queue);
                consumer_span.in_scope(|| consume(queue, expected, settings, events))
            })?;

        let producer_span = parent.clone();
        let producer = thread::Builder::new()
            .name("collatz-producer".to_string())
            .spawn_scoped(s, move || {
                let _close = CloseOnPanic(queue);
                producer_span.in_scope(|| produce(queue, items, settings, events))
            });
        let producer = match producer {
            Ok(handle) => handle,
            Err(e) => {
                queue.close();
                return Err(Error::Io(e));
            }
        };

        let produced = producer
            .join()
            .map_err(|_| Error::WorkerPanicked("producer"))
            .and_then(|r| r);
        let consumed = consumer
            .join()
            .map_err(|_| Error::WorkerPanicked("consumer"))
            .and_then(|r| r);

        // A failing worker closes the queue, so a peer that then sees the
        // queue closed is reporting a symptom. Report the worker that closed.
        match (produced, consumed) {
            (Err(Error::QueueClosed(_)), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
            (Ok(_), consumed) => consumed,
        }
    })
}

/// Send with a bounded wait, retrying timeouts up to `send_retries` times.
///
/// The item is only considered delivered once `send` succeeds.
pub(crate) fn deliver(
    queue: &MessageQueue<WorkItem>,
    item: WorkItem,
    settings: &WorkerSettings,
) -> Result<()> {
    let mut item = item;
    let mut attempt = 1;
    loop {
        match queue.send_timeout(item, settings.send_timeout) {
            Ok(()) => return Ok(()),
            Err(SendError { item: returned, reason })
                if reason.is_retryable() && attempt < settings.send_retries =>
            {
                warn!(
                    index = returned.index,
                    attempt,
                    max_attempts = settings.send_retries,
                    "send timed out, retrying"
                );
                attempt += 1;
                item = returned;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Closes the queue if the owning worker unwinds, so its peer wakes up.
struct CloseOnPanic<'a>(&'a MessageQueue<WorkItem>);

impl Drop for CloseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemorySink;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            receive_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(1),
            send_retries: 3,
        }
    }

    #[test]
    fn deliver_retries_then_fails_on_a_full_queue() {
        let queue = MessageQueue::<WorkItem>::new(
            "/full",
            QueueAttributes::for_records::<WorkItem>(1),
        )
        .unwrap();
        queue.send(WorkItem::new(1, 5).unwrap()).unwrap();

        let quick = WorkerSettings {
            send_timeout: Duration::from_millis(10),
            send_retries: 2,
            ..settings()
        };
        let err = deliver(&queue, WorkItem::new(2, 6).unwrap(), &quick).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn deliver_fails_fast_on_a_closed_queue() {
        let queue = MessageQueue::<WorkItem>::new(
            "/closed",
            QueueAttributes::for_records::<WorkItem>(1),
        )
        .unwrap();
        queue.close();
        let err = deliver(&queue, WorkItem::new(1, 5).unwrap(), &settings()).unwrap_err();
        assert!(matches!(err, Error::QueueClosed(_)));
    }

    #[test]
    fn report_verification_catches_wrong_step_counts() {
        let ns = Namespace::new();
        let sink = MemorySink::new();
        let items = vec![WorkItem::new(1, 6).unwrap()];
        let mut report = run_items(items, "/verify", &settings(), &ns, &sink).unwrap();
        report.verify().unwrap();

        report.retired[0].step_count += 1;
        assert!(matches!(report.verify(), Err(Error::Verification(_))));
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let ns = Namespace::new();
        let sink = MemorySink::new();
        let err = run_items(Vec::new(), "/empty", &settings(), &ns, &sink).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!ns.contains("/empty"));
    }
}
