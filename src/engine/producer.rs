//! Producer worker: builds the initial work items and hands them to the queue.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{WorkerSettings, deliver};
use crate::error::{Error, Result};
use crate::event::{EventKind, EventStream};
use crate::model::WorkItem;
use crate::queue::MessageQueue;
use crate::telemetry::metrics;
use crate::telemetry::work::start_worker_span;

/// Create a random number generator, seeded when a seed is given.
///
/// `None` draws the seed from OS entropy, so every run differs.
#[must_use]
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

/// Build `count` items indexed `1..=count` with start values drawn
/// uniformly from `[1, max_random]`.
pub fn generate_items<R: Rng>(
    count: usize,
    max_random: u64,
    rng: &mut R,
) -> Result<Vec<WorkItem>> {
    if max_random == 0 {
        return Err(Error::Config(
            "the maximum random number must be at least 1".to_string(),
        ));
    }
    (1..=count)
        .map(|i| {
            let index = u32::try_from(i)
                .map_err(|_| Error::Config(format!("too many messages: {count}")))?;
            WorkItem::new(index, rng.random_range(1..=max_random))
        })
        .collect()
}

/// Send every item in order. Returns the number of items delivered.
///
/// Does not wait for the consumer. On a fatal send error the queue is
/// closed so the consumer stops waiting, and the error is returned.
pub fn produce(
    queue: &MessageQueue<WorkItem>,
    items: Vec<WorkItem>,
    settings: &WorkerSettings,
    events: &EventStream<'_>,
) -> Result<usize> {
    let span = start_worker_span("producer", queue.name());
    let _enter = span.enter();

    send_all(queue, items, settings, events).inspect_err(|e| {
        tracing::error!(error = %e, "producer aborting, closing queue");
        queue.close();
    })
}

fn send_all(
    queue: &MessageQueue<WorkItem>,
    items: Vec<WorkItem>,
    settings: &WorkerSettings,
    events: &EventStream<'_>,
) -> Result<usize> {
    let mut sent = 0;
    for item in items {
        events.emit(EventKind::Sent {
            index: item.index,
            start_value: item.start_value,
        });
        deliver(queue, item, settings)?;
        debug!(index = item.index, start_value = item.start_value, "sent");
        metrics::items_produced().add(1, &[]);
        sent += 1;
    }
    info!(sent, "producer finished");
    events.emit(EventKind::ProducerComplete { sent });
    Ok(sent)
}
