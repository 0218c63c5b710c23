//! Consumer worker: steps each received sequence and resubmits it until it
//! reaches 1.

use std::collections::HashSet;

use tracing::{Span, debug, info};

use super::{WorkerSettings, deliver};
use crate::error::{Error, Result};
use crate::event::{EventKind, EventStream};
use crate::model::{ItemState, Retirement, WorkItem};
use crate::queue::MessageQueue;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_retirement, start_worker_span};

/// Drain the queue until `expected` sequences have retired.
///
/// The consumer is also a producer: every item that has not reached 1 is
/// stepped once and sent back. On any failure the queue is closed so the
/// producer stops blocking, and the error is returned.
pub fn consume(
    queue: &MessageQueue<WorkItem>,
    expected: usize,
    settings: &WorkerSettings,
    events: &EventStream<'_>,
) -> Result<Vec<Retirement>> {
    let span = start_worker_span("consumer", queue.name());
    let _enter = span.enter();

    drain(queue, expected, settings, events, &span).inspect_err(|e| {
        tracing::error!(error = %e, "consumer aborting, closing queue");
        queue.close();
    })
}

fn drain(
    queue: &MessageQueue<WorkItem>,
    expected: usize,
    settings: &WorkerSettings,
    events: &EventStream<'_>,
    span: &Span,
) -> Result<Vec<Retirement>> {
    let mut retired = Vec::with_capacity(expected);
    let mut seen = HashSet::with_capacity(expected);

    while retired.len() < expected {
        let mut item = match queue.receive_timeout(settings.receive_timeout) {
            Ok(item) => item,
            Err(Error::QueueClosed(_)) => {
                return Err(Error::Incomplete {
                    expected,
                    remaining: expected - retired.len(),
                });
            }
            Err(e) => return Err(e),
        };

        events.emit(EventKind::Received {
            index: item.index,
            current_value: item.current_value,
            step_count: item.step_count,
        });

        match item.state() {
            ItemState::Retired => {
                if !seen.insert(item.index) {
                    return Err(Error::DuplicateRetirement(item.index));
                }
                events.emit(EventKind::Retired {
                    index: item.index,
                    start_value: item.start_value,
                    step_count: item.step_count,
                });
                record_retirement(span, item.index, item.start_value, item.step_count);
                metrics::items_retired().add(1, &[]);
                metrics::item_steps().record(u64::from(item.step_count), &[]);
                retired.push(item.retirement());
            }
            ItemState::Active => {
                item.advance()?;
                debug!(index = item.index, value = item.current_value, "stepped");
                deliver(queue, item, settings)?;
            }
        }
    }

    info!(retired = retired.len(), "consumer finished");
    events.emit(EventKind::ConsumerComplete {
        retired: retired.len(),
    });
    Ok(retired)
}
