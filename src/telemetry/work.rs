//! Pipeline span helpers.
//!
//! Provides spans for a pipeline run and its two workers, and events for
//! sequence retirement.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one pipeline run.
///
/// The `run.retired` field is declared empty and filled in by
/// [`record_run_result`].
pub fn start_run_span(run_id: &Uuid, messages: usize) -> Span {
    tracing::info_span!(
        "pipeline.run",
        "run.id" = %run_id,
        "run.messages" = messages,
        "run.retired" = tracing::field::Empty,
    )
}

/// Start a span for a worker thread (`producer` or `consumer`).
pub fn start_worker_span(role: &'static str, queue: &str) -> Span {
    tracing::info_span!("pipeline.worker", "worker.role" = role, "queue.name" = queue)
}

/// Record a retirement event on the given span.
pub fn record_retirement(span: &Span, index: u32, start_value: u64, steps: u32) {
    span.in_scope(|| {
        tracing::debug!(index, start_value, steps, "sequence retired");
    });
}

pub fn record_run_result(span: &Span, retired: usize) {
    span.record("run.retired", retired);
}
