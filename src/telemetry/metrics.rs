//! Metric instrument factories for collatz-mq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op and recording
//! is free.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("collatz-mq")
}

/// Counter: queue-level operations (send, receive, close, timeouts).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("collatz.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: initial work items sent by the producer.
pub fn items_produced() -> Counter<u64> {
    meter()
        .u64_counter("collatz.items.produced")
        .with_description("Number of sequences handed to the queue")
        .build()
}

/// Counter: sequences that reached 1.
pub fn items_retired() -> Counter<u64> {
    meter()
        .u64_counter("collatz.items.retired")
        .with_description("Number of sequences that reached 1")
        .build()
}

/// Histogram: steps each sequence took to reach 1.
pub fn item_steps() -> Histogram<u64> {
    meter()
        .u64_histogram("collatz.item.steps")
        .with_description("Collatz steps per retired sequence")
        .build()
}

/// Histogram: wall time of a full pipeline run in milliseconds.
/// Labels: `result` ("ok" | "error").
pub fn pipeline_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("collatz.pipeline.duration_ms")
        .with_description("Pipeline run duration in milliseconds")
        .with_unit("ms")
        .build()
}
