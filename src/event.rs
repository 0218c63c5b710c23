//! Observable events emitted by the pipeline workers.
//!
//! Every line the program prints on stdout is an event. The text form of
//! each [`EventKind`] is the fixed console format; the JSON form is for
//! machine consumers. Diagnostics go through `tracing`, not through here.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A structured event emitted by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number across both workers.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Sent {
        index: u32,
        start_value: u64,
    },
    Received {
        index: u32,
        current_value: u64,
        step_count: u32,
    },
    Retired {
        index: u32,
        start_value: u64,
        step_count: u32,
    },
    ProducerComplete {
        sent: usize,
    },
    ConsumerComplete {
        retired: usize,
    },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Sent { index, start_value } => {
                write!(f, "producer->queue: (#{index} sending {start_value})")
            }
            EventKind::Received {
                index,
                current_value,
                step_count,
            } => write!(
                f,
                "queue->consumer: (#{index} received {current_value}) ({step_count} steps)"
            ),
            EventKind::Retired {
                index,
                start_value,
                step_count,
            } => write!(
                f,
                "#{index} COMPLETE! Original number {start_value} finished in {step_count} steps"
            ),
            EventKind::ProducerComplete { .. } => write!(f, "PRODUCER COMPLETE"),
            EventKind::ConsumerComplete { .. } => write!(f, "CONSUMER COMPLETE"),
        }
    }
}

/// Destination for events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Stamps events with a sequence number and timestamp and forwards them.
pub struct EventStream<'a> {
    sink: &'a dyn EventSink,
    next_seq: AtomicU64,
}

impl<'a> EventStream<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            sink,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            kind,
        };
        self.sink.emit(&event);
    }
}

/// How [`StdoutSink`] renders events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// The fixed console lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Prints each event as one line on stdout.
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl EventSink for StdoutSink {
    fn emit(&self, event: &Event) {
        let line = match self.format {
            OutputFormat::Text => event.kind.to_string(),
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("failed to serialize event {}: {e}", event.seq);
                    return;
                }
            },
        };
        // Lock so lines from the two workers never interleave mid-line.
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::warn!("failed to write event {}: {e}", event.seq);
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind.clone()).collect()
    }

    /// The events rendered in console form.
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.kind.to_string()).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_match_fixed_format() {
        let cases = [
            (
                EventKind::Sent {
                    index: 1,
                    start_value: 27,
                },
                "producer->queue: (#1 sending 27)",
            ),
            (
                EventKind::Received {
                    index: 2,
                    current_value: 52,
                    step_count: 5,
                },
                "queue->consumer: (#2 received 52) (5 steps)",
            ),
            (
                EventKind::Retired {
                    index: 3,
                    start_value: 8,
                    step_count: 3,
                },
                "#3 COMPLETE! Original number 8 finished in 3 steps",
            ),
            (EventKind::ProducerComplete { sent: 4 }, "PRODUCER COMPLETE"),
            (EventKind::ConsumerComplete { retired: 4 }, "CONSUMER COMPLETE"),
        ];
        for (kind, expected) in cases {
            assert_eq!(kind.to_string(), expected);
        }
    }

    #[test]
    fn stream_assigns_monotonic_seq() {
        let sink = MemorySink::new();
        let stream = EventStream::new(&sink);
        stream.emit(EventKind::ProducerComplete { sent: 0 });
        stream.emit(EventKind::ConsumerComplete { retired: 0 });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events[1].seq > events[0].seq);
    }

    #[test]
    fn json_form_is_tagged() {
        let event = Event {
            seq: 1,
            timestamp: Utc::now(),
            kind: EventKind::Sent {
                index: 1,
                start_value: 7,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"]["type"], "sent");
        assert_eq!(value["kind"]["start_value"], 7);
    }
}
