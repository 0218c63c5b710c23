//! # collatz-mq
//!
//! A producer and a re-producing consumer walking Collatz sequences through
//! one bounded, priority-ordered message queue.
//!
//! Provides the queue and its named identities ([`queue`]), the worker
//! threads and run coordinator ([`engine`]), the console event stream
//! ([`event`]), and tracing/OpenTelemetry setup ([`telemetry`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod telemetry;

pub use error::{Error, Result};
