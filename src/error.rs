//! Error types for collatz-mq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid queue name {0:?}: expected '/' followed by a name with no further '/'")]
    InvalidQueueName(String),

    #[error("invalid queue attributes: {0}")]
    InvalidAttributes(String),

    #[error("queue {0} already exists")]
    QueueExists(String),

    #[error("queue {0} does not exist")]
    QueueNotFound(String),

    #[error("queue {0} holds a different record type")]
    QueueTypeMismatch(String),

    #[error("queue {0} is closed")]
    QueueClosed(String),

    #[error("timed out after {timeout:?} waiting to {operation} on queue {queue}")]
    Timeout {
        queue: String,
        operation: &'static str,
        timeout: std::time::Duration,
    },

    #[error("invalid collatz value: {0}")]
    InvalidValue(u64),

    #[error("collatz step overflowed u64 at {0}")]
    Overflow(u64),

    #[error("sequence #{0} retired more than once")]
    DuplicateRetirement(u32),

    #[error("pipeline stopped with {remaining} of {expected} sequences unfinished")]
    Incomplete { expected: usize, remaining: usize },

    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse grouping of errors, used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad flags, env vars or config file.
    Config,
    /// The queue identity could not be established.
    Setup,
    /// Send/receive failed while the pipeline was running.
    Transport,
    Internal,
}

impl ErrorClass {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorClass::Config => 2,
            ErrorClass::Setup => 3,
            ErrorClass::Transport => 4,
            ErrorClass::Internal => 1,
        }
    }
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_) | Error::Toml(_) => ErrorClass::Config,
            Error::InvalidQueueName(_)
            | Error::InvalidAttributes(_)
            | Error::QueueExists(_)
            | Error::QueueNotFound(_)
            | Error::QueueTypeMismatch(_) => ErrorClass::Setup,
            Error::QueueClosed(_)
            | Error::Timeout { .. }
            | Error::DuplicateRetirement(_)
            | Error::Incomplete { .. } => ErrorClass::Transport,
            Error::InvalidValue(_)
            | Error::Overflow(_)
            | Error::WorkerPanicked(_)
            | Error::Verification(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorClass::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.class().exit_code()
    }

    /// Whether a send that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_codes_are_distinct_per_class() {
        assert_eq!(Error::Config("n too large".into()).exit_code(), 2);
        assert_eq!(Error::QueueExists("/q".into()).exit_code(), 3);
        assert_eq!(Error::QueueClosed("/q".into()).exit_code(), 4);
        assert_eq!(Error::WorkerPanicked("consumer").exit_code(), 1);
    }

    #[test]
    fn only_timeouts_are_retryable() {
        let timeout = Error::Timeout {
            queue: "/q".into(),
            operation: "send",
            timeout: Duration::from_millis(5),
        };
        assert!(timeout.is_retryable());
        assert!(!Error::QueueClosed("/q".into()).is_retryable());
    }
}
