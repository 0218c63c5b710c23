//! Typed configuration.
//!
//! Built once at startup from, in increasing precedence: defaults, an
//! optional TOML file, environment variables, and CLI flags. The result is
//! validated before any queue is created and then passed by reference.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::queue::namespace::validate_name;

pub const DEFAULT_MESSAGES: usize = 10;
pub const DEFAULT_MAX_RANDOM: u64 = 10_000;
pub const DEFAULT_MESSAGE_CEILING: usize = 10;
pub const DEFAULT_QUEUE_NAME: &str = "/collatz";

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of sequences to generate; also the queue capacity.
    pub messages: usize,
    /// Inclusive upper bound for random start values.
    pub max_random: u64,
    /// Largest accepted `messages`.
    pub message_ceiling: usize,
    /// RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub queue_name: String,
    /// How long the consumer waits for the next item before giving up.
    pub receive_timeout: Duration,
    /// How long a single send attempt may block.
    pub send_timeout: Duration,
    /// Attempts per item before a timed-out send is fatal.
    pub send_retries: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            messages: DEFAULT_MESSAGES,
            max_random: DEFAULT_MAX_RANDOM,
            message_ceiling: DEFAULT_MESSAGE_CEILING,
            seed: None,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            receive_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(5),
            send_retries: 3,
            otel_endpoint: None,
            log_level: "warn".to_string(),
        }
    }
}

/// On-disk form. Every key is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    messages: Option<usize>,
    max_random: Option<u64>,
    message_ceiling: Option<usize>,
    seed: Option<u64>,
    queue_name: Option<String>,
    receive_timeout_secs: Option<u64>,
    send_timeout_secs: Option<u64>,
    send_retries: Option<u32>,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// Load configuration: defaults, then `path` if given, then the process
    /// environment.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Defaults overlaid with a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(v) = file.messages {
            config.messages = v;
        }
        if let Some(v) = file.max_random {
            config.max_random = v;
        }
        if let Some(v) = file.message_ceiling {
            config.message_ceiling = v;
        }
        if file.seed.is_some() {
            config.seed = file.seed;
        }
        if let Some(v) = file.queue_name {
            config.queue_name = v;
        }
        if let Some(v) = file.receive_timeout_secs {
            config.receive_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.send_timeout_secs {
            config.send_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.send_retries {
            config.send_retries = v;
        }
        if file.otel_endpoint.is_some() {
            config.otel_endpoint = file.otel_endpoint;
        }
        if let Some(v) = file.log_level {
            config.log_level = v;
        }
        Ok(config)
    }

    /// Overlay variables looked up through `var`.
    ///
    /// Takes a lookup function so callers and tests need not touch the
    /// process environment.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("COLLATZ_MESSAGES") {
            self.messages = parse_var("COLLATZ_MESSAGES", &v)?;
        }
        if let Some(v) = var("COLLATZ_MAX_RANDOM") {
            self.max_random = parse_var("COLLATZ_MAX_RANDOM", &v)?;
        }
        if let Some(v) = var("COLLATZ_SEED") {
            self.seed = Some(parse_var("COLLATZ_SEED", &v)?);
        }
        if let Some(v) = var("COLLATZ_QUEUE_NAME") {
            self.queue_name = v;
        }
        if let Some(v) = var("COLLATZ_RECEIVE_TIMEOUT_SECS") {
            self.receive_timeout =
                Duration::from_secs(parse_var("COLLATZ_RECEIVE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(v);
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Check limits. Must pass before any queue work begins.
    pub fn validate(&self) -> Result<()> {
        if self.messages == 0 {
            return Err(Error::Config(
                "the number of messages must be at least 1".to_string(),
            ));
        }
        if self.messages > self.message_ceiling {
            return Err(Error::Config(format!(
                "the number of messages cannot exceed {} (got {})",
                self.message_ceiling, self.messages
            )));
        }
        if self.max_random == 0 {
            return Err(Error::Config(
                "the maximum random number must be at least 1".to_string(),
            ));
        }
        if self.send_retries == 0 {
            return Err(Error::Config("send_retries must be at least 1".to_string()));
        }
        if self.receive_timeout.is_zero() {
            return Err(Error::Config(
                "receive timeout must be at least 1 second".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(Error::Config(
                "send timeout must be at least 1 second".to_string(),
            ));
        }
        validate_name(&self.queue_name).map_err(|e| Error::Config(e.to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("environment variable {name}={value:?}: {e}")))
}
