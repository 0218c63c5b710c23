//! collatz CLI: runs the producer/consumer Collatz pipeline once.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use collatz_mq::config::Config;
use collatz_mq::engine;
use collatz_mq::error::Error;
use collatz_mq::event::{OutputFormat, StdoutSink};
use collatz_mq::queue::Namespace;
use collatz_mq::telemetry::{TelemetryConfig, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "collatz",
    about = "Walk random Collatz sequences through a bounded message queue"
)]
struct Cli {
    /// Number of sequences to generate (at most the configured ceiling, default 10)
    #[arg(short = 'n', long)]
    messages: Option<usize>,
    /// Inclusive upper bound for random start values (default 10000)
    #[arg(short = 'r', long)]
    max_random: Option<u64>,
    /// Seed for reproducible start values
    #[arg(short, long)]
    seed: Option<u64>,
    /// Queue identity, e.g. /collatz
    #[arg(long)]
    queue_name: Option<String>,
    /// Seconds the consumer waits for an item before giving up
    #[arg(long)]
    receive_timeout_secs: Option<u64>,
    /// TOML config file; flags and env vars override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output format for pipeline events
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Cross-check every result against a reference Collatz implementation
    #[arg(long)]
    verify: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    let telemetry = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "collatz".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let format = OutputFormat::from(cli.format);
    let outcome = tokio::task::spawn_blocking(move || {
        let namespace = Namespace::new();
        let sink = StdoutSink::new(format);
        engine::run(&config, &namespace, &sink)
    })
    .await
    .context("pipeline task failed")?;

    // Export the run's spans and metrics whether or not it succeeded.
    telemetry.force_flush();
    let report = outcome?;

    if cli.verify {
        report.verify()?;
        info!(
            sequences = report.retired.len(),
            total_steps = report.total_steps(),
            "verified against reference"
        );
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(n) = cli.messages {
        config.messages = n;
    }
    if let Some(r) = cli.max_random {
        config.max_random = r;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(ref name) = cli.queue_name {
        config.queue_name = name.clone();
    }
    if let Some(secs) = cli.receive_timeout_secs {
        config.receive_timeout = std::time::Duration::from_secs(secs);
    }
    Ok(config)
}
