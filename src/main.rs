//! Telemetry pipeline CLI.
//!
//! Drives the event log and the metric recorder from the command line:
//! append events, read them back (bulk, filtered or streamed), and run a
//! synthetic workload through the recorder to inspect its health output.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use telemetry_pipeline::config::{load_config, Environment, TelemetryConfig};
use telemetry_pipeline::observability::logging::init_logging;
use telemetry_pipeline::{EventLog, LogEntry, MetricRecorder, SampleError};

#[derive(Parser)]
#[command(name = "telemetry-pipeline")]
#[command(about = "Structured event log and metric recorder", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the event log path from the configuration.
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one event and flush it
    Log {
        #[arg(long)]
        device: String,
        #[arg(long)]
        event: String,
        /// Extra field as key=value; the value is parsed as JSON when possible
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    /// Print persisted events as JSON lines
    Read {
        /// Only events from this device
        #[arg(long, conflicts_with_all = ["event", "latest"])]
        device: Option<String>,
        /// Only events with this name
        #[arg(long, conflicts_with = "latest")]
        event: Option<String>,
        /// Only the last N events
        #[arg(long)]
        latest: Option<usize>,
    },
    /// Stream persisted events without loading the whole file
    Stream,
    /// Record a synthetic workload and print the metrics export
    Simulate {
        #[arg(long, default_value = "simulated")]
        operation: String,
        #[arg(long, default_value_t = 100)]
        samples: usize,
        /// Mark every K-th sample as failed (0 disables errors)
        #[arg(long, default_value_t = 0)]
        error_every: usize,
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Validate the configuration and print it
    CheckConfig,
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err("field key must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TelemetryConfig::default(),
    };
    if let Some(path) = cli.log_file {
        config.event_log.path = path;
    }
    if let Ok(env) = std::env::var("TELEMETRY_ENV") {
        config.recorder.environment = env.parse::<Environment>()?;
    }

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::debug!(
        path = %config.event_log.path.display(),
        environment = %config.recorder.environment,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Log { device, event, fields } => {
            let mut log = EventLog::with_config(config.event_log);
            let mut entry = LogEntry::new(device, event);
            for (key, value) in fields {
                entry = entry.with_field(key, value);
            }
            log.log(entry).await?;
            log.flush().await?;
            tracing::info!(path = %log.path().display(), "Event appended");
        }
        Commands::Read { device, event, latest } => {
            let log = EventLog::with_config(config.event_log);
            let entries = match (device, event, latest) {
                (Some(device), _, _) => log.query_by_device(&device).await?,
                (None, Some(event), _) => log.query_by_event(&event).await?,
                (None, None, Some(n)) => log.latest(n).await?,
                (None, None, None) => log.read_all().await?,
            };
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Commands::Stream => {
            let log = EventLog::with_config(config.event_log);
            let mut cursor = log.stream().await?;
            let mut count = 0usize;
            while let Some(entry) = cursor.next().await {
                println!("{}", serde_json::to_string(&entry?)?);
                count += 1;
            }
            tracing::debug!(count, "Stream finished");
        }
        Commands::Simulate {
            operation,
            samples,
            error_every,
            delay_ms,
        } => {
            let recorder = MetricRecorder::new(config.recorder);
            for i in 1..=samples {
                let started = Instant::now();
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                let error = (error_every > 0 && i % error_every == 0)
                    .then(|| SampleError::new(format!("simulated failure #{}", i)));
                recorder.record(&operation, started, error);
            }

            let export = recorder.export_metrics();
            println!("{}", serde_json::to_string_pretty(&export)?);
            if !export.health.is_ok() {
                tracing::warn!(
                    unhealthy = ?export.health.unhealthy_operations,
                    synthetic_leak = export.health.synthetic_leak,
                    "Recorder reports degraded health"
                );
            }
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
