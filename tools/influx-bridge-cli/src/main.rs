// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Bridge CLI
//!
//! Drives the writer and reader shells from a YAML configuration file.
//!
//! # Usage
//!
//! ```bash
//! # Check the writer and reader sections
//! influx-bridge -c bridge.yaml validate
//!
//! # List buckets of the configured org
//! influx-bridge -c bridge.yaml buckets
//!
//! # Print the Line Protocol for JSON-lines events without sending it
//! influx-bridge -c bridge.yaml write --measurement climate --dry-run < events.jsonl
//!
//! # Poll every 30 seconds, printing records as JSON lines
//! influx-bridge -c bridge.yaml poll --interval 30
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use influx_bridge::agent::ReceiveReport;
use influx_bridge::client::{HttpClient, MemoryClient};
use influx_bridge::config::{ConnectionSettings, WriterSettings, MEASUREMENT_TITLE};
use influx_bridge::ports::{ErrorEvent, EventSink, PlainSecrets, StaticAttributes};
use influx_bridge::{
    ActionAgent, BridgeFile, ContextProvider, Parameters, Record, TimeSeriesClient,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "influx-bridge")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Write event records to InfluxDB and poll them back")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "influx-bridge.yaml")]
    config: PathBuf,

    /// Verbose mode (show internal logs)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the writer and reader sections
    Validate,

    /// List buckets visible to the configured org
    Buckets {
        /// Use the reader connection instead of the writer one
        #[arg(long)]
        reader: bool,
    },

    /// Write JSON-lines events as points
    Write {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Measurement for events without a MeasurementTitle key
        #[arg(short, long)]
        measurement: Option<String>,

        /// Print the Line Protocol instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Query the reader slice and print new records
    Poll {
        /// Poll a single time and exit
        #[arg(long)]
        once: bool,

        /// Seconds between polls
        #[arg(short, long, default_value = "10")]
        interval: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries data.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("influx_bridge=debug,influx_bridge_cli=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let file = BridgeFile::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Validate => cmd_validate(&file),
        Commands::Buckets { reader } => cmd_buckets(&file, reader),
        Commands::Write {
            input,
            measurement,
            dry_run,
        } => cmd_write(&file, input.as_deref(), measurement.as_deref(), dry_run),
        Commands::Poll { once, interval } => cmd_poll(&file, once, interval),
    }
}

/// Prints published records as JSON lines and logs error events.
struct ConsoleSink {
    print_records: bool,
}

impl EventSink for ConsoleSink {
    fn publish(&self, records: &[Record], endpoint: &str) {
        if !self.print_records {
            tracing::debug!(endpoint, records = records.len(), "batch published");
            return;
        }
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in records {
            match serde_json::to_string(record) {
                Ok(line) => {
                    let _ = writeln!(out, "{}", line);
                }
                Err(e) => tracing::warn!(error = %e, "record not printable"),
            }
        }
    }

    fn publish_error(&self, event: ErrorEvent) {
        tracing::error!(
            id = event.agent_id,
            operation = %event.operation,
            inner = %event.inner_message,
            "{}",
            event.message
        );
    }
}

fn section<'a>(params: &'a Option<Parameters>, name: &str) -> Result<&'a Parameters> {
    params
        .as_ref()
        .with_context(|| format!("configuration has no {} section", name))
}

fn cmd_validate(file: &BridgeFile) -> Result<()> {
    if file.writer.is_none() && file.reader.is_none() {
        bail!("configuration has neither a writer nor a reader section");
    }

    let mut problems = 0;
    let checks = [
        ("writer", file.writer.as_ref().map(|p| ActionAgent::validate(p, &PlainSecrets))),
        ("reader", file.reader.as_ref().map(|p| ContextProvider::validate(p, &PlainSecrets))),
    ];
    for (name, errors) in checks {
        let Some(errors) = errors else { continue };
        if errors.is_empty() {
            println!("{}: OK", name);
        } else {
            println!("{}:", name);
            for error in &errors {
                println!("  {}", error);
            }
            problems += errors.len();
        }
    }

    if problems > 0 {
        bail!("{} configuration problem(s)", problems);
    }
    Ok(())
}

fn cmd_buckets(file: &BridgeFile, reader: bool) -> Result<()> {
    let params = if reader {
        section(&file.reader, "reader")?
    } else {
        section(&file.writer, "writer")?
    };
    let settings = ConnectionSettings::resolve(params, &PlainSecrets)?;
    let client = HttpClient::connect(&settings)?;

    let buckets = client
        .list_buckets(&settings.org)
        .context("Failed to list buckets")?;
    if buckets.is_empty() {
        println!("No buckets in org {}", settings.org);
    }
    for bucket in buckets {
        println!("{}\t{}", bucket.name, bucket.id);
    }
    Ok(())
}

fn cmd_write(
    file: &BridgeFile,
    input: Option<&Path>,
    measurement: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let params = section(&file.writer, "writer")?;
    let attributes = StaticAttributes(file.attributes.clone());
    let sink = Arc::new(ConsoleSink {
        print_records: false,
    });

    let events = parse_events(&read_input(input)?)?;
    let mapped = mapped_events(&events, measurement)?;

    if dry_run {
        let client = Arc::new(MemoryClient::new());
        let mut agent =
            ActionAgent::initialize(params, &PlainSecrets, client.clone(), &attributes, sink, 0)?;
        let report = agent.receive(&events, &mapped);
        for line in client.lines() {
            println!("{}", line);
        }
        return finish(report);
    }

    let settings = WriterSettings::resolve(params, &PlainSecrets)?;
    let client =
        Arc::new(HttpClient::connect(&settings.connection)?.with_batch_size(settings.batch_size));
    let mut agent = ActionAgent::initialize(params, &PlainSecrets, client, &attributes, sink, 0)?;
    finish(agent.receive(&events, &mapped))
}

fn finish(report: ReceiveReport) -> Result<()> {
    if let Some(reason) = report.aborted {
        bail!("batch aborted after {} point(s): {}", report.written, reason);
    }
    tracing::info!(
        written = report.written,
        failed = report.write_failures.len(),
        "batch done"
    );
    if !report.write_failures.is_empty() {
        bail!("{} point(s) failed to write", report.write_failures.len());
    }
    Ok(())
}

fn cmd_poll(file: &BridgeFile, once: bool, interval: u64) -> Result<()> {
    let params = section(&file.reader, "reader")?;
    let settings = ConnectionSettings::resolve(params, &PlainSecrets)?;
    let client = Arc::new(HttpClient::connect(&settings)?);
    let sink = Arc::new(ConsoleSink {
        print_records: true,
    });
    let mut provider = ContextProvider::initialize(params, &PlainSecrets, client, sink, 0)?;

    if once {
        let published = provider.poll()?;
        tracing::info!(published, "poll done");
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());
    tracing::info!(interval, "polling, Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        match provider.poll() {
            Ok(published) => tracing::debug!(published, "poll done"),
            Err(e) => tracing::error!(error = %e, "poll failed"),
        }
        std::thread::sleep(Duration::from_secs(interval));
    }
    Ok(())
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        running.store(false, Ordering::SeqCst);
    });
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// One JSON object per non-blank line.
fn parse_events(text: &str) -> Result<Vec<Record>> {
    let mut events = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        let record = Record::from_json(value)
            .with_context(|| format!("line {}: expected a JSON object", n + 1))?;
        events.push(record);
    }
    Ok(events)
}

/// Measurement carrier for each event: its own `MeasurementTitle`, else the
/// command-line default.
fn mapped_events(events: &[Record], default: Option<&str>) -> Result<Vec<Record>> {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let title = event
                .lookup(MEASUREMENT_TITLE)
                .map(|v| v.to_string())
                .or_else(|| default.map(str::to_string));
            match title {
                Some(title) => Ok(Record::new().with(MEASUREMENT_TITLE, title)),
                None => bail!(
                    "event {} has no {} and no --measurement was given",
                    i,
                    MEASUREMENT_TITLE
                ),
            }
        })
        .collect()
}
