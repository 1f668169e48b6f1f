// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SensorFor Downloader CLI
//!
//! # Usage
//!
//! ```bash
//! # Weekly daemon (Monday 02:00)
//! sensorfor-downloader
//!
//! # One download pass over all devices, then exit
//! sensorfor-downloader --devices devices.json run-now
//!
//! # Recent download runs
//! sensorfor-downloader status --limit 50
//!
//! # Latest readings of one device
//! sensorfor-downloader query office_sensor --limit 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sensorfor_downloader::report::{readings_report, status_table};
use sensorfor_downloader::{
    http_runner, load_devices, DeviceConfig, DownloaderConfig, FleetReport, MeasurementStore,
    Reading, Scheduler, SqliteStore, StopHandle, WeeklySchedule, DEFAULT_API_URL, MAX_LINES,
};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Targets written to the log file. Dependency logs stay out of it.
const FILE_LOG_FILTER: &str = "sensorfor_downloader=debug";

#[derive(Parser, Debug)]
#[command(name = "sensorfor-downloader")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SensorFor cloud downloader - store sensor readings in SQLite")]
#[command(long_about = None)]
struct Cli {
    /// Database path (SQLite file)
    #[arg(long, global = true, default_value = "sensorfor.db")]
    db: String,

    /// Device list (JSON array)
    #[arg(long, global = true, default_value = "devices.json")]
    devices: PathBuf,

    /// Use the built-in device list instead of --devices
    #[arg(long, global = true)]
    builtin_devices: bool,

    /// Remote API endpoint
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Records requested per device
    #[arg(long, global = true, default_value_t = MAX_LINES)]
    lines: u32,

    /// Time resolution (1 = finest, 20 = coarsest)
    #[arg(long, global = true, default_value_t = 1)]
    zoom: u32,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Debug-level log file
    #[arg(long, global = true, default_value = "sensorfor.log")]
    log_file: PathBuf,

    /// Verbose console output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download all devices once and exit
    RunNow,
    /// Show recent download runs
    Status {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the latest readings of a device
    Query {
        /// Device alias
        alias: String,
        /// Number of readings to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Download on a weekly schedule until interrupted
    Daemon {
        /// Day of the week
        #[arg(long, default_value = "monday")]
        day: String,
        /// Local time, HH:MM
        #[arg(long, default_value = "02:00")]
        at: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let default = if cli.verbose {
        "sensorfor_downloader=debug"
    } else {
        "sensorfor_downloader=info"
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file '{}'", cli.log_file.display()))?;

    let console = fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer(file))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new(FILE_LOG_FILTER))
}

fn build_config(cli: &Cli) -> DownloaderConfig {
    let builder = DownloaderConfig::builder()
        .db_path(&cli.db)
        .api_url(&cli.api_url)
        .lines(cli.lines)
        .zoom(cli.zoom)
        .timeout_secs(cli.timeout);

    if cli.builtin_devices {
        builder.builtin_devices().build()
    } else {
        builder.devices_file(&cli.devices).build()
    }
}

/// Returns the process exit code.
fn run(cli: Cli) -> Result<i32> {
    let config = build_config(&cli);

    match cli.command {
        Some(Commands::RunNow) => {
            let devices = startup_devices(&config)?;
            let runner = http_runner(&config)?;
            let report = runner.run(&devices);
            print_summary(&report);
            Ok(0)
        }
        Some(Commands::Status { limit }) => {
            let store = SqliteStore::new(&config.db_path)?;
            show_status(&store, limit)?;
            Ok(0)
        }
        Some(Commands::Query { alias, limit }) => {
            let store = SqliteStore::new(&config.db_path)?;
            show_readings(&store, &alias, limit)
        }
        Some(Commands::Daemon { day, at }) => run_daemon(&config, &day, &at),
        None => run_daemon(&config, "monday", "02:00"),
    }
}

fn startup_devices(config: &DownloaderConfig) -> Result<Vec<DeviceConfig>> {
    config.validate()?;
    let devices =
        load_devices(config.devices_file.as_deref()).context("Failed to load device list")?;
    tracing::info!(
        devices = devices.len(),
        db = %config.db_path,
        "Device list loaded"
    );
    Ok(devices)
}

fn run_daemon(config: &DownloaderConfig, day: &str, at: &str) -> Result<i32> {
    let schedule = WeeklySchedule::parse(day, at)?;
    let devices = startup_devices(config)?;
    let runner = http_runner(config)?;

    let scheduler = Scheduler::new(schedule);
    ctrlc_handler(scheduler.stop_handle());

    tracing::info!(%schedule, "Downloader daemon started (Ctrl+C to stop)");
    let runs = scheduler.run(|| {
        let report = runner.run(&devices);
        print_summary(&report);
    });
    tracing::info!(runs, "Downloader daemon stopped");
    Ok(0)
}

fn print_summary(report: &FleetReport) {
    for device in &report.devices {
        let status = if device.status.is_ok() {
            device.status.to_string().green()
        } else {
            device.status.to_string().red()
        };
        println!(
            "  {:<20} fetched {:>4}  new {:>4}  {}",
            device.alias, device.counts.rows_fetched, device.counts.rows_inserted, status
        );
    }

    let failed = report.failed();
    let line = format!(
        "{} devices, {} rows fetched, {} new, {} failed",
        report.devices.len(),
        report.rows_fetched(),
        report.rows_inserted(),
        failed
    );
    if failed == 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.yellow().bold());
    }
}

fn show_status<S: MeasurementStore>(store: &S, limit: usize) -> Result<()> {
    let records = store.recent_logs(limit)?;
    if records.is_empty() {
        println!("{}", "No download runs recorded yet.".yellow());
        return Ok(());
    }

    println!("{}", "Recent download runs:".bold());
    println!("{}", status_table(&records));
    Ok(())
}

/// What `query` found for an alias
#[derive(Debug, PartialEq)]
enum QueryView {
    UnknownAlias,
    NoData,
    Readings {
        device_id: String,
        readings: Vec<Reading>,
    },
}

fn query_view<S: MeasurementStore>(store: &S, alias: &str, limit: usize) -> Result<QueryView> {
    let Some(device_id) = store.device_id_for_alias(alias)? else {
        return Ok(QueryView::UnknownAlias);
    };

    let readings = store.latest_readings(&device_id, limit)?;
    if readings.is_empty() {
        return Ok(QueryView::NoData);
    }
    Ok(QueryView::Readings {
        device_id,
        readings,
    })
}

fn show_readings<S: MeasurementStore>(store: &S, alias: &str, limit: usize) -> Result<i32> {
    match query_view(store, alias, limit)? {
        QueryView::UnknownAlias => {
            println!("{} unknown device alias '{}'", "Error:".red().bold(), alias);
            Ok(1)
        }
        QueryView::NoData => {
            println!(
                "{}",
                format!("No measurement data found for alias '{}'.", alias).yellow()
            );
            Ok(0)
        }
        QueryView::Readings {
            device_id,
            readings,
        } => {
            println!(
                "{}",
                format!(
                    "Latest {} readings for {} ({}):",
                    readings.len(),
                    alias,
                    device_id
                )
                .bold()
            );
            print!("{}", readings_report(&readings));
            Ok(0)
        }
    }
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
