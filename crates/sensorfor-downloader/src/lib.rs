// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SensorFor Downloader
//!
//! Periodically downloads sensor readings from the SensorFor cloud M2M API
//! and stores them in SQLite, once per `(device, timestamp)`.
//!
//! # Features
//!
//! - **Line Parser** -- `YY;MM;DD;HH;MM;SS;MODULE;V1;...;Vn` records into typed measurements
//! - **Idempotent Store** -- re-downloaded readings are skipped, never duplicated
//! - **Audit Log** -- one `download_log` entry per device per run, success or failure
//! - **Weekly Schedule** -- daemon mode with a fixed weekday and time
//!
//! # Architecture
//!
//! ```text
//! FleetRunner
//! +-- DevicePipeline      (one device: fetch, parse, store, audit)
//!     +-- Fetcher         (HTTP or mock)
//!     +-- parse_line      (pure line parser)
//!     +-- MeasurementStore (SQLite backend)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sensorfor_downloader::{
//!     load_devices, DevicePipeline, FleetRunner, HttpFetcher, SqliteStore, DEFAULT_API_URL,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let devices = load_devices(Some("devices.json".as_ref()))?;
//! let store = Arc::new(SqliteStore::new("sensorfor.db")?);
//! let fetcher = Arc::new(HttpFetcher::new(DEFAULT_API_URL, Duration::from_secs(30))?);
//!
//! let runner = FleetRunner::new(DevicePipeline::new(store, fetcher, 960, 1));
//! let report = runner.run(&devices);
//! ```

pub mod config;
pub mod devices;
pub mod fetch;
pub mod fleet;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod schedule;
pub mod sqlite;
pub mod store;

pub use config::{ConfigError, DownloaderConfig};
pub use devices::{builtin_devices, load_devices, DeviceConfig, DeviceConfigError};
pub use fetch::{FetchError, Fetcher, HttpFetcher, MockFetcher, DEFAULT_API_URL, MAX_LINES};
pub use fleet::{FleetReport, FleetRunner};
pub use parser::{parse_line, Rejection, API_ERRORS};
pub use pipeline::{DevicePipeline, DeviceReport, IngestError, IngestReport, RunStatus};
pub use schedule::{ScheduleError, Scheduler, StopHandle, WeeklySchedule};
pub use sqlite::SqliteStore;
pub use store::{
    DownloadLogRecord, InsertOutcome, Measurement, MeasurementField, MeasurementStore, Reading,
};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Build a fleet runner over a SQLite database and the HTTP API.
pub fn http_runner(config: &DownloaderConfig) -> Result<FleetRunner<SqliteStore, HttpFetcher>> {
    config.validate()?;

    let store = SqliteStore::new(&config.db_path)?;
    let fetcher = HttpFetcher::new(config.api_url.clone(), config.timeout())
        .context("Failed to create HTTP client")?;

    Ok(FleetRunner::new(DevicePipeline::new(
        Arc::new(store),
        Arc::new(fetcher),
        config.lines,
        config.zoom,
    )))
}
