// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-device download pipeline
//!
//! # Operation
//!
//! 1. Fetch the raw record text for the device
//! 2. Split into non-empty lines (`rows_fetched`)
//! 3. Register the device, then parse and store each line
//! 4. Append exactly one audit entry, whatever happened above
//!
//! Ingestion and audit logging are separate stages: [`DevicePipeline::ingest`]
//! computes the outcome, [`DevicePipeline::record`] writes it and only
//! reports its own failures.

use crate::devices::DeviceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::parser::parse_line;
use crate::store::{InsertOutcome, MeasurementStore};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Counters accumulated while ingesting one device
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-empty lines returned by the API
    pub rows_fetched: u64,
    /// New measurements stored
    pub rows_inserted: u64,
    /// Lines the parser rejected
    pub rows_rejected: u64,
}

impl IngestReport {
    /// Parsed lines that were already stored.
    pub fn duplicates(&self) -> u64 {
        self.rows_fetched
            .saturating_sub(self.rows_inserted)
            .saturating_sub(self.rows_rejected)
    }
}

/// Why ingestion of a device stopped early
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("storage error: {cause:#}")]
    Storage {
        cause: anyhow::Error,
        /// Counters up to the failing write
        partial: IngestReport,
    },
}

impl IngestError {
    /// Counters reached before the failure.
    pub fn partial(&self) -> IngestReport {
        match self {
            Self::Fetch(_) => IngestReport::default(),
            Self::Storage { partial, .. } => *partial,
        }
    }
}

/// Final status of one device run, as written to the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Failed(String),
}

impl RunStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Failed(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Result of one device run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub device_id: String,
    pub alias: String,
    pub counts: IngestReport,
    pub status: RunStatus,
    /// Whether the audit entry was written
    pub logged: bool,
}

impl DeviceReport {
    /// Build a report from the ingestion outcome.
    pub fn from_outcome(device: &DeviceConfig, outcome: &Result<IngestReport, IngestError>) -> Self {
        let (counts, status) = match outcome {
            Ok(counts) => (*counts, RunStatus::Ok),
            Err(e) => (e.partial(), RunStatus::Failed(e.to_string())),
        };

        Self {
            device_id: device.device_id.clone(),
            alias: device.alias.clone(),
            counts,
            status,
            logged: false,
        }
    }

    /// Report for a device whose pipeline failed unexpectedly.
    pub fn failed(device: &DeviceConfig, message: impl Into<String>) -> Self {
        Self {
            device_id: device.device_id.clone(),
            alias: device.alias.clone(),
            counts: IngestReport::default(),
            status: RunStatus::Failed(message.into()),
            logged: false,
        }
    }
}

/// Fetch → parse → store pipeline for a single device
pub struct DevicePipeline<S: MeasurementStore, F: Fetcher> {
    store: Arc<S>,
    fetcher: Arc<F>,
    lines: u32,
    zoom: u32,
}

impl<S: MeasurementStore, F: Fetcher> DevicePipeline<S, F> {
    /// Create a pipeline requesting `lines` records at resolution `zoom`
    pub fn new(store: Arc<S>, fetcher: Arc<F>, lines: u32, zoom: u32) -> Self {
        Self {
            store,
            fetcher,
            lines,
            zoom,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run both stages for one device.
    pub fn run(&self, device: &DeviceConfig) -> DeviceReport {
        tracing::info!(device = %device.alias, id = %device.device_id, "Downloading device");

        let outcome = self.ingest(device);
        match &outcome {
            Ok(counts) => tracing::info!(
                device = %device.alias,
                inserted = counts.rows_inserted,
                duplicates = counts.duplicates(),
                rejected = counts.rows_rejected,
                "Stored new rows"
            ),
            Err(e) => tracing::error!(device = %device.alias, error = %e, "Download failed"),
        }

        let mut report = DeviceReport::from_outcome(device, &outcome);
        report.logged = self.record(&report);
        report
    }

    /// Fetch, parse and store the records of one device.
    pub fn ingest(&self, device: &DeviceConfig) -> Result<IngestReport, IngestError> {
        let raw = self
            .fetcher
            .fetch(&device.device_id, self.lines, self.zoom)?;

        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut report = IngestReport {
            rows_fetched: lines.len() as u64,
            ..Default::default()
        };
        tracing::info!(device = %device.alias, rows = report.rows_fetched, "Fetched lines");

        if let Err(cause) = self.store.ensure_device(&device.device_id, &device.alias) {
            return Err(IngestError::Storage {
                cause,
                partial: report,
            });
        }

        for line in lines {
            let measurement = match parse_line(line, &device.field_names) {
                Ok(m) => m,
                Err(reason) => {
                    tracing::debug!(line, %reason, "Skipping unparseable line");
                    report.rows_rejected += 1;
                    continue;
                }
            };

            match self.store.store_measurement(&device.device_id, &measurement) {
                Ok(InsertOutcome::Inserted(_)) => report.rows_inserted += 1,
                Ok(InsertOutcome::Duplicate) => {}
                Err(cause) => {
                    return Err(IngestError::Storage {
                        cause,
                        partial: report,
                    })
                }
            }
        }

        Ok(report)
    }

    /// Append the audit entry for `report`. Returns false if it could not be written.
    pub fn record(&self, report: &DeviceReport) -> bool {
        let status = report.status.to_string();
        match self.store.append_log(
            &report.device_id,
            report.counts.rows_fetched,
            report.counts.rows_inserted,
            &status,
        ) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    device = %report.alias,
                    error = %e,
                    "Could not write download_log entry"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use crate::fleet::FleetRunner;
    use crate::sqlite::SqliteStore;
    use crate::store::{DownloadLogRecord, Measurement, MeasurementField, Reading};
    use anyhow::anyhow;
    use chrono::NaiveDateTime;

    /// SQLite store whose measurement writes fail at one timestamp and whose
    /// audit log is unwritable.
    struct FailingStore {
        inner: SqliteStore,
        fail_at: NaiveDateTime,
    }

    impl MeasurementStore for FailingStore {
        fn ensure_device(&self, device_id: &str, alias: &str) -> anyhow::Result<()> {
            self.inner.ensure_device(device_id, alias)
        }

        fn insert_measurement(
            &self,
            device_id: &str,
            timestamp: NaiveDateTime,
            raw_line: &str,
        ) -> anyhow::Result<InsertOutcome> {
            self.inner.insert_measurement(device_id, timestamp, raw_line)
        }

        fn insert_fields(
            &self,
            measurement_id: i64,
            fields: &[MeasurementField],
        ) -> anyhow::Result<()> {
            self.inner.insert_fields(measurement_id, fields)
        }

        fn store_measurement(
            &self,
            device_id: &str,
            measurement: &Measurement,
        ) -> anyhow::Result<InsertOutcome> {
            if measurement.timestamp == self.fail_at {
                return Err(anyhow!("disk full"));
            }
            self.inner.store_measurement(device_id, measurement)
        }

        fn append_log(&self, _: &str, _: u64, _: u64, _: &str) -> anyhow::Result<()> {
            Err(anyhow!("database is locked"))
        }

        fn recent_logs(&self, limit: usize) -> anyhow::Result<Vec<DownloadLogRecord>> {
            self.inner.recent_logs(limit)
        }

        fn device_id_for_alias(&self, alias: &str) -> anyhow::Result<Option<String>> {
            self.inner.device_id_for_alias(alias)
        }

        fn latest_readings(&self, device_id: &str, limit: usize) -> anyhow::Result<Vec<Reading>> {
            self.inner.latest_readings(device_id, limit)
        }

        fn measurement_count(&self, device_id: &str) -> anyhow::Result<usize> {
            self.inner.measurement_count(device_id)
        }
    }

    const BODY: &str = "24;03;15;08;30;00;7;21.5;55.2;410;\n\
                        24;03;15;08;40;00;7;21.7;55.0;415;\n\
                        \n\
                        garbage line\n\
                        24;03;15;08;50;00;7;ERR;54.9;420;\n";

    fn device() -> DeviceConfig {
        DeviceConfig::new("12345", "office", &["temperature", "humidity", "co2"])
    }

    fn pipeline(
        fetcher: MockFetcher,
    ) -> DevicePipeline<SqliteStore, MockFetcher> {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        DevicePipeline::new(store, Arc::new(fetcher), 960, 1)
    }

    #[test]
    fn test_ingest_counts() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", BODY);
        let pipeline = pipeline(fetcher);

        let report = pipeline.ingest(&device()).unwrap();
        assert_eq!(report.rows_fetched, 4);
        assert_eq!(report.rows_inserted, 3);
        assert_eq!(report.rows_rejected, 1);
        assert_eq!(report.duplicates(), 0);
    }

    #[test]
    fn test_second_run_inserts_nothing() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", BODY);
        let pipeline = pipeline(fetcher);

        let first = pipeline.run(&device());
        let second = pipeline.run(&device());

        assert_eq!(first.counts.rows_fetched, second.counts.rows_fetched);
        assert_eq!(second.counts.rows_inserted, 0);
        assert_eq!(second.counts.duplicates(), 3);
        assert_eq!(pipeline.store().measurement_count("12345").unwrap(), 3);

        let logs = pipeline.store().recent_logs(10).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == "ok"));
    }

    #[test]
    fn test_fetch_failure_is_logged_and_device_not_registered() {
        let fetcher = MockFetcher::new();
        fetcher.fail("12345", "operation timed out");
        let pipeline = pipeline(fetcher);

        let report = pipeline.run(&device());
        assert!(!report.status.is_ok());
        assert!(report.logged);
        assert_eq!(report.counts, IngestReport::default());

        let logs = pipeline.store().recent_logs(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rows_fetched, 0);
        assert_eq!(logs[0].rows_inserted, 0);
        assert_eq!(
            logs[0].status,
            "error: transport error: operation timed out"
        );
        // never contacted successfully, so not in devices
        assert_eq!(logs[0].device, "12345");
        assert_eq!(pipeline.store().device_id_for_alias("office").unwrap(), None);
    }

    #[test]
    fn test_api_sentinel_body_is_an_error() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", "There is no data.");
        let pipeline = pipeline(fetcher);

        let report = pipeline.run(&device());
        assert_eq!(
            report.status,
            RunStatus::Failed("API reported: There is no data.".to_string())
        );
        assert_eq!(pipeline.store().measurement_count("12345").unwrap(), 0);
    }

    #[test]
    fn test_empty_body_is_ok_with_zero_rows() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", "\n\n");
        let pipeline = pipeline(fetcher);

        let report = pipeline.run(&device());
        assert!(report.status.is_ok());
        assert_eq!(report.counts.rows_fetched, 0);
        assert_eq!(
            pipeline.store().device_id_for_alias("office").unwrap(),
            Some("12345".to_string())
        );
    }

    #[test]
    fn test_null_values_are_stored() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", BODY);
        let pipeline = pipeline(fetcher);
        pipeline.run(&device());

        let latest = pipeline.store().latest_readings("12345", 1).unwrap();
        let temperature = latest[0]
            .fields
            .iter()
            .find(|f| f.name == "temperature")
            .unwrap();
        assert_eq!(temperature.value, None);
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Ok.to_string(), "ok");
        assert_eq!(
            RunStatus::Failed("boom".to_string()).to_string(),
            "error: boom"
        );
    }

    #[test]
    fn test_storage_failure_stops_device_and_audit_failure_is_swallowed() {
        let fetcher = MockFetcher::new();
        fetcher.respond(
            "1",
            "24;03;15;08;30;00;7;1;\n24;03;15;08;40;00;7;2;\n24;03;15;08;50;00;7;3;",
        );
        fetcher.respond("2", "24;03;15;08;30;00;7;9;");

        let store = Arc::new(FailingStore {
            inner: SqliteStore::new_in_memory().unwrap(),
            fail_at: NaiveDateTime::parse_from_str("2024-03-15T08:40:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
        });
        let runner = FleetRunner::new(DevicePipeline::new(
            Arc::clone(&store),
            Arc::new(fetcher),
            960,
            1,
        ));

        let devices = vec![
            DeviceConfig::new("1", "a", &["t"]),
            DeviceConfig::new("2", "b", &["t"]),
        ];
        let report = runner.run(&devices);

        let a = &report.devices[0];
        assert_eq!(
            a.counts,
            IngestReport {
                rows_fetched: 3,
                rows_inserted: 1,
                rows_rejected: 0,
            }
        );
        assert_eq!(a.status.to_string(), "error: storage error: disk full");
        assert!(!a.logged);
        // the line after the failing one was never written
        assert_eq!(store.measurement_count("1").unwrap(), 1);

        let b = &report.devices[1];
        assert!(b.status.is_ok());
        assert_eq!(b.counts.rows_inserted, 1);
        assert!(!b.logged);
        assert!(store.recent_logs(10).unwrap().is_empty());
    }

    #[test]
    fn test_storage_error_keeps_partial_counters() {
        let fetcher = MockFetcher::new();
        fetcher.respond("12345", BODY);
        let store = Arc::new(FailingStore {
            inner: SqliteStore::new_in_memory().unwrap(),
            fail_at: NaiveDateTime::parse_from_str("2024-03-15T08:50:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
        });
        let pipeline = DevicePipeline::new(store, Arc::new(fetcher), 960, 1);

        match pipeline.ingest(&device()) {
            Err(e @ IngestError::Storage { .. }) => {
                // two stored, the garbage line rejected before the failure
                assert_eq!(e.partial().rows_inserted, 2);
                assert_eq!(e.partial().rows_rejected, 1);
                assert_eq!(e.partial().rows_fetched, 4);
            }
            other => panic!("expected storage error, got {:?}", other),
        }
    }
}
