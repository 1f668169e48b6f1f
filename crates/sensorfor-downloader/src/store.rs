// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement store abstraction
//!
//! Defines the records the downloader persists and the trait storage
//! backends implement.

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Text format of measurement timestamps in storage (ISO-8601, no zone).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One named value of a measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementField {
    /// Field name (from the device schema or `field_<i>`)
    pub name: String,

    /// Numeric value, `None` when the source text was not a number
    pub value: Option<f64>,
}

/// A parsed sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Device-local civil time of the reading
    pub timestamp: NaiveDateTime,

    /// Source line, kept for audit
    pub raw_line: String,

    /// Values in wire order
    pub fields: Vec<MeasurementField>,
}

/// Result of inserting a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row created with this id.
    Inserted(i64),
    /// A row for the same device and timestamp already exists.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// A row of the download audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLogRecord {
    pub id: i64,
    /// Device alias when the device is known, else its id
    pub device: String,
    /// UTC time the entry was written (`YYYY-MM-DD HH:MM:SS`)
    pub downloaded_at: String,
    pub rows_fetched: u64,
    pub rows_inserted: u64,
    pub status: String,
}

/// A stored measurement with its fields, as read back for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    /// Fields ordered by name
    pub fields: Vec<MeasurementField>,
}

/// Measurement store trait
///
/// Every method is atomic and durable on return. Implementations must keep
/// `(device_id, timestamp)` unique across concurrent callers and report the
/// losers as [`InsertOutcome::Duplicate`], never as an error.
///
/// # Implementations
///
/// - `SqliteStore` -- file-based or in-memory SQLite
pub trait MeasurementStore {
    /// Register a device if it is not known yet. Never updates the alias.
    fn ensure_device(&self, device_id: &str, alias: &str) -> Result<()>;

    /// Insert a measurement row without its fields.
    fn insert_measurement(
        &self,
        device_id: &str,
        timestamp: NaiveDateTime,
        raw_line: &str,
    ) -> Result<InsertOutcome>;

    /// Insert the field rows of a freshly created measurement.
    fn insert_fields(&self, measurement_id: i64, fields: &[MeasurementField]) -> Result<()>;

    /// Insert a measurement together with its fields in one transaction.
    ///
    /// Either the measurement and all its fields are stored, or nothing is.
    fn store_measurement(&self, device_id: &str, measurement: &Measurement)
        -> Result<InsertOutcome>;

    /// Append one entry to the download audit log.
    fn append_log(
        &self,
        device_id: &str,
        rows_fetched: u64,
        rows_inserted: u64,
        status: &str,
    ) -> Result<()>;

    /// Most recent audit entries, newest first.
    fn recent_logs(&self, limit: usize) -> Result<Vec<DownloadLogRecord>>;

    /// Look up a device id by its alias.
    fn device_id_for_alias(&self, alias: &str) -> Result<Option<String>>;

    /// Latest `limit` measurements of a device, newest first.
    fn latest_readings(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>>;

    /// Number of measurements stored for a device.
    fn measurement_count(&self, device_id: &str) -> Result<usize>;
}
