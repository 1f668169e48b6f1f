// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite measurement backend
//!
//! Durable storage for devices, measurements and the download audit log.

use crate::store::{
    DownloadLogRecord, InsertOutcome, Measurement, MeasurementField, MeasurementStore, Reading,
    TIMESTAMP_FORMAT,
};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a writer waits for a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    device_id  TEXT PRIMARY KEY,
    alias      TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS measurements (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id  TEXT    NOT NULL REFERENCES devices(device_id),
    timestamp  TEXT    NOT NULL,
    raw_line   TEXT    NOT NULL,
    UNIQUE (device_id, timestamp)
);

CREATE TABLE IF NOT EXISTS measurement_fields (
    measurement_id INTEGER NOT NULL REFERENCES measurements(id),
    field_name     TEXT    NOT NULL,
    field_value    REAL,
    PRIMARY KEY (measurement_id, field_name)
);

CREATE TABLE IF NOT EXISTS download_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id     TEXT    NOT NULL,
    downloaded_at TEXT    NOT NULL DEFAULT (datetime('now')),
    rows_fetched  INTEGER NOT NULL DEFAULT 0,
    rows_inserted INTEGER NOT NULL DEFAULT 0,
    status        TEXT    NOT NULL
);
";

/// SQLite measurement store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync). The mutex
/// serializes writers within the process; the `(device_id, timestamp)`
/// unique constraint plus `ON CONFLICT DO NOTHING` keeps concurrent
/// processes sharing the same file consistent.
///
/// # Schema
///
/// ```sql
/// devices(device_id PK, alias, created_at)
/// measurements(id PK, device_id FK, timestamp, raw_line, UNIQUE(device_id, timestamp))
/// measurement_fields(measurement_id FK, field_name, field_value, PK(measurement_id, field_name))
/// download_log(id PK, device_id, downloaded_at, rows_fetched, rows_inserted, status)
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-based database
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to enable WAL journal")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::debug!(path, "Database ready");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to create in-memory SQLite database")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        Ok(())
    }

    /// A panic while the lock was held leaves at most an uncommitted
    /// transaction, rolled back on drop, so a poisoned lock is taken over.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn insert_measurement_on(
    conn: &Connection,
    device_id: &str,
    timestamp: NaiveDateTime,
    raw_line: &str,
) -> Result<InsertOutcome> {
    let changed = conn.execute(
        "INSERT INTO measurements (device_id, timestamp, raw_line)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (device_id, timestamp) DO NOTHING",
        params![
            device_id,
            timestamp.format(TIMESTAMP_FORMAT).to_string(),
            raw_line
        ],
    )?;

    if changed == 0 {
        Ok(InsertOutcome::Duplicate)
    } else {
        Ok(InsertOutcome::Inserted(conn.last_insert_rowid()))
    }
}

fn insert_fields_on(
    conn: &Connection,
    measurement_id: i64,
    fields: &[MeasurementField],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO measurement_fields (measurement_id, field_name, field_value)
         VALUES (?1, ?2, ?3)",
    )?;
    for field in fields {
        stmt.execute(params![measurement_id, field.name, field.value])?;
    }
    Ok(())
}

fn parse_timestamp_column(idx: usize, text: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl MeasurementStore for SqliteStore {
    fn ensure_device(&self, device_id: &str, alias: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO devices (device_id, alias) VALUES (?1, ?2)",
            params![device_id, alias],
        )?;
        Ok(())
    }

    fn insert_measurement(
        &self,
        device_id: &str,
        timestamp: NaiveDateTime,
        raw_line: &str,
    ) -> Result<InsertOutcome> {
        let conn = self.lock();
        insert_measurement_on(&conn, device_id, timestamp, raw_line)
    }

    fn insert_fields(&self, measurement_id: i64, fields: &[MeasurementField]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        insert_fields_on(&tx, measurement_id, fields)?;
        tx.commit()?;
        Ok(())
    }

    fn store_measurement(
        &self,
        device_id: &str,
        measurement: &Measurement,
    ) -> Result<InsertOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let outcome = insert_measurement_on(
            &tx,
            device_id,
            measurement.timestamp,
            &measurement.raw_line,
        )?;
        if let InsertOutcome::Inserted(id) = outcome {
            insert_fields_on(&tx, id, &measurement.fields)?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn append_log(
        &self,
        device_id: &str,
        rows_fetched: u64,
        rows_inserted: u64,
        status: &str,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO download_log (device_id, rows_fetched, rows_inserted, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![device_id, rows_fetched as i64, rows_inserted as i64, status],
        )?;
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<DownloadLogRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT dl.id,
                    COALESCE(d.alias, dl.device_id),
                    dl.downloaded_at,
                    dl.rows_fetched,
                    dl.rows_inserted,
                    dl.status
             FROM download_log dl
             LEFT JOIN devices d ON d.device_id = dl.device_id
             ORDER BY dl.id DESC
             LIMIT ?1",
        )?;

        let records = stmt
            .query_map([limit as i64], |row| {
                Ok(DownloadLogRecord {
                    id: row.get(0)?,
                    device: row.get(1)?,
                    downloaded_at: row.get(2)?,
                    rows_fetched: row.get::<_, i64>(3)? as u64,
                    rows_inserted: row.get::<_, i64>(4)? as u64,
                    status: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn device_id_for_alias(&self, alias: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let device_id = conn
            .query_row(
                "SELECT device_id FROM devices WHERE alias = ?1",
                [alias],
                |row| row.get(0),
            )
            .optional()?;
        Ok(device_id)
    }

    fn latest_readings(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        let conn = self.lock();

        let latest = {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp FROM measurements
                 WHERE device_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![device_id, limit as i64], |row| {
                let id: i64 = row.get(0)?;
                let ts: String = row.get(1)?;
                Ok((id, parse_timestamp_column(1, &ts)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut fields_stmt = conn.prepare(
            "SELECT field_name, field_value FROM measurement_fields
             WHERE measurement_id = ?1
             ORDER BY field_name",
        )?;

        let mut readings = Vec::with_capacity(latest.len());
        for (id, timestamp) in latest {
            let fields = fields_stmt
                .query_map([id], |row| {
                    Ok(MeasurementField {
                        name: row.get(0)?,
                        value: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            readings.push(Reading { timestamp, fields });
        }

        Ok(readings)
    }

    fn measurement_count(&self, device_id: &str) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM measurements WHERE device_id = ?1",
            [device_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
