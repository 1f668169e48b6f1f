// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Text views over the stored data (status and per-device readings).

use crate::store::{DownloadLogRecord, Reading};
use std::fmt::Write;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Downloaded at")]
    downloaded_at: String,
    #[tabled(rename = "Fetched")]
    fetched: u64,
    #[tabled(rename = "New")]
    inserted: u64,
    #[tabled(rename = "Status")]
    status: String,
}

/// Render audit entries (given newest first) as a table, oldest first.
pub fn status_table(records: &[DownloadLogRecord]) -> String {
    let rows: Vec<StatusRow> = records
        .iter()
        .rev()
        .map(|r| StatusRow {
            id: r.id,
            device: r.device.clone(),
            downloaded_at: r.downloaded_at.clone(),
            fetched: r.rows_fetched,
            inserted: r.rows_inserted,
            status: r.status.clone(),
        })
        .collect();

    Table::new(rows).with(Style::sharp()).to_string()
}

/// Render readings grouped by timestamp, one field per line.
pub fn readings_report(readings: &[Reading]) -> String {
    let mut out = String::new();
    for reading in readings {
        let _ = writeln!(out, "  {}", reading.timestamp.format("%Y-%m-%dT%H:%M:%S"));
        for field in &reading.fields {
            let _ = writeln!(out, "    {:<24} {}", field.name, format_value(field.value));
        }
    }
    out
}

/// Format a field value with 4 significant digits, `(null)` when absent.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format_significant(v),
        None => "(null)".to_string(),
    }
}

/// `%.4g`-style formatting.
fn format_significant(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return v.to_string();
    }

    let sci = format!("{:.3e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };

    if !(-4..4).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (3 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, v))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MeasurementField;
    use chrono::NaiveDate;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(None), "(null)");
        assert_eq!(format_value(Some(21.5)), "21.5");
        assert_eq!(format_value(Some(410.0)), "410");
        assert_eq!(format_value(Some(0.5)), "0.5");
        assert_eq!(format_value(Some(-3.0)), "-3");
        assert_eq!(format_value(Some(0.0)), "0");
        assert_eq!(format_value(Some(55.25)), "55.25");
        assert_eq!(format_value(Some(123456.0)), "1.235e+05");
        assert_eq!(format_value(Some(0.00001234)), "1.234e-05");
        assert_eq!(format_value(Some(0.001)), "0.001");
    }

    #[test]
    fn test_status_table_is_oldest_first() {
        let records = vec![
            DownloadLogRecord {
                id: 2,
                device: "garage".to_string(),
                downloaded_at: "2024-03-18 02:00:05".to_string(),
                rows_fetched: 0,
                rows_inserted: 0,
                status: "error: HTTP status 500".to_string(),
            },
            DownloadLogRecord {
                id: 1,
                device: "office".to_string(),
                downloaded_at: "2024-03-18 02:00:01".to_string(),
                rows_fetched: 960,
                rows_inserted: 12,
                status: "ok".to_string(),
            },
        ];

        let table = status_table(&records);
        assert!(table.contains("Downloaded at"));
        let office = table.find("office").unwrap();
        let garage = table.find("garage").unwrap();
        assert!(office < garage);
        assert!(table.contains("error: HTTP status 500"));
    }

    #[test]
    fn test_readings_report() {
        let readings = vec![Reading {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            fields: vec![
                MeasurementField {
                    name: "co2".to_string(),
                    value: Some(410.0),
                },
                MeasurementField {
                    name: "humidity".to_string(),
                    value: None,
                },
            ],
        }];

        let text = readings_report(&readings);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  2024-03-15T08:30:00");
        assert!(lines[1].starts_with("    co2"));
        assert!(lines[1].ends_with("410"));
        assert!(lines[2].ends_with("(null)"));
    }
}
