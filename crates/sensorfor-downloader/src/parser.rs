// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record line parser
//!
//! Turns one line of the SensorFor M2M text protocol into a [`Measurement`].
//!
//! # Wire format
//!
//! ```text
//! YY;MM;DD;HH;MM;SS;MODULE_ID;V1;V2;...;Vn[;]
//! ```
//!
//! The six timestamp components are followed by a module identifier (ignored)
//! and at least one value. A trailing delimiter is tolerated.

use crate::store::{Measurement, MeasurementField};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Error strings the API returns in place of data.
pub const API_ERRORS: [&str; 6] = [
    "Device does not exist.",
    "API is not enabled.",
    "Wrong number of lines.",
    "Wrong data zoom.",
    "File does not exist.",
    "There is no data.",
];

/// Minimum parts per record: 6 timestamp + module id + 1 value.
const MIN_PARTS: usize = 8;

/// Index of the first value part.
const FIRST_VALUE: usize = 7;

/// Returns true if `text` is exactly one of the API error strings.
pub fn is_api_error(text: &str) -> bool {
    API_ERRORS.contains(&text)
}

/// Why a line was not turned into a measurement.
///
/// None of these are failures of the download; they only show up in
/// diagnostics and as the gap between fetched and inserted rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty line")]
    Empty,

    #[error("API error string: {0}")]
    ApiSentinel(String),

    #[error("expected at least 8 fields, got {0}")]
    TooFewParts(usize),

    #[error("invalid timestamp")]
    InvalidTimestamp,
}

/// Parse one record line against a device's field-name schema.
///
/// Values beyond the schema are named `field_<i>`. A value that is not a
/// number is kept with a `None` value.
pub fn parse_line(line: &str, field_names: &[String]) -> Result<Measurement, Rejection> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Rejection::Empty);
    }
    if is_api_error(line) {
        return Err(Rejection::ApiSentinel(line.to_string()));
    }

    let parts: Vec<&str> = line.split(';').map(str::trim).collect();
    if parts.len() < MIN_PARTS {
        return Err(Rejection::TooFewParts(parts.len()));
    }

    let timestamp = parse_timestamp(&parts[..6]).ok_or(Rejection::InvalidTimestamp)?;

    // parts[6] is the module id
    let mut values = &parts[FIRST_VALUE..];
    if let Some((last, rest)) = values.split_last() {
        if last.is_empty() {
            values = rest;
        }
    }

    let mut fields: Vec<MeasurementField> = Vec::with_capacity(values.len());
    for (i, raw) in values.iter().enumerate() {
        let name = field_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("field_{}", i));

        if fields.iter().any(|f| f.name == name) {
            tracing::debug!(field = %name, "Dropping repeated field name in line");
            continue;
        }

        fields.push(MeasurementField {
            name,
            value: raw.parse::<f64>().ok(),
        });
    }

    Ok(Measurement {
        timestamp,
        raw_line: line.to_string(),
        fields,
    })
}

/// Build a timestamp from `YY;MM;DD;HH;MM;SS`.
fn parse_timestamp(parts: &[&str]) -> Option<NaiveDateTime> {
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;
    let hour: u32 = parts[3].parse().ok()?;
    let minute: u32 = parts[4].parse().ok()?;
    let second: u32 = parts[5].parse().ok()?;

    NaiveDate::from_ymd_opt(year.checked_add(2000)?, month, day)?.and_hms_opt(hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<String> {
        vec![
            "temperature".to_string(),
            "humidity".to_string(),
            "co2".to_string(),
        ]
    }

    #[test]
    fn test_parse_full_line_with_trailing_delimiter() {
        let m = parse_line("24;03;15;08;30;00;7;21.5;55.2;410;", &schema()).unwrap();

        assert_eq!(
            m.timestamp,
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap()
        );
        assert_eq!(m.raw_line, "24;03;15;08;30;00;7;21.5;55.2;410;");
        assert_eq!(
            m.fields,
            vec![
                MeasurementField {
                    name: "temperature".to_string(),
                    value: Some(21.5)
                },
                MeasurementField {
                    name: "humidity".to_string(),
                    value: Some(55.2)
                },
                MeasurementField {
                    name: "co2".to_string(),
                    value: Some(410.0)
                },
            ]
        );
    }

    #[test]
    fn test_parse_without_trailing_delimiter() {
        let m = parse_line("24;03;15;08;30;00;7;21.5;55.2", &schema()).unwrap();
        assert_eq!(m.fields.len(), 2);
        assert_eq!(m.fields[1].name, "humidity");
    }

    #[test]
    fn test_overflow_fields_get_synthesized_names() {
        let m = parse_line("24;03;15;08;30;00;7;1;2;3;4;5", &schema()).unwrap();
        let names: Vec<&str> = m.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["temperature", "humidity", "co2", "field_3", "field_4"]
        );
    }

    #[test]
    fn test_empty_schema_names_everything() {
        let m = parse_line("24;03;15;08;30;00;7;1;2", &[]).unwrap();
        assert_eq!(m.fields[0].name, "field_0");
        assert_eq!(m.fields[1].name, "field_1");
    }

    #[test]
    fn test_non_numeric_value_is_null_not_dropped() {
        let m = parse_line("24;03;15;08;30;00;7;21.5;ERR;410", &schema()).unwrap();
        assert_eq!(m.fields.len(), 3);
        assert_eq!(m.fields[1].name, "humidity");
        assert_eq!(m.fields[1].value, None);
        assert_eq!(m.fields[2].value, Some(410.0));
    }

    #[test]
    fn test_empty_middle_value_is_null() {
        let m = parse_line("24;03;15;08;30;00;7;;55.2", &schema()).unwrap();
        assert_eq!(m.fields.len(), 2);
        assert_eq!(m.fields[0].value, None);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let m = parse_line("  24 ; 03;15;08;30;00 ;7; 21.5 ;55.2\r\n", &schema()).unwrap();
        assert_eq!(m.raw_line, "24 ; 03;15;08;30;00 ;7; 21.5 ;55.2");
        assert_eq!(m.fields[0].value, Some(21.5));
    }

    #[test]
    fn test_rejects_empty_and_sentinels() {
        assert_eq!(parse_line("", &schema()), Err(Rejection::Empty));
        assert_eq!(parse_line("   \t", &schema()), Err(Rejection::Empty));

        for sentinel in API_ERRORS {
            assert_eq!(
                parse_line(sentinel, &schema()),
                Err(Rejection::ApiSentinel(sentinel.to_string()))
            );
        }
    }

    #[test]
    fn test_rejects_short_lines() {
        assert_eq!(
            parse_line("24;03;15;08;30;00;7", &schema()),
            Err(Rejection::TooFewParts(7))
        );
        assert_eq!(
            parse_line("hello world", &schema()),
            Err(Rejection::TooFewParts(1))
        );
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        for line in [
            "24;13;15;08;30;00;7;1",
            "24;02;30;08;30;00;7;1",
            "24;03;15;24;30;00;7;1",
            "24;03;15;08;60;00;7;1",
            "xx;03;15;08;30;00;7;1",
            "24;03;15;08;30;1.5;7;1",
        ] {
            assert_eq!(
                parse_line(line, &schema()),
                Err(Rejection::InvalidTimestamp),
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_trailing_delimiter_only_value_yields_no_fields() {
        let m = parse_line("24;03;15;08;30;00;7;", &schema()).unwrap();
        assert!(m.fields.is_empty());
    }

    #[test]
    fn test_repeated_field_name_keeps_first() {
        let names = vec!["a".to_string(), "field_2".to_string()];
        let m = parse_line("24;03;15;08;30;00;7;1;2;3", &names).unwrap();
        let names: Vec<&str> = m.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "field_2"]);
        assert_eq!(m.fields[1].value, Some(2.0));
    }
}
