// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device list loading
//!
//! Devices come from a JSON file:
//!
//! ```json
//! [
//!   {
//!     "device_id": "12345",
//!     "alias": "office_sensor",
//!     "field_names": ["temperature", "humidity", "co2"]
//!   }
//! ]
//! ```
//!
//! or, when no file is configured, from [`builtin_devices`]. The list is
//! validated once at startup; any problem is fatal.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A pre-registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Identifier printed on the device label
    pub device_id: String,

    /// Human-readable name, used by `query`
    pub alias: String,

    /// Names of the measurement values, in wire order
    #[serde(default)]
    pub field_names: Vec<String>,
}

impl DeviceConfig {
    pub fn new(
        device_id: impl Into<String>,
        alias: impl Into<String>,
        field_names: &[&str],
    ) -> Self {
        Self {
            device_id: device_id.into(),
            alias: alias.into(),
            field_names: field_names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Device list errors
#[derive(Debug, Error)]
pub enum DeviceConfigError {
    #[error("device file not found: '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read device file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid device file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid device #{index}: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Fallback device list used when no device file is configured.
pub fn builtin_devices() -> Vec<DeviceConfig> {
    vec![DeviceConfig::new(
        "12345",
        "office_sensor",
        &["temperature", "humidity", "co2"],
    )]
}

/// Load devices from `path`, or the built-in list when `path` is `None`.
pub fn load_devices(path: Option<&Path>) -> Result<Vec<DeviceConfig>, DeviceConfigError> {
    let devices = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DeviceConfigError::NotFound(path.to_path_buf())
                } else {
                    DeviceConfigError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    }
                }
            })?;
            parse_devices(&content)?
        }
        None => builtin_devices(),
    };

    validate_devices(&devices)?;
    Ok(devices)
}

/// Parse a JSON device list. The top-level value must be an array.
pub fn parse_devices(json: &str) -> Result<Vec<DeviceConfig>, DeviceConfigError> {
    let devices: Vec<DeviceConfig> = serde_json::from_str(json)?;
    Ok(devices)
}

/// Check ids and aliases are present and unique.
pub fn validate_devices(devices: &[DeviceConfig]) -> Result<(), DeviceConfigError> {
    let mut ids = HashSet::new();
    let mut aliases = HashSet::new();

    for (index, device) in devices.iter().enumerate() {
        let invalid = |reason: String| DeviceConfigError::Invalid { index, reason };

        if device.device_id.trim().is_empty() {
            return Err(invalid("device_id is empty".into()));
        }
        if device.alias.trim().is_empty() {
            return Err(invalid("alias is empty".into()));
        }
        if !ids.insert(device.device_id.as_str()) {
            return Err(invalid(format!(
                "duplicate device_id '{}'",
                device.device_id
            )));
        }
        if !aliases.insert(device.alias.as_str()) {
            return Err(invalid(format!("duplicate alias '{}'", device.alias)));
        }
    }

    Ok(())
}
