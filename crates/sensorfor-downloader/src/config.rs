// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downloader configuration

use crate::fetch::{DEFAULT_API_URL, MAX_LINES, MAX_ZOOM};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Downloader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// SQLite database path
    pub db_path: String,

    /// Device file (JSON). `None` uses the built-in device list.
    pub devices_file: Option<PathBuf>,

    /// Remote API endpoint
    pub api_url: String,

    /// Records requested per download (API max: 960)
    pub lines: u32,

    /// Time resolution: 1 = highest, 20 = lowest
    pub zoom: u32,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            db_path: "sensorfor.db".to_string(),
            devices_file: Some(PathBuf::from("devices.json")),
            api_url: DEFAULT_API_URL.to_string(),
            lines: MAX_LINES,
            zoom: 1,
            timeout_secs: 30,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl DownloaderConfig {
    /// Create a new config builder
    pub fn builder() -> DownloaderConfigBuilder {
        DownloaderConfigBuilder::default()
    }

    /// Request timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lines == 0 || self.lines > MAX_LINES {
            return Err(ConfigError::InvalidValue(format!(
                "lines must be between 1 and {}",
                MAX_LINES
            )));
        }
        if self.zoom == 0 || self.zoom > MAX_ZOOM {
            return Err(ConfigError::InvalidValue(format!(
                "zoom must be between 1 and {}",
                MAX_ZOOM
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_secs cannot be 0".into(),
            ));
        }
        if self.api_url.is_empty() {
            return Err(ConfigError::InvalidValue("api_url cannot be empty".into()));
        }
        if self.db_path.is_empty() {
            return Err(ConfigError::InvalidValue("db_path cannot be empty".into()));
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct DownloaderConfigBuilder {
    db_path: Option<String>,
    devices_file: Option<Option<PathBuf>>,
    api_url: Option<String>,
    lines: Option<u32>,
    zoom: Option<u32>,
    timeout_secs: Option<u64>,
}

impl DownloaderConfigBuilder {
    /// Set database path
    pub fn db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Load devices from this JSON file
    pub fn devices_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.devices_file = Some(Some(path.into()));
        self
    }

    /// Use the built-in device list instead of a file
    pub fn builtin_devices(mut self) -> Self {
        self.devices_file = Some(None);
        self
    }

    /// Set API endpoint
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set records per download
    pub fn lines(mut self, lines: u32) -> Self {
        self.lines = Some(lines);
        self
    }

    /// Set time resolution
    pub fn zoom(mut self, zoom: u32) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the configuration
    pub fn build(self) -> DownloaderConfig {
        let defaults = DownloaderConfig::default();

        DownloaderConfig {
            db_path: self.db_path.unwrap_or(defaults.db_path),
            devices_file: self.devices_file.unwrap_or(defaults.devices_file),
            api_url: self.api_url.unwrap_or(defaults.api_url),
            lines: self.lines.unwrap_or(defaults.lines),
            zoom: self.zoom.unwrap_or(defaults.zoom),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DownloaderConfig::builder()
            .db_path("test.db")
            .devices_file("fleet.json")
            .lines(100)
            .zoom(5)
            .timeout_secs(10)
            .build();

        assert_eq!(config.db_path, "test.db");
        assert_eq!(config.devices_file, Some(PathBuf::from("fleet.json")));
        assert_eq!(config.lines, 100);
        assert_eq!(config.zoom, 5);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = DownloaderConfig::default();

        assert_eq!(config.db_path, "sensorfor.db");
        assert_eq!(config.devices_file, Some(PathBuf::from("devices.json")));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.lines, 960);
        assert_eq!(config.zoom, 1);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builtin_devices_clears_file() {
        let config = DownloaderConfig::builder().builtin_devices().build();
        assert_eq!(config.devices_file, None);
    }

    #[test]
    fn test_validation() {
        let too_many = DownloaderConfig::builder().lines(961).build();
        assert!(too_many.validate().is_err());

        let bad_zoom = DownloaderConfig::builder().zoom(0).build();
        assert!(bad_zoom.validate().is_err());

        let no_timeout = DownloaderConfig::builder().timeout_secs(0).build();
        assert!(no_timeout.validate().is_err());
    }
}
