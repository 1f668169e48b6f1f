// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote API client
//!
//! Retrieves the raw record text of one device from the SensorFor M2M API.
//!
//! ```text
//! GET <api_url>?id=00<device_id>&ln=<lines>&zm=<zoom>
//! ```
//!
//! The API answers with newline-separated records, or with one of the
//! [`API_ERRORS`] strings as the whole body. There is no retry here; the
//! scheduler decides when to try again.

use crate::parser::{is_api_error, API_ERRORS};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Default SensorFor M2M data endpoint.
pub const DEFAULT_API_URL: &str = "https://www.sensorfor.com/cloud/m2m_data_get.php";

/// Maximum number of records the API returns per request.
pub const MAX_LINES: u32 = 960;

/// Coarsest supported time resolution (1 = finest).
pub const MAX_ZOOM: u32 = 20;

/// Prefix the API expects in front of every device id.
const DEVICE_ID_PREFIX: &str = "00";

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("API reported: {0}")]
    Api(String),
}

impl FetchError {
    /// True for failures reported by the API itself rather than the network.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Api(_))
    }
}

/// Source of raw device records
pub trait Fetcher {
    /// Fetch up to `lines` records at resolution `zoom` for one device.
    fn fetch(&self, device_id: &str, lines: u32, zoom: u32) -> Result<String, FetchError>;
}

/// Device id as transmitted on the wire.
pub fn wire_device_id(device_id: &str) -> String {
    format!("{}{}", DEVICE_ID_PREFIX, device_id)
}

/// Check request parameters against the API limits.
pub fn validate_request(lines: u32, zoom: u32) -> Result<(), FetchError> {
    if lines == 0 || lines > MAX_LINES {
        return Err(FetchError::InvalidRequest(format!(
            "lines must be between 1 and {}, got {}",
            MAX_LINES, lines
        )));
    }
    if zoom == 0 || zoom > MAX_ZOOM {
        return Err(FetchError::InvalidRequest(format!(
            "zoom must be between 1 and {}, got {}",
            MAX_ZOOM, zoom
        )));
    }
    Ok(())
}

/// Trim a response body and turn a whole-body API error into [`FetchError::Api`].
pub fn check_body(body: &str) -> Result<String, FetchError> {
    let body = body.trim();
    if is_api_error(body) {
        return Err(FetchError::Api(body.to_string()));
    }
    Ok(body.to_string())
}

/// HTTP fetcher backed by a blocking reqwest client
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    api_url: String,
}

impl HttpFetcher {
    /// Create a fetcher for `api_url` with a bounded request timeout
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sensorfor-downloader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, device_id: &str, lines: u32, zoom: u32) -> Result<String, FetchError> {
        validate_request(lines, zoom)?;

        let id = wire_device_id(device_id);
        let ln = lines.to_string();
        let zm = zoom.to_string();

        tracing::debug!(url = %self.api_url, id = %id, lines, zoom, "Requesting device data");

        let resp = self
            .client
            .get(&self.api_url)
            .query(&[("id", id.as_str()), ("ln", ln.as_str()), ("zm", zm.as_str())])
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        check_body(&body)
    }
}

/// Mock fetcher (for testing without network access)
///
/// Serves canned bodies per device id and records every request. Devices
/// without a canned response get an `API_ERRORS` "does not exist" reply.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<(String, u32, u32)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `device_id` (sentinel bodies are still detected)
    pub fn respond(&self, device_id: &str, body: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(device_id.to_string(), Ok(body.into()));
        }
    }

    /// Fail `device_id` with a transport error
    pub fn fail(&self, device_id: &str, message: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(device_id.to_string(), Err(message.into()));
        }
    }

    /// Requests seen so far as `(device_id, lines, zoom)`
    pub fn calls(&self) -> Vec<(String, u32, u32)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, device_id: &str, lines: u32, zoom: u32) -> Result<String, FetchError> {
        validate_request(lines, zoom)?;

        if let Ok(mut calls) = self.calls.lock() {
            calls.push((device_id.to_string(), lines, zoom));
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(device_id).cloned());

        match response {
            Some(Ok(body)) => check_body(&body),
            Some(Err(message)) => Err(FetchError::Transport(message)),
            None => Err(FetchError::Api(API_ERRORS[0].to_string())),
        }
    }
}
