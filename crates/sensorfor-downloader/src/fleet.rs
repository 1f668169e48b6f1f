// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fleet runner
//!
//! Runs the device pipeline over every configured device, one at a time.
//! A device that fails, or whose pipeline panics, does not stop the others.

use crate::devices::DeviceConfig;
use crate::fetch::Fetcher;
use crate::pipeline::{DevicePipeline, DeviceReport};
use crate::store::MeasurementStore;
use chrono::Local;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of one pass over the fleet
#[derive(Debug, Default, Clone)]
pub struct FleetReport {
    pub devices: Vec<DeviceReport>,
}

impl FleetReport {
    /// Devices whose run ended in an error.
    pub fn failed(&self) -> usize {
        self.devices.iter().filter(|d| !d.status.is_ok()).count()
    }

    pub fn rows_fetched(&self) -> u64 {
        self.devices.iter().map(|d| d.counts.rows_fetched).sum()
    }

    pub fn rows_inserted(&self) -> u64 {
        self.devices.iter().map(|d| d.counts.rows_inserted).sum()
    }
}

/// Sequential runner over a device list
pub struct FleetRunner<S: MeasurementStore, F: Fetcher> {
    pipeline: DevicePipeline<S, F>,
}

impl<S: MeasurementStore, F: Fetcher> FleetRunner<S, F> {
    pub fn new(pipeline: DevicePipeline<S, F>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &DevicePipeline<S, F> {
        &self.pipeline
    }

    /// Download every device in order.
    pub fn run(&self, devices: &[DeviceConfig]) -> FleetReport {
        tracing::info!(
            "=== Download run started at {} ===",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        );

        let mut report = FleetReport::default();
        for device in devices {
            report.devices.push(self.run_isolated(device));
        }

        tracing::info!(
            devices = report.devices.len(),
            failed = report.failed(),
            fetched = report.rows_fetched(),
            inserted = report.rows_inserted(),
            "=== Download run finished ==="
        );
        report
    }

    fn run_isolated(&self, device: &DeviceConfig) -> DeviceReport {
        match catch_unwind(AssertUnwindSafe(|| self.pipeline.run(device))) {
            Ok(report) => report,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    device = %device.alias,
                    error = %message,
                    "Unexpected error for device"
                );

                let mut report = DeviceReport::failed(device, format!("unexpected: {}", message));
                report.logged = catch_unwind(AssertUnwindSafe(|| self.pipeline.record(&report)))
                    .unwrap_or(false);
                report
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
