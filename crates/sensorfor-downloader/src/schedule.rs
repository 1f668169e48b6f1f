// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Weekly download schedule
//!
//! A schedule is a weekday and a wall-clock time (local). The daemon sleeps
//! until the next slot, runs the fleet, and repeats until stopped.

use chrono::{Datelike, Days, Local, NaiveDateTime, NaiveTime, Weekday};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Schedule parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid weekday '{0}' (expected monday .. sunday)")]
    Weekday(String),

    #[error("invalid time '{0}' (expected HH:MM)")]
    Time(String),
}

/// Runs once a week at a fixed local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub time: NaiveTime,
}

impl WeeklySchedule {
    pub fn new(weekday: Weekday, time: NaiveTime) -> Self {
        Self { weekday, time }
    }

    /// Parse from a day name (`"monday"`, case-insensitive) and `"HH:MM"`.
    pub fn parse(day: &str, at: &str) -> Result<Self, ScheduleError> {
        let weekday = Weekday::from_str(day.trim())
            .map_err(|_| ScheduleError::Weekday(day.to_string()))?;
        let time = NaiveTime::parse_from_str(at.trim(), "%H:%M")
            .map_err(|_| ScheduleError::Time(at.to_string()))?;
        Ok(Self { weekday, time })
    }

    /// First slot strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        let ahead = (7 + self.weekday.num_days_from_monday() as u64
            - today.weekday().num_days_from_monday() as u64)
            % 7;

        let candidate = (today + Days::new(ahead)).and_time(self.time);
        if candidate > now {
            candidate
        } else {
            candidate + Days::new(7)
        }
    }
}

impl std::fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {} at {}", self.weekday, self.time.format("%H:%M"))
    }
}

/// Handle to stop a running scheduler.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the scheduler.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Blocking scheduler loop
pub struct Scheduler {
    schedule: WeeklySchedule,
    poll_interval: Duration,
    stop: StopHandle,
}

impl Scheduler {
    pub fn new(schedule: WeeklySchedule) -> Self {
        Self {
            schedule,
            poll_interval: Duration::from_secs(30),
            stop: StopHandle::new(),
        }
    }

    /// How often the loop wakes up to check the clock and the stop flag
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Call `job` at every slot until stopped. Returns the number of runs.
    pub fn run<J: FnMut()>(&self, mut job: J) -> u64 {
        let mut runs = 0;
        let mut next = self.schedule.next_after(Local::now().naive_local());
        tracing::info!(schedule = %self.schedule, next = %next, "Scheduler started");

        while !self.stop.is_stopped() {
            let now = Local::now().naive_local();
            if now >= next {
                job();
                runs += 1;
                next = self.schedule.next_after(Local::now().naive_local());
                tracing::info!(next = %next, "Next download scheduled");
                continue;
            }

            let remaining = (next - now).to_std().unwrap_or_default();
            std::thread::sleep(remaining.min(self.poll_interval));
        }

        tracing::info!("Scheduler stopped");
        runs
    }
}
