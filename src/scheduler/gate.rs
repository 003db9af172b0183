//! Timing gate for scheduled and startup runs
//!
//! The window is a half-open hour range `[start_hour, end_hour)` read in a
//! fixed UTC offset. `start_hour > end_hour` wraps past midnight and
//! `start_hour == end_hour` leaves the window open all day.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;

use super::error::{SchedulerError, SchedulerResult};
use crate::config::WindowConfig;

/// Largest offset any real time zone uses
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Why the gate opened or stayed shut
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Open,
    OutsideWindow {
        hour: u32,
        start_hour: u32,
        end_hour: u32,
    },
    TooSoon {
        last_success: DateTime<Utc>,
        next_allowed: DateTime<Utc>,
    },
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Short reason for skipped-run reports
    pub fn reason(&self) -> String {
        match self {
            Self::Open => String::from("open"),
            Self::OutsideWindow {
                hour,
                start_hour,
                end_hour,
            } => format!("outside window: hour {hour} not in [{start_hour}, {end_hour})"),
            Self::TooSoon { next_allowed, .. } => {
                format!("too soon after last successful run; next at {next_allowed}")
            }
        }
    }
}

/// Pure function of the clock and the configured window
#[derive(Debug, Clone)]
pub struct TimingGate {
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
    min_interval: Duration,
}

impl TimingGate {
    pub fn new(
        start_hour: u32,
        end_hour: u32,
        utc_offset_minutes: i32,
        min_interval_minutes: u64,
    ) -> SchedulerResult<Self> {
        if start_hour > 23 {
            return Err(SchedulerError::InvalidHour {
                field: String::from("start_hour"),
                hour: start_hour,
            });
        }
        if end_hour > 23 {
            return Err(SchedulerError::InvalidHour {
                field: String::from("end_hour"),
                hour: end_hour,
            });
        }
        if utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(SchedulerError::InvalidOffset {
                minutes: utc_offset_minutes,
            });
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or(
            SchedulerError::InvalidOffset {
                minutes: utc_offset_minutes,
            },
        )?;
        let min_interval = i64::try_from(min_interval_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                SchedulerError::trigger_config("min_interval_minutes", "value too large")
            })?;

        Ok(Self {
            start_hour,
            end_hour,
            offset,
            min_interval,
        })
    }

    pub fn from_config(config: &WindowConfig) -> SchedulerResult<Self> {
        Self::new(
            config.start_hour,
            config.end_hour,
            config.utc_offset_minutes,
            config.min_interval_minutes,
        )
    }

    /// Hour of `now` in the configured offset
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.offset).hour()
    }

    /// Calendar day `now` belongs to in the configured offset
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Whether `now` falls inside the hour window
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let hour = self.local_hour(now);
        match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            std::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
        }
    }

    /// Minimum-interval check only; used for startup catch-up runs
    pub fn check_interval(
        &self,
        now: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
    ) -> GateDecision {
        match last_success {
            Some(last) if now < last + self.min_interval => GateDecision::TooSoon {
                last_success: last,
                next_allowed: last + self.min_interval,
            },
            _ => GateDecision::Open,
        }
    }

    /// Full check for scheduled runs: hour window, then minimum interval
    pub fn check(&self, now: DateTime<Utc>, last_success: Option<DateTime<Utc>>) -> GateDecision {
        if !self.is_within_window(now) {
            return GateDecision::OutsideWindow {
                hour: self.local_hour(now),
                start_hour: self.start_hour,
                end_hour: self.end_hour,
            };
        }
        self.check_interval(now, last_success)
    }
}
