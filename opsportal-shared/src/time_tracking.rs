//! Start/pause/complete timer for work items
//!
//! `startedAt` holds the start of the running interval and `accumulatedTime`
//! the seconds banked by earlier intervals.
//!
//! ```text
//! idle ──start──▶ running ──pause──▶ idle
//!   │                │
//!   └───complete─────┴──complete──▶ completed (actualHours set)
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::store::Fields;

/// Timer action requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackAction {
    Start,
    Pause,
    Complete,
}

impl TrackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackAction::Start => "start",
            TrackAction::Pause => "pause",
            TrackAction::Complete => "complete",
        }
    }
}

impl fmt::Display for TrackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid action '{0}': expected start, pause or complete")]
pub struct InvalidAction(pub String);

impl FromStr for TrackAction {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(TrackAction::Start),
            "pause" => Ok(TrackAction::Pause),
            "complete" => Ok(TrackAction::Complete),
            other => Err(InvalidAction(other.to_string())),
        }
    }
}

/// Timer fields of a work item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerState {
    pub started_at: Option<DateTime<Utc>>,
    pub accumulated_time: u64,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Work items that carry a timer
pub trait Timed {
    fn timer(&self) -> TimerState;
}

/// Action that leaves the timer untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerNoop {
    #[error("Timer is already running")]
    AlreadyRunning,

    #[error("No timer is running")]
    NotRunning,
}

/// New timer fields after an action
#[derive(Debug, Clone, PartialEq)]
pub struct TimerUpdate {
    pub action: TrackAction,
    pub started_at: Option<DateTime<Utc>>,
    pub accumulated_time: u64,
    /// Set by `complete` only
    pub actual_hours: Option<f64>,
}

impl TimerUpdate {
    /// Document patch for this update
    ///
    /// `running_status` is written on start and `completed_status` on
    /// complete; pause leaves the status alone. A cleared `startedAt` is
    /// written as `null` so the store removes it.
    pub fn to_patch(&self, running_status: &str, completed_status: &str) -> Fields {
        let mut patch = Fields::new();
        let started_at = self
            .started_at
            .map(|at| Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .unwrap_or(Value::Null);
        patch.insert("startedAt".to_string(), started_at);

        match self.action {
            TrackAction::Start => {
                patch.insert("status".to_string(), Value::from(running_status));
            }
            TrackAction::Pause => {
                patch.insert("accumulatedTime".to_string(), Value::from(self.accumulated_time));
            }
            TrackAction::Complete => {
                patch.insert("accumulatedTime".to_string(), Value::from(self.accumulated_time));
                patch.insert("status".to_string(), Value::from(completed_status));
                if let Some(hours) = self.actual_hours {
                    patch.insert("actualHours".to_string(), Value::from(hours));
                }
            }
        }
        patch
    }

    /// Human-readable outcome for API responses
    pub fn message(&self) -> &'static str {
        match self.action {
            TrackAction::Start => "Timer started",
            TrackAction::Pause => "Timer paused",
            TrackAction::Complete => "Task completed",
        }
    }
}

/// Applies `action` to `state` at `now`
pub fn apply(
    action: TrackAction,
    state: &TimerState,
    now: DateTime<Utc>,
) -> Result<TimerUpdate, TimerNoop> {
    match action {
        TrackAction::Start => {
            if state.is_running() {
                return Err(TimerNoop::AlreadyRunning);
            }
            Ok(TimerUpdate {
                action,
                started_at: Some(now),
                accumulated_time: state.accumulated_time,
                actual_hours: None,
            })
        }
        TrackAction::Pause => {
            let started_at = state.started_at.ok_or(TimerNoop::NotRunning)?;
            Ok(TimerUpdate {
                action,
                started_at: None,
                accumulated_time: state.accumulated_time + elapsed_secs(started_at, now),
                actual_hours: None,
            })
        }
        TrackAction::Complete => {
            let total = match state.started_at {
                Some(started_at) => state.accumulated_time + elapsed_secs(started_at, now),
                None => state.accumulated_time,
            };
            Ok(TimerUpdate {
                action,
                started_at: None,
                accumulated_time: total,
                actual_hours: Some(hours_one_decimal(total)),
            })
        }
    }
}

/// Whole seconds from `from` to `to`; a clock running backwards counts as zero
fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}

/// Seconds to hours, rounded to one decimal
pub fn hours_one_decimal(seconds: u64) -> f64 {
    (seconds as f64 / 3600.0 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn running(accumulated: u64) -> TimerState {
        TimerState {
            started_at: Some(t0()),
            accumulated_time: accumulated,
        }
    }

    #[test]
    fn test_start_from_idle() {
        let update = apply(TrackAction::Start, &TimerState::default(), t0()).unwrap();
        assert_eq!(update.started_at, Some(t0()));
        assert_eq!(update.accumulated_time, 0);

        let patch = update.to_patch("in-progress", "completed");
        assert_eq!(patch["status"], "in-progress");
        assert_eq!(patch["startedAt"], "2024-05-01T09:00:00.000Z");
        assert!(!patch.contains_key("accumulatedTime"));
    }

    #[test]
    fn test_start_while_running_is_noop() {
        assert_eq!(
            apply(TrackAction::Start, &running(10), t0() + Duration::hours(1)),
            Err(TimerNoop::AlreadyRunning)
        );
    }

    #[test]
    fn test_pause_banks_elapsed_seconds() {
        let now = t0() + Duration::milliseconds(61_900);
        let update = apply(TrackAction::Pause, &running(100), now).unwrap();

        assert_eq!(update.accumulated_time, 161);
        assert_eq!(update.started_at, None);

        let patch = update.to_patch("in-progress", "completed");
        assert!(patch["startedAt"].is_null());
        assert_eq!(patch["accumulatedTime"], 161);
        assert!(!patch.contains_key("status"));
    }

    #[test]
    fn test_pause_when_idle_is_noop() {
        assert_eq!(
            apply(TrackAction::Pause, &TimerState::default(), t0()),
            Err(TimerNoop::NotRunning)
        );
    }

    #[test]
    fn test_complete_while_running() {
        let now = t0() + Duration::minutes(45);
        let update = apply(TrackAction::Complete, &running(1800), now).unwrap();

        assert_eq!(update.accumulated_time, 4500);
        assert_eq!(update.actual_hours, Some(1.3));

        let patch = update.to_patch("in-progress", "done");
        assert_eq!(patch["status"], "done");
        assert_eq!(patch["actualHours"], 1.3);
        assert!(patch["startedAt"].is_null());
    }

    #[test]
    fn test_complete_when_idle_uses_banked_time() {
        let state = TimerState {
            started_at: None,
            accumulated_time: 7200,
        };
        let update = apply(TrackAction::Complete, &state, t0()).unwrap();
        assert_eq!(update.accumulated_time, 7200);
        assert_eq!(update.actual_hours, Some(2.0));
    }

    #[test]
    fn test_clock_skew_does_not_go_negative() {
        let update = apply(TrackAction::Pause, &running(5), t0() - Duration::minutes(1)).unwrap();
        assert_eq!(update.accumulated_time, 5);
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!("start".parse::<TrackAction>(), Ok(TrackAction::Start));
        assert_eq!("complete".parse::<TrackAction>(), Ok(TrackAction::Complete));
        assert!("stop".parse::<TrackAction>().is_err());
        assert!("Start".parse::<TrackAction>().is_err());
    }

    #[test]
    fn test_hours_rounding() {
        assert_eq!(hours_one_decimal(0), 0.0);
        assert_eq!(hours_one_decimal(180), 0.1);
        assert_eq!(hours_one_decimal(5400), 1.5);
    }
}
