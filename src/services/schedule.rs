//! Decides which automated emails are due for an event at a given instant.
//!
//! Day offsets are whole days rounded up, so an event 6 days and 1 hour away
//! is "7 days until" and an event that ended 2 hours ago is "1 day since".

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Reminders are only considered for events at most this many days ahead.
pub const LOOKAHEAD_DAYS: i64 = 7;

/// Thank-you emails are only considered for events at most this many days back.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Day after the event on which the thank-you email goes out.
pub const THANK_YOU_DAY: i64 = 1;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// How strictly a send must line up with its day offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuePolicy {
    /// Fire only on the exact day offset. A run that misses the day never
    /// sends that email.
    Exact,
    /// Fire on or after the offset day while the email is still relevant;
    /// the email log alone prevents repeats.
    CatchUp,
}

impl FromStr for DuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(DuePolicy::Exact),
            "catch-up" | "catchup" | "catch_up" => Ok(DuePolicy::CatchUp),
            other => Err(format!("unknown due policy: {}", other)),
        }
    }
}

/// An automated email that should be attempted in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueEmail {
    Reminder { days_before: i64 },
    ThankYou,
}

/// Day offsets of an event relative to a run instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOffsets {
    pub days_until: i64,
    pub days_since: i64,
}

impl DayOffsets {
    pub fn between(now: DateTime<Utc>, event_date: DateTime<Utc>) -> Self {
        Self {
            days_until: ceil_days(event_date - now),
            days_since: ceil_days(now - event_date),
        }
    }

    pub fn is_upcoming(&self) -> bool {
        self.days_until > 0 && self.days_until <= LOOKAHEAD_DAYS
    }

    pub fn is_recent(&self) -> bool {
        self.days_since >= 0 && self.days_since <= RECENT_WINDOW_DAYS
    }
}

/// `ceil(delta / 1 day)` over signed durations.
fn ceil_days(delta: Duration) -> i64 {
    let millis = delta.num_milliseconds();
    -((-millis).div_euclid(MILLIS_PER_DAY))
}

/// Emails due for an event. `offsets` are the configured reminder offsets,
/// furthest first.
pub fn due_emails(
    now: DateTime<Utc>,
    event_date: DateTime<Utc>,
    offsets: &[i64],
    policy: DuePolicy,
) -> Vec<DueEmail> {
    let days = DayOffsets::between(now, event_date);
    let mut due = Vec::new();

    match policy {
        DuePolicy::Exact => {
            if days.is_upcoming() {
                for &offset in offsets {
                    if days.days_until == offset {
                        due.push(DueEmail::Reminder {
                            days_before: offset,
                        });
                    }
                }
            }
            if days.is_recent() && days.days_since == THANK_YOU_DAY {
                due.push(DueEmail::ThankYou);
            }
        }
        DuePolicy::CatchUp => {
            // Only the nearest offset that has been reached: a missed 7-day
            // reminder is not sent once the 1-day reminder is due.
            if days.is_upcoming() {
                if let Some(&offset) = offsets
                    .iter()
                    .filter(|&&o| days.days_until <= o)
                    .min()
                {
                    due.push(DueEmail::Reminder {
                        days_before: offset,
                    });
                }
            }
            if days.is_recent() && days.days_since >= THANK_YOU_DAY {
                due.push(DueEmail::ThankYou);
            }
        }
    }

    due
}
