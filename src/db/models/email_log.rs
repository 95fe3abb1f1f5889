use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of templated email sent for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum EmailType {
    Reminder,
    ThankYou,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Reminder => "reminder",
            EmailType::ThankYou => "thank-you",
        }
    }
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(EmailType::Reminder),
            "thank-you" => Ok(EmailType::ThankYou),
            other => Err(format!("unknown email type: {}", other)),
        }
    }
}

/// Who initiated a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Trigger {
    Auto,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Auto => "auto",
            Trigger::Manual => "manual",
        }
    }
}

/// Identity of a send in the email log: `(event, type, offset)`.
///
/// The offset is only part of the key for reminders; thank-you emails are
/// keyed by event and type alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub event_id: String,
    pub email_type: EmailType,
    pub days_before_event: Option<i64>,
}

impl LogKey {
    pub fn reminder(event_id: &str, offset: i64) -> Self {
        Self {
            event_id: event_id.to_string(),
            email_type: EmailType::Reminder,
            days_before_event: Some(offset),
        }
    }

    pub fn thank_you(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            email_type: EmailType::ThankYou,
            days_before_event: None,
        }
    }

    /// Stable key handed to the email provider so a repeated dispatch of the
    /// same automated email is deduplicated on their side.
    pub fn idempotency_key(&self) -> String {
        match self.days_before_event {
            Some(days) => format!("auto:{}:{}:{}", self.event_id, self.email_type, days),
            None => format!("auto:{}:{}", self.event_id, self.email_type),
        }
    }
}

/// A row of the email log: audit trail plus idempotency ledger.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub id: String,
    pub event_id: String,
    pub email_type: EmailType,
    pub days_before_event: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub recipient_count: i64,
    pub subject: String,
    #[sqlx(rename = "trigger_kind")]
    #[serde(rename = "trigger")]
    pub trigger: Trigger,
}

#[cfg(test)]
impl EmailLogEntry {
    pub fn key(&self) -> LogKey {
        LogKey {
            event_id: self.event_id.clone(),
            email_type: self.email_type,
            days_before_event: self.days_before_event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmailLogEntry {
    pub event_id: String,
    pub email_type: EmailType,
    pub days_before_event: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub recipient_count: i64,
    pub subject: String,
    pub trigger: Trigger,
}

/// Result of writing a log entry under its unique key.
#[derive(Debug, Clone)]
pub enum LogInsert {
    Inserted(EmailLogEntry),
    /// An entry with the same key is already recorded.
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_type_round_trips_through_str() {
        assert_eq!("thank-you".parse::<EmailType>().unwrap(), EmailType::ThankYou);
        assert_eq!(EmailType::Reminder.to_string(), "reminder");
        assert!("newsletter".parse::<EmailType>().is_err());
    }

    #[test]
    fn email_type_serializes_kebab_case() {
        let json = serde_json::to_string(&EmailType::ThankYou).unwrap();
        assert_eq!(json, "\"thank-you\"");
    }

    #[test]
    fn idempotency_keys_distinguish_offsets() {
        let seven = LogKey::reminder("evt-1", 7).idempotency_key();
        let one = LogKey::reminder("evt-1", 1).idempotency_key();
        assert_eq!(seven, "auto:evt-1:reminder:7");
        assert_ne!(seven, one);
        assert_eq!(
            LogKey::thank_you("evt-1").idempotency_key(),
            "auto:evt-1:thank-you"
        );
    }
}
