use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A community event as stored by the admin dashboard.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub title: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub description: Option<String>,
}
