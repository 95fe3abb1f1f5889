use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One person signed up for one event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRegistration {
    pub event_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}
