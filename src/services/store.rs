use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{
    EmailLogEntry, EmailLogRepository, Event, EventRepository, LogInsert, LogKey,
    NewEmailLogEntry, Registration, RegistrationRepository,
};
use crate::error::AppResult;

/// Everything the automation reads from or writes to persistence.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn find_events_all(&self) -> AppResult<Vec<Event>>;
    async fn find_registrations_by_event(&self, event_id: &str) -> AppResult<Vec<Registration>>;
    async fn find_log_entry(&self, key: &LogKey) -> AppResult<Option<EmailLogEntry>>;
    /// Insert a log entry. Entries are unique per key; a second
    /// insert for the same key returns `LogInsert::Duplicate`.
    async fn insert_log_entry(&self, entry: NewEmailLogEntry) -> AppResult<LogInsert>;
}

pub struct SqliteAutomationStore {
    pool: SqlitePool,
}

impl SqliteAutomationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutomationStore for SqliteAutomationStore {
    async fn find_events_all(&self) -> AppResult<Vec<Event>> {
        EventRepository::list_all(&self.pool).await
    }

    async fn find_registrations_by_event(&self, event_id: &str) -> AppResult<Vec<Registration>> {
        RegistrationRepository::find_by_event_id(&self.pool, event_id).await
    }

    async fn find_log_entry(&self, key: &LogKey) -> AppResult<Option<EmailLogEntry>> {
        EmailLogRepository::find_by_key(&self.pool, key).await
    }

    async fn insert_log_entry(&self, entry: NewEmailLogEntry) -> AppResult<LogInsert> {
        EmailLogRepository::insert(&self.pool, entry).await
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::error::AppError;

    /// In-memory store with the same uniqueness rule as the SQLite schema.
    #[derive(Default)]
    pub struct InMemoryStore {
        pub events: Mutex<Vec<Event>>,
        pub registrations: Mutex<Vec<Registration>>,
        pub logs: Mutex<Vec<EmailLogEntry>>,
        pub fail_event_listing: AtomicBool,
        pub fail_log_writes: AtomicBool,
    }

    impl InMemoryStore {
        pub fn add_event(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        pub fn add_registration(&self, event_id: &str, first_name: &str, email: &str) {
            self.registrations.lock().unwrap().push(Registration {
                id: Uuid::new_v4().to_string(),
                event_id: event_id.to_string(),
                first_name: first_name.to_string(),
                last_name: "Tester".to_string(),
                email: email.to_string(),
                created_at: Utc::now(),
            });
        }

        pub fn logs(&self) -> Vec<EmailLogEntry> {
            self.logs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutomationStore for InMemoryStore {
        async fn find_events_all(&self) -> AppResult<Vec<Event>> {
            if self.fail_event_listing.load(Ordering::SeqCst) {
                return Err(AppError::Internal(anyhow::anyhow!("event store offline")));
            }
            Ok(self.events.lock().unwrap().clone())
        }

        async fn find_registrations_by_event(
            &self,
            event_id: &str,
        ) -> AppResult<Vec<Registration>> {
            Ok(self
                .registrations
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect())
        }

        async fn find_log_entry(&self, key: &LogKey) -> AppResult<Option<EmailLogEntry>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .iter()
                .find(|e| &e.key() == key)
                .cloned())
        }

        async fn insert_log_entry(&self, entry: NewEmailLogEntry) -> AppResult<LogInsert> {
            if self.fail_log_writes.load(Ordering::SeqCst) {
                return Err(AppError::Internal(anyhow::anyhow!("log store offline")));
            }

            let mut logs = self.logs.lock().unwrap();
            let row = EmailLogEntry {
                id: Uuid::new_v4().to_string(),
                event_id: entry.event_id,
                email_type: entry.email_type,
                days_before_event: entry.days_before_event,
                sent_at: entry.sent_at,
                recipient_count: entry.recipient_count,
                subject: entry.subject,
                trigger: entry.trigger,
            };

            let duplicate = logs.iter().any(|e| e.key() == row.key());
            if duplicate {
                return Ok(LogInsert::Duplicate);
            }

            logs.push(row.clone());
            Ok(LogInsert::Inserted(row))
        }
    }
}
