use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Email Log Repository
// ============================================================================

/// Repository for the email log.
///
/// Rows are unique per `(event_id, email_type, days_before_event)` through an
/// expression index, so `insert` never needs a separate
/// existence check: a racing writer gets `LogInsert::Duplicate`.
pub struct EmailLogRepository;

impl EmailLogRepository {
    pub async fn insert(pool: &SqlitePool, entry: NewEmailLogEntry) -> AppResult<LogInsert> {
        let id = Uuid::new_v4().to_string();

        let inserted = sqlx::query_as::<_, EmailLogEntry>(
            r#"
            INSERT INTO email_logs (
                id, event_id, email_type, days_before_event,
                sent_at, recipient_count, subject, trigger_kind
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            RETURNING
                id, event_id, email_type, days_before_event,
                sent_at, recipient_count, subject, trigger_kind
            "#,
        )
        .bind(id)
        .bind(entry.event_id)
        .bind(entry.email_type)
        .bind(entry.days_before_event)
        .bind(entry.sent_at)
        .bind(entry.recipient_count)
        .bind(entry.subject)
        .bind(entry.trigger)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(match inserted {
            Some(row) => LogInsert::Inserted(row),
            None => LogInsert::Duplicate,
        })
    }

    /// Find the entry recorded for a key, any trigger.
    pub async fn find_by_key(pool: &SqlitePool, key: &LogKey) -> AppResult<Option<EmailLogEntry>> {
        sqlx::query_as::<_, EmailLogEntry>(
            r#"
            SELECT
                id, event_id, email_type, days_before_event,
                sent_at, recipient_count, subject, trigger_kind
            FROM email_logs
            WHERE event_id = ?
              AND email_type = ?
              AND days_before_event IS ?
            ORDER BY sent_at ASC
            LIMIT 1
            "#,
        )
        .bind(&key.event_id)
        .bind(key.email_type)
        .bind(key.days_before_event)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Log entries for an event, newest first.
    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: &str,
    ) -> AppResult<Vec<EmailLogEntry>> {
        sqlx::query_as::<_, EmailLogEntry>(
            r#"
            SELECT
                id, event_id, email_type, days_before_event,
                sent_at, recipient_count, subject, trigger_kind
            FROM email_logs
            WHERE event_id = ?
            ORDER BY sent_at DESC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
