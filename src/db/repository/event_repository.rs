use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

pub struct EventRepository;

impl EventRepository {
    /// Rows are owned by the admin dashboard; only tests insert them here.
    #[cfg(test)]
    pub async fn create(pool: &SqlitePool, event: CreateEvent) -> AppResult<Event> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, title, date, location, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, title, date, location, description, created_at
            "#,
        )
        .bind(id)
        .bind(event.title)
        .bind(event.date)
        .bind(event.location)
        .bind(event.description)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// All events, oldest first. The automation scans the full list each run.
    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, date, location, description, created_at
            FROM events
            ORDER BY date ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, date, location, description, created_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}
