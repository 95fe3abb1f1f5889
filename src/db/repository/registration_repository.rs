use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Registration Repository
// ============================================================================

pub struct RegistrationRepository;

impl RegistrationRepository {
    /// Rows are owned by the admin dashboard; only tests insert them here.
    #[cfg(test)]
    pub async fn create(
        pool: &SqlitePool,
        registration: CreateRegistration,
    ) -> AppResult<Registration> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO registrations (id, event_id, first_name, last_name, email, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, event_id, first_name, last_name, email, created_at
            "#,
        )
        .bind(id)
        .bind(registration.event_id)
        .bind(registration.first_name)
        .bind(registration.last_name)
        .bind(registration.email)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Registrations for an event in sign-up order.
    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: &str,
    ) -> AppResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(
            r#"
            SELECT id, event_id, first_name, last_name, email, created_at
            FROM registrations
            WHERE event_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
