pub mod models;
pub mod repository;

pub use models::*;
pub use repository::*;

/// Fresh in-memory database with the schema applied.
///
/// A single connection keeps every query on the same in-memory database.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}
