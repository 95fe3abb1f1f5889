use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness plus a database round-trip. Answers 503 when the database is
/// unreachable so the cron caller can tell an outage from a quiet day.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database_ok = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            false
        }
    };

    let (code, status, database) = if database_ok {
        (StatusCode::OK, "healthy", "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
    };

    let response = HealthResponse {
        status,
        database,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (code, Json(response))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::testing::test_state;

    #[tokio::test]
    async fn reports_database_status() {
        let (state, _gateway) = test_state(chrono::Utc::now()).await;
        let app = Router::new()
            .route("/health", get(health_check))
            .with_state(state.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");

        state.db.close().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
