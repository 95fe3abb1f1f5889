//! Scheduler entry point. An external cron calls this once a day.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::routes::auth::{bearer_token, tokens_match};
use crate::services::automation::RunSummary;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/automation", get(run_automation))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: RunSummary,
}

/// Error body for the cron endpoint: `{ "success": false, "error": ... }`.
pub struct CronFailure {
    status: StatusCode,
    error: String,
}

impl CronFailure {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl IntoResponse for CronFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.error,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Caller presented `CRON_SECRET` as a bearer token.
pub struct CronAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = CronFailure;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let authorized = bearer_token(parts)
            .map(|token| tokens_match(token, &state.config.cron.secret))
            .unwrap_or(false);

        if !authorized {
            tracing::warn!("Rejected cron trigger with a missing or invalid secret");
            return Err(CronFailure::new(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }

        Ok(CronAuth)
    }
}

async fn run_automation(
    _auth: CronAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CronResponse>, CronFailure> {
    match state.automation.run().await {
        Ok(summary) => Ok(Json(CronResponse {
            success: true,
            message: format!(
                "Email automation completed: {} sent, {} failed, {} skipped",
                summary.emails_sent, summary.emails_failed, summary.emails_skipped
            ),
            summary,
        })),
        Err(AppError::Conflict(msg)) => Err(CronFailure::new(StatusCode::CONFLICT, msg)),
        Err(e) => {
            tracing::error!("Email automation run failed: {:?}", e);
            Err(CronFailure::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::db::{CreateEvent, CreateRegistration, EventRepository, RegistrationRepository};
    use crate::routes::testing::{test_state, CRON_SECRET};

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api/cron", router()).with_state(state)
    }

    fn trigger(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/cron/automation");
        if let Some(value) = auth {
            builder = builder.header(http::header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_secret() {
        let (state, gateway) = test_state(Utc::now()).await;

        for auth in [None, Some("Bearer wrong"), Some("s3cret-cron")] {
            let response = app(state.clone()).oneshot(trigger(auth)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = json_body(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "Unauthorized");
        }

        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn runs_automation_and_reports_counts() {
        let now = Utc::now();
        let (state, gateway) = test_state(now).await;

        let event = EventRepository::create(
            &state.db,
            CreateEvent {
                title: "Summer Meetup".to_string(),
                date: now + Duration::days(7),
                location: "Main Hall".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        for (first, email) in [("Ada", "ada@example.com"), ("Grace", "grace@example.com")] {
            RegistrationRepository::create(
                &state.db,
                CreateRegistration {
                    event_id: event.id.clone(),
                    first_name: first.to_string(),
                    last_name: "Tester".to_string(),
                    email: email.to_string(),
                },
            )
            .await
            .unwrap();
        }

        let auth = format!("Bearer {}", CRON_SECRET);
        let response = app(state.clone()).oneshot(trigger(Some(&auth))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["emailsSent"], 1);
        assert_eq!(body["emailsFailed"], 0);
        assert_eq!(body["eventsScanned"], 1);
        assert_eq!(gateway.sent()[0].to.len(), 2);

        let response = app(state.clone()).oneshot(trigger(Some(&auth))).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["emailsSent"], 0);
        assert_eq!(body["emailsSkipped"], 1);
        assert_eq!(gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn fatal_error_returns_500() {
        let (state, _gateway) = test_state(Utc::now()).await;
        state.db.close().await;

        let auth = format!("Bearer {}", CRON_SECRET);
        let response = app(state).oneshot(trigger(Some(&auth))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }
}
