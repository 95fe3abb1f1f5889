use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::{EmailLogEntry, EmailLogRepository, EmailType, Event, EventRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AdminAuth;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:id/emails", get(list_emails).post(send_email))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub email_type: EmailType,
}

async fn load_event(state: &AppState, id: &str) -> AppResult<Event> {
    EventRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))
}

/// Email history for an event, newest first.
async fn list_emails(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<EmailLogEntry>>> {
    let event = load_event(&state, &id).await?;
    let entries = EmailLogRepository::find_by_event_id(&state.db, &event.id).await?;
    Ok(Json(entries))
}

/// Send a reminder or thank-you to all registrants now.
async fn send_email(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SendEmailRequest>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, &id).await?;
    let entry = state.automation.send_manual(&event, body.email_type).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
