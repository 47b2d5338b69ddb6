use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::storage::types::reminder::Reminder;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::RequireUser};

#[derive(Deserialize)]
pub struct NewReminderForm {
    pub title: String,
    pub due_date: DateTime<Utc>,
}

pub async fn create_reminder(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
    Json(form): Json<NewReminderForm>,
) -> Result<impl IntoResponse, ApiError> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(ApiError::ValidationError(
            "Titel is verplicht".to_string(),
        ));
    }

    let reminder = Reminder::new(user.id, title.to_string(), form.due_date);
    let stored = state
        .db
        .store_item(reminder)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::InternalError("Failed to store reminder".to_string()))?;

    Ok(Json(stored))
}

#[derive(Deserialize)]
pub struct ListRemindersParams {
    #[serde(default)]
    pub include_completed: bool,
}

pub async fn list_reminders(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
    Query(params): Query<ListRemindersParams>,
) -> Result<impl IntoResponse, ApiError> {
    let reminders =
        Reminder::get_by_user(&user.id, params.include_completed, &state.db).await?;

    Ok(Json(reminders))
}

pub async fn toggle_reminder(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
    Path(reminder_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reminder = Reminder::toggle_completed(&reminder_id, &user.id, &state.db).await?;

    Ok(Json(reminder))
}

pub async fn delete_reminder(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
    Path(reminder_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Reminder::delete(&reminder_id, &user.id, &state.db).await?;

    Ok(Json(serde_json::json!({"status": "ok"})))
}
