use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use chat_engine::{
    registry::SessionSlot,
    session::Identity,
    turn::{submit_user_message, TurnOutcome},
};
use common::{
    error::AppError,
    storage::types::{
        conversation::Conversation,
        message::{Feedback, Message},
        onboarding_profile::OnboardingProfile,
    },
};

use crate::{api_state::ApiState, error::ApiError, AuthSessionType, SessionType};

fn identity_of(auth: &AuthSessionType) -> Identity {
    match &auth.current_user {
        Some(user) => Identity::User(user.id.clone()),
        None => Identity::Guest,
    }
}

async fn checkout_slot(
    state: &ApiState,
    session: &SessionType,
    auth: &AuthSessionType,
) -> Result<Arc<SessionSlot>, ApiError> {
    let session_id = session.get_session_id().to_string();
    let slot = state
        .sessions
        .checkout(&session_id, identity_of(auth), &state.db)
        .await?;
    Ok(slot)
}

fn busy_error() -> ApiError {
    ApiError::from(AppError::Busy(
        "Er wordt al een antwoord gegenereerd".to_string(),
    ))
}

#[derive(Serialize)]
pub struct SessionSnapshot {
    pub is_loading: bool,
    pub active_conversation_id: Option<String>,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

/// Current state of the session for the UI: roster, active message list and
/// the loading flag. While a turn is in flight only the flag is reported.
pub async fn session_snapshot(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;

    let Ok(chat) = slot.state.try_lock() else {
        return Ok(Json(SessionSnapshot {
            is_loading: true,
            active_conversation_id: None,
            conversations: Vec::new(),
            messages: Vec::new(),
        }));
    };

    Ok(Json(SessionSnapshot {
        is_loading: slot.is_loading(),
        active_conversation_id: chat.active_conversation_id().map(String::from),
        conversations: chat.roster(),
        messages: chat.active_messages().to_vec(),
    }))
}

pub async fn create_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    let conversation = chat.create_conversation(&state.db).await?;

    Ok(Json(conversation))
}

#[derive(Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn list_conversations(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let chat = slot.state.try_lock().map_err(|_| busy_error())?;

    let conversations = match params.q.as_deref() {
        Some(query) if !query.trim().is_empty() => chat.search(query.trim()),
        _ if params.include_archived => chat.roster_with_archived(),
        _ => chat.roster(),
    };

    Ok(Json(conversations))
}

pub async fn activate_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    chat.switch_conversation(&conversation_id, &state.db)
        .await?;

    Ok(Json(SessionSnapshot {
        is_loading: false,
        active_conversation_id: chat.active_conversation_id().map(String::from),
        conversations: chat.roster(),
        messages: chat.active_messages().to_vec(),
    }))
}

#[derive(Deserialize)]
pub struct RenameParams {
    pub title: String,
}

pub async fn rename_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Path(conversation_id): Path<String>,
    Json(form): Json<RenameParams>,
) -> Result<impl IntoResponse, ApiError> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(ApiError::ValidationError(
            "Titel mag niet leeg zijn".to_string(),
        ));
    }

    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    chat.rename_conversation(&conversation_id, title, &state.db)
        .await?;

    Ok(Json(chat.roster()))
}

pub async fn delete_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    chat.delete_conversation(&conversation_id, &state.db)
        .await?;

    Ok(Json(SessionSnapshot {
        is_loading: false,
        active_conversation_id: chat.active_conversation_id().map(String::from),
        conversations: chat.roster(),
        messages: chat.active_messages().to_vec(),
    }))
}

pub async fn archive_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    set_archived(&state, &session, &auth, &conversation_id, true).await
}

pub async fn unarchive_conversation(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    set_archived(&state, &session, &auth, &conversation_id, false).await
}

async fn set_archived(
    state: &ApiState,
    session: &SessionType,
    auth: &AuthSessionType,
    conversation_id: &str,
    archived: bool,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let slot = checkout_slot(state, session, auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    chat.set_archived(conversation_id, archived, &state.db)
        .await?;

    Ok(Json(chat.roster()))
}

#[derive(Deserialize)]
pub struct NewMessageForm {
    pub content: String,
}

#[derive(Serialize)]
pub struct TurnResponse {
    pub user_message: Message,
    pub assistant_message: Message,
    pub conversation: Conversation,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            user_message: outcome.user_message,
            assistant_message: outcome.assistant_message,
            conversation: outcome.conversation,
        }
    }
}

/// One chat turn. Rejected while a previous turn is still awaiting its
/// reply, so a session never has two answers interleaving.
pub async fn submit_message(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Json(form): Json<NewMessageForm>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;
    let _loading = slot.begin_loading();

    let profile = match &auth.current_user {
        Some(user) => OnboardingProfile::get_by_user(&user.id, &state.db).await?,
        None => None,
    };

    let outcome = submit_user_message(
        &mut chat,
        &form.content,
        profile.as_ref(),
        state.responder.as_ref(),
        &state.db,
    )
    .await?;

    Ok(Json(TurnResponse::from(outcome)))
}

#[derive(Deserialize)]
pub struct FeedbackForm {
    pub conversation_id: String,
    pub index: usize,
    pub kind: Option<Feedback>,
}

pub async fn submit_feedback(
    State(state): State<ApiState>,
    session: SessionType,
    auth: AuthSessionType,
    Json(form): Json<FeedbackForm>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = checkout_slot(&state, &session, &auth).await?;
    let mut chat = slot.state.try_lock().map_err(|_| busy_error())?;

    chat.apply_feedback(&form.conversation_id, form.index, form.kind, &state.db)
        .await?;

    Ok(Json(serde_json::json!({"status": "ok"})))
}
