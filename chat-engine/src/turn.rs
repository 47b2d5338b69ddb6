use serde::Serialize;
use tracing::{error, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            conversation::Conversation,
            message::{Message, MessageRole},
            onboarding_profile::OnboardingProfile,
        },
    },
};

use crate::{
    context::build_context_prompt,
    responder::{Responder, ResponderError},
    session::ChatSession,
};

/// Shown when the AI call did not finish within the timeout.
pub const TIMEOUT_REPLY: &str = "Het duurde te lang om een antwoord te krijgen. \
     Probeer het zo nog eens, of stel een andere vraag over Surinaams onderwijs!";

/// Shown when the AI call failed for any other reason.
pub const FAILURE_REPLY: &str = "Er ging iets mis bij het verwerken van je vraag. \
     Probeer het later nog eens, of stel een andere vraag over Surinaams onderwijs!";

/// What one submit produced: the stored user message and whatever the
/// exchange came back with (a real reply or an error placeholder).
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub assistant_message: Message,
    pub conversation: Conversation,
}

/// Run one user-message round trip against the active conversation.
///
/// Validation failures are the only errors this returns; every responder
/// outcome (reply, timeout, service failure) lands in the message list, and
/// persistence failures are logged without rolling the turn back.
pub async fn submit_user_message(
    session: &mut ChatSession,
    text: &str,
    profile: Option<&OnboardingProfile>,
    responder: &dyn Responder,
    db: &SurrealDbClient,
) -> Result<TurnOutcome, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Bericht mag niet leeg zijn".into()));
    }

    if session.active_conversation_id().is_none() {
        session.create_conversation(db).await?;
    }
    let conversation_id = session
        .active_conversation_id()
        .map(String::from)
        .ok_or_else(|| AppError::InternalError("No active conversation".into()))?;

    let user_message = Message::new(
        conversation_id.clone(),
        MessageRole::User,
        text.to_string(),
    );
    session.push_message(user_message.clone());

    // First user message names the conversation, exactly once
    if session.needs_auto_title() {
        let title = Conversation::derive_title(text);
        session
            .rename_conversation(&conversation_id, &title, db)
            .await?;
    }

    let extra_context = profile.and_then(build_context_prompt);
    let reply = responder
        .complete(session.active_messages(), extra_context.as_deref())
        .await;

    let assistant_message = match reply {
        Ok(content) => Message::new(conversation_id.clone(), MessageRole::Assistant, content),
        Err(ResponderError::Timeout) => {
            warn!(conversation_id = %conversation_id, "AI responder timed out");
            Message::new_error(conversation_id.clone(), TIMEOUT_REPLY.to_string())
        }
        Err(ResponderError::Service(reason)) => {
            error!(conversation_id = %conversation_id, reason = %reason, "AI responder failed");
            Message::new_error(conversation_id.clone(), FAILURE_REPLY.to_string())
        }
    };
    session.push_message(assistant_message.clone());

    if session.identity().is_authenticated() {
        if let Err(e) = persist_turn(session, &user_message, &assistant_message, db).await {
            error!(
                conversation_id = %conversation_id,
                error = ?e,
                "Failed to persist chat turn; keeping in-memory state"
            );
        } else {
            session.mark_flushed();
        }
    }

    let conversation = session
        .active_conversation()
        .cloned()
        .ok_or_else(|| AppError::InternalError("Active conversation vanished".into()))?;

    Ok(TurnOutcome {
        user_message,
        assistant_message,
        conversation,
    })
}

async fn persist_turn(
    session: &mut ChatSession,
    user_message: &Message,
    assistant_message: &Message,
    db: &SurrealDbClient,
) -> Result<(), AppError> {
    let conversation_id = user_message.conversation_id.clone();

    // A guest-originated conversation gets created server-side here, with
    // its full transcript; the backfill already covers this turn's messages.
    if session.ensure_synced(&conversation_id, db).await? {
        return Ok(());
    }

    db.store_item(user_message.clone()).await?;
    db.store_item(assistant_message.clone()).await?;

    let count = session
        .active_conversation()
        .map_or(0, |c| c.message_count);
    Conversation::patch_message_count(
        &conversation_id,
        session.identity().owner_id(),
        count,
        db,
    )
    .await
}
