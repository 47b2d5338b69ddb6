#![allow(clippy::module_name_repetitions)]
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

stored_object!(Message, "message", {
    conversation_id: String,
    role: MessageRole,
    content: String,
    #[serde(default)]
    feedback: Option<Feedback>,
    #[serde(default)]
    is_error: bool
});

impl Message {
    pub fn new(conversation_id: String, role: MessageRole, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id,
            role,
            content,
            feedback: None,
            is_error: false,
        }
    }

    /// A failed AI call rendered as an assistant message so the UI always
    /// has something to show for the turn.
    pub fn new_error(conversation_id: String, content: String) -> Self {
        let mut message = Self::new(conversation_id, MessageRole::Assistant, content);
        message.is_error = true;
        message
    }

    pub async fn patch_feedback(
        id: &str,
        feedback: Option<Feedback>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let message: Option<Message> = db.get_item(id).await?;
        message.ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(match feedback {
                Some(kind) => PatchOp::replace("/feedback", kind),
                None => PatchOp::remove("/feedback"),
            })
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}
