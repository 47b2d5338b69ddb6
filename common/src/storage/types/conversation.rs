use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::message::Message;

/// Title given to a conversation before the first user message names it.
pub const TITLE_PLACEHOLDER: &str = "Nieuw gesprek";

/// Titles derived from the first user message are cut off at this many
/// characters, with an ellipsis appended when truncated.
pub const TITLE_MAX_CHARS: usize = 50;

stored_object!(Conversation, "conversation", {
    user_id: String,
    title: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    message_count: u32
});

impl Conversation {
    pub fn new(user_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            title,
            archived: false,
            message_count: 0,
        }
    }

    /// Derive a title from the first user message: the first
    /// `TITLE_MAX_CHARS` characters, with an ellipsis when the text is
    /// longer.
    pub fn derive_title(text: &str) -> String {
        let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
        if text.chars().count() > TITLE_MAX_CHARS {
            title.push('…');
        }
        title
    }

    pub fn has_placeholder_title(&self) -> bool {
        self.title == TITLE_PLACEHOLDER
    }

    pub async fn get_complete_conversation(
        conversation_id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(Self, Vec<Message>), AppError> {
        let conversation: Conversation = db
            .get_item(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if conversation.user_id != user_id {
            return Err(AppError::Auth(
                "You don't have access to this conversation".to_string(),
            ));
        }

        let messages = Self::fetch_messages(conversation_id, db).await?;

        Ok((conversation, messages))
    }

    /// Messages of one conversation in the order they were exchanged.
    pub async fn fetch_messages(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Message>, AppError> {
        let messages: Vec<Message> = db.client.
            query("SELECT * FROM type::table($table_name) WHERE conversation_id = $conversation_id ORDER BY created_at").
            bind(("table_name", Message::table_name())).
            bind(("conversation_id", conversation_id.to_string()))
            .await?
            .take(0)?;

        Ok(messages)
    }

    pub async fn patch_title(
        id: &str,
        user_id: &str,
        new_title: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _conversation = Self::get_owned(id, user_id, db).await?;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/title", new_title.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }

    pub async fn patch_archived(
        id: &str,
        user_id: &str,
        archived: bool,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _conversation = Self::get_owned(id, user_id, db).await?;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/archived", archived))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }

    /// Write back the cached message count after messages were appended.
    pub async fn patch_message_count(
        id: &str,
        user_id: &str,
        message_count: u32,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _conversation = Self::get_owned(id, user_id, db).await?;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/message_count", message_count))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }

    /// Delete a conversation together with every message it owns.
    pub async fn delete_with_messages(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _conversation = Self::get_owned(id, user_id, db).await?;

        db.client
            .query("DELETE FROM type::table($table_name) WHERE conversation_id = $conversation_id")
            .bind(("table_name", Message::table_name()))
            .bind(("conversation_id", id.to_string()))
            .await?;

        let _deleted: Option<Self> = db.delete_item(id).await?;

        Ok(())
    }

    /// Non-archived conversations of one user, most recently updated first.
    pub async fn list_for_user(
        user_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let conversations: Vec<Conversation> = db
            .client
            .query(
                "SELECT * FROM type::table($table_name) WHERE user_id = $user_id AND (archived = false OR archived IS NONE)
            ORDER BY updated_at DESC LIMIT $limit",
            )
            .bind(("table_name", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(conversations)
    }

    pub async fn list_archived_for_user(
        user_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let conversations: Vec<Conversation> = db
            .client
            .query(
                "SELECT * FROM type::table($table_name) WHERE user_id = $user_id AND archived = true
            ORDER BY updated_at DESC LIMIT $limit",
            )
            .bind(("table_name", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(conversations)
    }

    async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let conversation: Option<Conversation> = db.get_item(id).await?;
        let conversation =
            conversation.ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if conversation.user_id != user_id {
            return Err(AppError::Auth(
                "Unauthorized to update this conversation".to_string(),
            ));
        }

        Ok(conversation)
    }
}
