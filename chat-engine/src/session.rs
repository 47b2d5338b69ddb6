use std::collections::{HashMap, HashSet};

use tracing::{debug, error};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            conversation::{Conversation, TITLE_PLACEHOLDER},
            message::{Feedback, Message},
        },
    },
};

/// A guest holds at most one conversation, and nothing it does is ever
/// written to the database.
pub const GUEST_CONVERSATION_LIMIT: usize = 1;

/// Roster cap for authenticated users.
pub const ROSTER_LIMIT: usize = 100;

/// Owner recorded on conversations that only exist in process memory.
const GUEST_OWNER: &str = "guest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Guest,
    User(String),
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Identity::Guest => GUEST_OWNER,
            Identity::User(id) => id,
        }
    }
}

/// Session-scoped conversation state: the roster of known conversations and
/// the message list of whichever conversation is active. Owned by exactly
/// one web session and handed to handlers explicitly; the database is only
/// touched for authenticated identities.
pub struct ChatSession {
    identity: Identity,
    active_conversation_id: Option<String>,
    conversations: Vec<Conversation>,
    active_messages: Vec<Message>,
    // Message lists of conversations that only exist in memory, keyed by
    // conversation id. Stashed here when the conversation is not active.
    offline_messages: HashMap<String, Vec<Message>>,
    // Conversations not yet created server-side (guest-originated). Synced
    // lazily once the identity can persist.
    unsynced: HashSet<String>,
    dirty: bool,
}

impl ChatSession {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            active_conversation_id: None,
            conversations: Vec::new(),
            active_messages: Vec::new(),
            offline_messages: HashMap::new(),
            unsynced: HashSet::new(),
            dirty: false,
        }
    }

    /// Load the persisted roster. No-op for guests.
    pub async fn hydrate(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        let Identity::User(user_id) = &self.identity else {
            return Ok(());
        };

        let persisted = Conversation::list_for_user(user_id, ROSTER_LIMIT, db).await?;
        for conversation in persisted {
            if !self.conversations.iter().any(|c| c.id == conversation.id) {
                self.conversations.push(conversation);
            }
        }
        self.sort_roster();

        Ok(())
    }

    /// Swap the session to a different identity.
    ///
    /// Guest → user keeps the in-memory transcript: the guest's
    /// conversations stay in the roster as unsynced entries and are created
    /// server-side on the next persistence touchpoint. Every other change
    /// (sign-out, different user) resets to a fresh guest-or-user state.
    pub async fn adopt_identity(
        &mut self,
        identity: Identity,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if self.identity == identity {
            return Ok(());
        }

        match (&self.identity, &identity) {
            (Identity::Guest, Identity::User(user_id)) => {
                let user_id = user_id.clone();
                for conversation in &mut self.conversations {
                    conversation.user_id.clone_from(&user_id);
                }
                self.identity = identity;
                self.hydrate(db).await?;
            }
            _ => {
                *self = Self::new(identity);
                self.hydrate(db).await?;
            }
        }

        Ok(())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    pub fn active_messages(&self) -> &[Message] {
        &self.active_messages
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.active_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Non-archived conversations, most recently updated first.
    pub fn roster(&self) -> Vec<Conversation> {
        self.conversations
            .iter()
            .filter(|c| !c.archived)
            .cloned()
            .collect()
    }

    pub fn roster_with_archived(&self) -> Vec<Conversation> {
        self.conversations.clone()
    }

    /// Case-insensitive substring match against conversation titles.
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| !c.archived && c.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub async fn create_conversation(
        &mut self,
        db: &SurrealDbClient,
    ) -> Result<Conversation, AppError> {
        self.flush_active(db).await;

        let limit = match self.identity {
            Identity::Guest => GUEST_CONVERSATION_LIMIT,
            Identity::User(_) => ROSTER_LIMIT,
        };
        if self.conversations.len() >= limit {
            return Err(match self.identity {
                Identity::Guest => AppError::LimitReached(
                    "Maak een account aan om meer gesprekken te starten".into(),
                ),
                Identity::User(_) => {
                    AppError::LimitReached("Maximum aantal gesprekken bereikt".into())
                }
            });
        }

        let conversation = Conversation::new(
            self.identity.owner_id().to_string(),
            TITLE_PLACEHOLDER.to_string(),
        );

        if self.identity.is_authenticated() {
            db.store_item(conversation.clone()).await?;
        } else {
            self.unsynced.insert(conversation.id.clone());
        }

        self.stash_active();
        self.conversations.insert(0, conversation.clone());
        self.active_conversation_id = Some(conversation.id.clone());
        self.active_messages = Vec::new();
        self.dirty = false;

        Ok(conversation)
    }

    pub async fn switch_conversation(
        &mut self,
        target_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if self.active_conversation_id.as_deref() == Some(target_id) {
            return Ok(());
        }
        if !self.conversations.iter().any(|c| c.id == target_id) {
            return Err(AppError::NotFound("Conversation not found".into()));
        }

        self.flush_active(db).await;
        self.stash_active();
        self.activate(target_id, db).await
    }

    /// Set the title of a conversation. A nonexistent id is a silent no-op.
    pub async fn rename_conversation(
        &mut self,
        id: &str,
        new_title: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let synced = !self.unsynced.contains(id);
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return Ok(());
        };

        conversation.title = new_title.to_string();
        conversation.updated_at = chrono::Utc::now();

        if self.identity.is_authenticated() && synced {
            Conversation::patch_title(id, self.identity.owner_id(), new_title, db).await?;
        }

        Ok(())
    }

    pub async fn delete_conversation(
        &mut self,
        id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let Some(position) = self.conversations.iter().position(|c| c.id == id) else {
            return Err(AppError::NotFound("Conversation not found".into()));
        };

        let was_active = self.active_conversation_id.as_deref() == Some(id);
        let was_synced = !self.unsynced.remove(id);

        self.conversations.remove(position);
        self.offline_messages.remove(id);

        if was_active {
            self.active_conversation_id = None;
            self.active_messages.clear();
            self.dirty = false;
        }

        if self.identity.is_authenticated() && was_synced {
            Conversation::delete_with_messages(id, self.identity.owner_id(), db).await?;
        }

        if was_active {
            // Most recently updated remaining conversation takes over, or a
            // fresh one when the roster ran empty.
            let next = self
                .conversations
                .iter()
                .max_by_key(|c| c.updated_at)
                .map(|c| c.id.clone());
            match next {
                Some(next_id) => self.activate(&next_id, db).await?,
                None => {
                    self.create_conversation(db).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn set_archived(
        &mut self,
        id: &str,
        archived: bool,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let synced = !self.unsynced.contains(id);
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return Err(AppError::NotFound("Conversation not found".into()));
        };

        conversation.archived = archived;
        conversation.updated_at = chrono::Utc::now();

        if self.identity.is_authenticated() && synced {
            Conversation::patch_archived(id, self.identity.owner_id(), archived, db).await?;
        }

        Ok(())
    }

    /// Set feedback on one message of a conversation. The index counts into
    /// that conversation's message list in timestamp order.
    pub async fn apply_feedback(
        &mut self,
        conversation_id: &str,
        index: usize,
        feedback: Option<Feedback>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if !self.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(AppError::NotFound("Conversation not found".into()));
        }

        let is_active = self.active_conversation_id.as_deref() == Some(conversation_id);
        let synced = !self.unsynced.contains(conversation_id);

        if is_active || !synced {
            let messages = if is_active {
                &mut self.active_messages
            } else {
                self.offline_messages
                    .entry(conversation_id.to_string())
                    .or_default()
            };
            let Some(message) = messages.get_mut(index) else {
                return Err(AppError::Validation("Message index out of bounds".into()));
            };
            message.feedback = feedback;

            if self.identity.is_authenticated() && synced {
                Message::patch_feedback(&message.id, feedback, db).await?;
            }
            return Ok(());
        }

        // Synced but not loaded: resolve the index against the stored list
        let messages = Conversation::fetch_messages(conversation_id, db).await?;
        let Some(message) = messages.get(index) else {
            return Err(AppError::Validation("Message index out of bounds".into()));
        };
        Message::patch_feedback(&message.id, feedback, db).await
    }

    /// Append a message to the active conversation and keep its cached
    /// counters in step. The caller guarantees a conversation is active.
    pub(crate) fn push_message(&mut self, message: Message) {
        self.active_messages.push(message);
        let count = self.active_messages.len() as u32;
        if let Some(id) = self.active_conversation_id.clone() {
            if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) {
                conversation.message_count = count;
                conversation.updated_at = chrono::Utc::now();
            }
        }
        self.dirty = true;
    }

    /// The orchestrator persisted the pending changes itself.
    pub(crate) fn mark_flushed(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn needs_auto_title(&self) -> bool {
        self.active_conversation()
            .is_some_and(Conversation::has_placeholder_title)
    }

    /// Write the active conversation's pending counter changes back to the
    /// database. Failures are logged and swallowed: the in-memory state
    /// stays authoritative for this session.
    pub async fn flush_active(&mut self, db: &SurrealDbClient) {
        if !self.dirty {
            return;
        }
        let Some(id) = self.active_conversation_id.clone() else {
            return;
        };
        if !self.identity.is_authenticated() {
            // Guests never persist; the in-memory roster already carries
            // the updated counters.
            self.dirty = false;
            return;
        }

        if let Err(e) = self.sync_conversation(&id, db).await {
            error!(conversation_id = %id, error = ?e, "Failed to flush conversation state");
        } else {
            self.dirty = false;
        }
    }

    /// Make sure a conversation exists server-side, creating it and
    /// backfilling its messages when it was guest-originated. Returns true
    /// when a backfill happened.
    pub(crate) async fn ensure_synced(
        &mut self,
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<bool, AppError> {
        if !self.identity.is_authenticated() || !self.unsynced.contains(conversation_id) {
            return Ok(false);
        }

        let conversation = self
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;

        debug!(conversation_id, "Persisting guest-originated conversation");
        db.store_item(conversation).await?;

        let messages = if self.active_conversation_id.as_deref() == Some(conversation_id) {
            self.active_messages.clone()
        } else {
            self.offline_messages
                .get(conversation_id)
                .cloned()
                .unwrap_or_default()
        };
        for message in messages {
            db.store_item(message).await?;
        }

        self.unsynced.remove(conversation_id);
        self.offline_messages.remove(conversation_id);

        Ok(true)
    }

    async fn sync_conversation(
        &mut self,
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if self.ensure_synced(conversation_id, db).await? {
            return Ok(());
        }
        let count = self
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map_or(0, |c| c.message_count);
        Conversation::patch_message_count(conversation_id, self.identity.owner_id(), count, db)
            .await
    }

    async fn activate(&mut self, id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let messages = if self.unsynced.contains(id) {
            self.offline_messages.remove(id).unwrap_or_default()
        } else if self.identity.is_authenticated() {
            Conversation::fetch_messages(id, db).await?
        } else {
            Vec::new()
        };

        self.active_conversation_id = Some(id.to_string());
        self.active_messages = messages;
        self.dirty = false;

        Ok(())
    }

    /// Park the active message list so a different conversation can load.
    /// Lists of unsynced conversations are the only copy and are kept;
    /// synced lists can be re-fetched.
    fn stash_active(&mut self) {
        if let Some(prev) = self.active_conversation_id.take() {
            let messages = std::mem::take(&mut self.active_messages);
            if self.unsynced.contains(&prev) {
                self.offline_messages.insert(prev, messages);
            }
        }
    }

    fn sort_roster(&mut self) {
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::message::MessageRole;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn user_identity() -> Identity {
        Identity::User("user_1".to_string())
    }

    async fn push_and_store(session: &mut ChatSession, db: &SurrealDbClient, content: &str) {
        let id = session
            .active_conversation_id()
            .expect("No active conversation")
            .to_string();
        let message = Message::new(id, MessageRole::User, content.to_string());
        if session.identity().is_authenticated() {
            db.store_item(message.clone())
                .await
                .expect("Failed to store message");
        }
        session.push_message(message);
    }

    #[tokio::test]
    async fn test_guest_conversation_limit() {
        let db = test_db().await;
        let mut session = ChatSession::new(Identity::Guest);

        session
            .create_conversation(&db)
            .await
            .expect("First guest conversation should succeed");

        let second = session.create_conversation(&db).await;
        assert!(matches!(second, Err(AppError::LimitReached(_))));
        assert_eq!(session.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_guest_conversations_never_hit_database() {
        let db = test_db().await;
        let mut session = ChatSession::new(Identity::Guest);

        session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        push_and_store(&mut session, &db, "Hallo").await;

        let stored: Vec<Conversation> = db
            .get_all_stored_items()
            .await
            .expect("Failed to list conversations");
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_create_persists() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");

        let stored: Option<Conversation> = db
            .get_item(&conversation.id)
            .await
            .expect("Failed to fetch conversation");
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_roster_limit_for_authenticated() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        for _ in 0..ROSTER_LIMIT {
            session
                .create_conversation(&db)
                .await
                .expect("Creation under the limit should succeed");
        }

        let overflow = session.create_conversation(&db).await;
        assert!(matches!(overflow, Err(AppError::LimitReached(_))));
    }

    #[tokio::test]
    async fn test_switch_restores_exact_message_list() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let a = session
            .create_conversation(&db)
            .await
            .expect("Failed to create A");
        push_and_store(&mut session, &db, "Eerste bericht").await;
        push_and_store(&mut session, &db, "Tweede bericht").await;
        let messages_a: Vec<String> = session
            .active_messages()
            .iter()
            .map(|m| m.content.clone())
            .collect();

        let b = session
            .create_conversation(&db)
            .await
            .expect("Failed to create B");
        assert_eq!(session.active_conversation_id(), Some(b.id.as_str()));
        assert!(session.active_messages().is_empty());

        session
            .switch_conversation(&a.id, &db)
            .await
            .expect("Failed to switch back to A");

        let restored: Vec<String> = session
            .active_messages()
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(restored, messages_a);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_conversation_fails() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let result = session.switch_conversation("nope", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rename_nonexistent_is_noop() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        session
            .rename_conversation("ghost", "Nieuwe titel", &db)
            .await
            .expect("Rename of unknown id should be a no-op");
        assert!(session.roster().is_empty());
    }

    #[tokio::test]
    async fn test_rename_updates_roster_and_database() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");

        session
            .rename_conversation(&conversation.id, "Toelatingseisen", &db)
            .await
            .expect("Failed to rename conversation");

        assert_eq!(session.roster()[0].title, "Toelatingseisen");

        let stored: Conversation = db
            .get_item(&conversation.id)
            .await
            .expect("Failed to fetch conversation")
            .expect("Conversation missing");
        assert_eq!(stored.title, "Toelatingseisen");
    }

    #[tokio::test]
    async fn test_delete_active_activates_most_recent() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let a = session
            .create_conversation(&db)
            .await
            .expect("Failed to create A");
        let b = session
            .create_conversation(&db)
            .await
            .expect("Failed to create B");

        // B is active; deleting it should fall back to A
        session
            .delete_conversation(&b.id, &db)
            .await
            .expect("Failed to delete conversation");

        assert_eq!(session.active_conversation_id(), Some(a.id.as_str()));
        assert_eq!(session.roster().len(), 1);

        let stored: Option<Conversation> = db
            .get_item(&b.id)
            .await
            .expect("Failed to fetch conversation");
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_delete_last_conversation_creates_fresh_one() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let only = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");

        session
            .delete_conversation(&only.id, &db)
            .await
            .expect("Failed to delete conversation");

        assert_eq!(session.roster().len(), 1);
        assert_ne!(session.roster()[0].id, only.id);
        assert!(session.active_conversation_id().is_some());
    }

    #[tokio::test]
    async fn test_archive_hides_from_roster() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");

        session
            .set_archived(&conversation.id, true, &db)
            .await
            .expect("Failed to archive");

        assert!(session.roster().is_empty());
        assert_eq!(session.roster_with_archived().len(), 1);

        session
            .set_archived(&conversation.id, false, &db)
            .await
            .expect("Failed to unarchive");
        assert_eq!(session.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let first = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        session
            .rename_conversation(&first.id, "Toelatingseisen universiteit", &db)
            .await
            .expect("Failed to rename");

        let second = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        session
            .rename_conversation(&second.id, "Kosten MBO", &db)
            .await
            .expect("Failed to rename");

        let hits = session.search("TOELATING");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, first.id);

        assert!(session.search("geschiedenis").is_empty());
    }

    #[tokio::test]
    async fn test_feedback_valid_index() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        push_and_store(&mut session, &db, "Hallo").await;

        session
            .apply_feedback(&conversation.id, 0, Some(Feedback::Like), &db)
            .await
            .expect("Failed to apply feedback");

        assert_eq!(session.active_messages()[0].feedback, Some(Feedback::Like));
    }

    #[tokio::test]
    async fn test_feedback_out_of_bounds() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        push_and_store(&mut session, &db, "Hallo").await;

        let result = session
            .apply_feedback(&conversation.id, 5, Some(Feedback::Like), &db)
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(session.active_messages()[0].feedback, None);
    }

    #[tokio::test]
    async fn test_guest_upgrade_preserves_transcript() {
        let db = test_db().await;
        let mut session = ChatSession::new(Identity::Guest);

        let conversation = session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");
        push_and_store(&mut session, &db, "Hallo").await;

        session
            .adopt_identity(user_identity(), &db)
            .await
            .expect("Failed to adopt identity");

        // The transcript survived the upgrade and now belongs to the user
        assert_eq!(session.roster().len(), 1);
        assert_eq!(session.roster()[0].user_id, "user_1");
        assert_eq!(session.active_messages().len(), 1);

        // First persistence touchpoint creates it server-side
        let backfilled = session
            .ensure_synced(&conversation.id, &db)
            .await
            .expect("Failed to sync conversation");
        assert!(backfilled);

        let stored: Option<Conversation> = db
            .get_item(&conversation.id)
            .await
            .expect("Failed to fetch conversation");
        assert!(stored.is_some());

        let messages = Conversation::fetch_messages(&conversation.id, &db)
            .await
            .expect("Failed to fetch messages");
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_resets_state() {
        let db = test_db().await;
        let mut session = ChatSession::new(user_identity());

        session
            .create_conversation(&db)
            .await
            .expect("Failed to create conversation");

        session
            .adopt_identity(Identity::Guest, &db)
            .await
            .expect("Failed to adopt identity");

        assert!(session.roster().is_empty());
        assert!(session.active_conversation_id().is_none());
    }

    #[tokio::test]
    async fn test_hydrate_loads_persisted_roster() {
        let db = test_db().await;

        {
            let mut session = ChatSession::new(user_identity());
            let conversation = session
                .create_conversation(&db)
                .await
                .expect("Failed to create conversation");
            session
                .rename_conversation(&conversation.id, "Bewaard gesprek", &db)
                .await
                .expect("Failed to rename");
        }

        // A new session for the same identity sees the stored roster
        let mut fresh = ChatSession::new(user_identity());
        fresh.hydrate(&db).await.expect("Failed to hydrate");

        assert_eq!(fresh.roster().len(), 1);
        assert_eq!(fresh.roster()[0].title, "Bewaard gesprek");
    }
}
