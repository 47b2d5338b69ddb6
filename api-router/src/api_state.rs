use std::sync::Arc;

use chat_engine::{
    registry::SessionRegistry,
    responder::{OpenAiResponder, Responder},
    OpenAIClientType,
};
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};

use crate::SessionStoreType;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub session_store: Arc<SessionStoreType>,
    pub responder: Arc<dyn Responder>,
    pub sessions: Arc<SessionRegistry>,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        session_store: Arc<SessionStoreType>,
        openai_client: Arc<OpenAIClientType>,
    ) -> Self {
        let responder = Arc::new(OpenAiResponder::from_config(openai_client, config));

        Self {
            db,
            config: config.clone(),
            session_store,
            responder,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Build a state around a custom responder, e.g. a stub in tests.
    pub fn with_responder(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        session_store: Arc<SessionStoreType>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            db,
            config: config.clone(),
            session_store,
            responder,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
