use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use axum_session::{Session, SessionLayer, SessionStore};
use axum_session_auth::{AuthConfig, AuthSession, AuthSessionLayer};
use axum_session_surreal::SessionSurrealPool;
use middleware_auth::require_auth;
use surrealdb::{engine::any::Any, Surreal};
use tower_http::compression::CompressionLayer;

use common::storage::types::user::User;
use routes::{
    auth::{me, signin, signout, signup},
    chat::{
        activate_conversation, archive_conversation, create_conversation, delete_conversation,
        list_conversations, rename_conversation, session_snapshot, submit_feedback,
        submit_message, unarchive_conversation,
    },
    liveness::live,
    onboarding::{get_onboarding, put_onboarding},
    readiness::ready,
    reminders::{create_reminder, delete_reminder, list_reminders, toggle_reminder},
};

pub mod api_state;
pub mod error;
mod middleware_auth;
pub mod routes;

pub type AuthSessionType = AuthSession<User, String, SessionSurrealPool<Any>, Surreal<Any>>;
pub type SessionType = Session<SessionSurrealPool<Any>>;
pub type SessionStoreType = SessionStore<SessionSurrealPool<Any>>;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (probes and identity management)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/signout", post(signout))
        .route("/auth/me", get(me));

    // Chat endpoints work for guests too; the handlers resolve the
    // identity from the auth session themselves.
    let chat = Router::new()
        .route("/chat", get(session_snapshot))
        .route("/chat/conversations", post(create_conversation))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/conversations/{id}/activate", post(activate_conversation))
        .route("/chat/conversations/{id}", patch(rename_conversation))
        .route("/chat/conversations/{id}", delete(delete_conversation))
        .route("/chat/conversations/{id}/archive", post(archive_conversation))
        .route(
            "/chat/conversations/{id}/unarchive",
            post(unarchive_conversation),
        )
        .route("/chat/messages", post(submit_message))
        .route("/chat/feedback", post(submit_feedback));

    // Protected endpoints (require a signed-in user)
    let protected = Router::new()
        .route("/reminders", post(create_reminder))
        .route("/reminders", get(list_reminders))
        .route("/reminders/{id}/toggle", post(toggle_reminder))
        .route("/reminders/{id}", delete(delete_reminder))
        .route("/onboarding", get(get_onboarding))
        .route("/onboarding", axum::routing::put(put_onboarding))
        .route_layer(from_fn_with_state(app_state.clone(), require_auth));

    public
        .merge(chat)
        .merge(protected)
        .layer(
            AuthSessionLayer::<User, String, SessionSurrealPool<Any>, Surreal<Any>>::new(Some(
                app_state.db.client.clone(),
            ))
            .with_config(AuthConfig::<String>::default()),
        )
        .layer(SessionLayer::new((*app_state.session_store).clone()))
        .layer(CompressionLayer::new())
}
