use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::storage::types::user::User;

use crate::{api_state::ApiState, error::ApiError, AuthSessionType, SessionType};

#[derive(Deserialize)]
pub struct SignupParams {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct SigninParams {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub authenticated: bool,
    pub user: Option<IdentityUser>,
}

#[derive(Serialize)]
pub struct IdentityUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<&User> for IdentityUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

pub async fn signup(
    State(state): State<ApiState>,
    auth: AuthSessionType,
    Json(form): Json<SignupParams>,
) -> Result<impl IntoResponse, ApiError> {
    let email = form.email.trim().to_string();
    let name = form.name.trim().to_string();

    validate_email(&email)?;
    validate_name(&name)?;
    validate_password(&form.password)?;

    if User::find_by_email(&email, &state.db).await?.is_some() {
        return Err(ApiError::ValidationError(
            "E-mailadres is al in gebruik".to_string(),
        ));
    }

    let user = User::create_new(email, form.password, name, &state.db).await?;
    info!(user_id = %user.id, "New user registered");

    auth.login_user(user.id.clone());

    Ok(Json(IdentityResponse {
        authenticated: true,
        user: Some(IdentityUser::from(&user)),
    }))
}

pub async fn signin(
    State(state): State<ApiState>,
    auth: AuthSessionType,
    Json(form): Json<SigninParams>,
) -> Result<impl IntoResponse, ApiError> {
    let Ok(user) = User::authenticate(form.email.trim(), &form.password, &state.db).await else {
        // A failed signin never disturbs an open guest conversation
        return Err(ApiError::Unauthorized(
            "Onjuist e-mailadres of wachtwoord".to_string(),
        ));
    };

    auth.login_user(user.id.clone());

    Ok(Json(IdentityResponse {
        authenticated: true,
        user: Some(IdentityUser::from(&user)),
    }))
}

pub async fn signout(
    State(state): State<ApiState>,
    auth: AuthSessionType,
    session: SessionType,
) -> Result<impl IntoResponse, ApiError> {
    if auth.is_authenticated() {
        auth.logout_user();
    }

    // The in-memory chat state belongs to the signed-out identity
    state
        .sessions
        .evict(&session.get_session_id().to_string())
        .await;

    Ok(Json(IdentityResponse {
        authenticated: false,
        user: None,
    }))
}

pub async fn me(auth: AuthSessionType) -> Json<IdentityResponse> {
    match &auth.current_user {
        Some(user) => Json(IdentityResponse {
            authenticated: true,
            user: Some(IdentityUser::from(user)),
        }),
        None => Json(IdentityResponse {
            authenticated: false,
            user: None,
        }),
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::ValidationError(
            "E-mailadres is verplicht".to_string(),
        ));
    }

    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        });
    if !valid {
        return Err(ApiError::ValidationError(
            "Ongeldig e-mailadres".to_string(),
        ));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::ValidationError(
            "Wachtwoord is verplicht".to_string(),
        ));
    }
    if password.chars().count() < 8 {
        return Err(ApiError::ValidationError(
            "Minimaal 8 karakters".to_string(),
        ));
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::ValidationError("Naam is verplicht".to_string()));
    }
    if name.chars().count() < 2 {
        return Err(ApiError::ValidationError(
            "Minimaal 2 karakters".to_string(),
        ));
    }

    Ok(())
}
