use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use common::storage::types::onboarding_profile::OnboardingProfile;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::RequireUser};

pub async fn get_onboarding(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = OnboardingProfile::get_by_user(&user.id, &state.db)
        .await?
        .unwrap_or_else(|| OnboardingProfile::new(user.id));

    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct OnboardingForm {
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub favorite_subjects: Vec<String>,
    #[serde(default)]
    pub future_plans: Option<String>,
    #[serde(default)]
    pub formality: Option<String>,
}

pub async fn put_onboarding(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
    Json(form): Json<OnboardingForm>,
) -> Result<impl IntoResponse, ApiError> {
    let mut profile = OnboardingProfile::new(user.id);
    profile.education = form.education;
    profile.age = form.age;
    profile.favorite_subjects = form.favorite_subjects;
    profile.future_plans = form.future_plans;
    profile.formality = form.formality;

    let stored = profile.save(&state.db).await?;

    Ok(Json(stored))
}
