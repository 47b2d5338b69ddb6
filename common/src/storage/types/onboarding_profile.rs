use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

// Onboarding answers that are folded into the AI context as user
// preferences. One record per user, replaced on every save.
stored_object!(OnboardingProfile, "onboarding_profile", {
    user_id: String,
    #[serde(default)]
    education: Vec<String>,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    favorite_subjects: Vec<String>,
    #[serde(default)]
    future_plans: Option<String>,
    #[serde(default)]
    formality: Option<String>
});

impl OnboardingProfile {
    pub fn new(user_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            education: Vec::new(),
            age: None,
            favorite_subjects: Vec::new(),
            future_plans: None,
            formality: None,
        }
    }

    pub async fn get_by_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let profile: Option<OnboardingProfile> = db
            .client
            .query("SELECT * FROM type::table($table_name) WHERE user_id = $user_id LIMIT 1")
            .bind(("table_name", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(profile)
    }

    /// Store the profile, replacing any earlier record for the same user.
    pub async fn save(mut self, db: &SurrealDbClient) -> Result<Self, AppError> {
        if let Some(existing) = Self::get_by_user(&self.user_id, db).await? {
            let _removed: Option<Self> = db.delete_item(&existing.id).await?;
            self.created_at = existing.created_at;
        }
        self.updated_at = Utc::now();

        let stored = db.store_item(self).await?;
        stored.ok_or_else(|| AppError::InternalError("Failed to store onboarding profile".into()))
    }
}
