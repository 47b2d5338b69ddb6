use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Reminder, "reminder", {
    user_id: String,
    title: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    due_date: DateTime<Utc>,
    #[serde(default)]
    completed: bool
});

impl Reminder {
    pub fn new(user_id: String, title: String, due_date: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            title,
            due_date,
            completed: false,
        }
    }

    /// Reminders of one user, soonest due date first. Completed reminders
    /// are skipped unless asked for.
    pub async fn get_by_user(
        user_id: &str,
        include_completed: bool,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let query = if include_completed {
            "SELECT * FROM type::table($table_name) WHERE user_id = $user_id ORDER BY due_date ASC"
        } else {
            "SELECT * FROM type::table($table_name) WHERE user_id = $user_id AND (completed = false OR completed IS NONE) ORDER BY due_date ASC"
        };

        let reminders: Vec<Reminder> = db
            .client
            .query(query)
            .bind(("table_name", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(reminders)
    }

    pub async fn toggle_completed(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let reminder = Self::get_owned(id, user_id, db).await?;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/completed", !reminder.completed))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Self::get_owned(id, user_id, db).await
    }

    pub async fn delete(id: &str, user_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let _reminder = Self::get_owned(id, user_id, db).await?;

        let _deleted: Option<Self> = db.delete_item(id).await?;

        Ok(())
    }

    async fn get_owned(id: &str, user_id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        let reminder: Option<Reminder> = db.get_item(id).await?;
        let reminder =
            reminder.ok_or_else(|| AppError::NotFound("Reminder not found".to_string()))?;

        if reminder.user_id != user_id {
            return Err(AppError::Auth(
                "You don't have access to this reminder".to_string(),
            ));
        }

        Ok(reminder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_create_and_list_reminders() {
        let db = test_db().await;
        let user_id = "reminder_user";

        let soon = Reminder::new(
            user_id.to_string(),
            "Inschrijving MBO".to_string(),
            Utc::now() + chrono::Duration::days(1),
        );
        let later = Reminder::new(
            user_id.to_string(),
            "Toelatingsexamen".to_string(),
            Utc::now() + chrono::Duration::days(30),
        );

        db.store_item(later).await.expect("Failed to store reminder");
        db.store_item(soon.clone())
            .await
            .expect("Failed to store reminder");

        let reminders = Reminder::get_by_user(user_id, false, &db)
            .await
            .expect("Failed to list reminders");

        assert_eq!(reminders.len(), 2);
        assert_eq!(reminders[0].id, soon.id); // soonest first
    }

    #[tokio::test]
    async fn test_toggle_completed_hides_from_pending() {
        let db = test_db().await;
        let user_id = "toggle_user";

        let reminder = Reminder::new(
            user_id.to_string(),
            "Documenten inleveren".to_string(),
            Utc::now() + chrono::Duration::days(7),
        );
        let reminder_id = reminder.id.clone();

        db.store_item(reminder)
            .await
            .expect("Failed to store reminder");

        let toggled = Reminder::toggle_completed(&reminder_id, user_id, &db)
            .await
            .expect("Failed to toggle reminder");
        assert!(toggled.completed);

        let pending = Reminder::get_by_user(user_id, false, &db)
            .await
            .expect("Failed to list reminders");
        assert!(pending.is_empty());

        let all = Reminder::get_by_user(user_id, true, &db)
            .await
            .expect("Failed to list reminders");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_requires_ownership() {
        let db = test_db().await;

        let reminder = Reminder::new(
            "owner".to_string(),
            "Priveherinnering".to_string(),
            Utc::now(),
        );
        let reminder_id = reminder.id.clone();

        db.store_item(reminder)
            .await
            .expect("Failed to store reminder");

        let result = Reminder::delete(&reminder_id, "intruder", &db).await;
        assert!(matches!(result, Err(AppError::Auth(_))));

        Reminder::delete(&reminder_id, "owner", &db)
            .await
            .expect("Failed to delete reminder");

        let gone: Option<Reminder> = db
            .get_item(&reminder_id)
            .await
            .expect("Failed to query reminder");
        assert!(gone.is_none());
    }
}
