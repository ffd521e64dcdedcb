/// Per-user delivery policy storage, backing `UserPreferences.shouldDeliver`
/// (models::UserPreferences) and the `/users/{userId}/notification-preferences`
/// handlers.
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{BlockedFilters, QuietHoursConfig, UserPreferences};

pub struct PreferencesRepository {
    db: PgPool,
}

impl PreferencesRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Loads preferences, creating and persisting defaults on first access.
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<UserPreferences> {
        if let Some(existing) = self.find(user_id).await? {
            return Ok(existing);
        }
        let defaults = UserPreferences::defaults(user_id);
        self.upsert(&defaults).await?;
        Ok(defaults)
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<UserPreferences>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, notification_types, quiet_hours, blocked,
                   max_daily_notifications, created_at, updated_at
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_preferences).transpose()
    }

    pub async fn upsert(&self, prefs: &UserPreferences) -> Result<()> {
        let notification_types = serde_json::to_value(&prefs.notification_types)
            .map_err(|e| AppError::Internal(format!("serialize notification_types: {e}")))?;
        let quiet_hours = serde_json::to_value(&prefs.quiet_hours)
            .map_err(|e| AppError::Internal(format!("serialize quiet_hours: {e}")))?;
        let blocked = serde_json::to_value(&prefs.blocked)
            .map_err(|e| AppError::Internal(format!("serialize blocked: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO user_preferences (
                user_id, notification_types, quiet_hours, blocked,
                max_daily_notifications, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                notification_types = EXCLUDED.notification_types,
                quiet_hours = EXCLUDED.quiet_hours,
                blocked = EXCLUDED.blocked,
                max_daily_notifications = EXCLUDED.max_daily_notifications,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(prefs.user_id)
        .bind(&notification_types)
        .bind(&quiet_hours)
        .bind(&blocked)
        .bind(prefs.max_daily_notifications)
        .bind(prefs.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// `PUT .../notification-preferences/bulk {notificationTypes}`.
    pub async fn set_notification_type(&self, user_id: Uuid, category: &str, enabled: bool) -> Result<UserPreferences> {
        let mut prefs = self.get_or_create(user_id).await?;
        prefs.notification_types.insert(category.to_string(), enabled);
        prefs.updated_at = chrono::Utc::now();
        self.upsert(&prefs).await?;
        Ok(prefs)
    }

    pub async fn bulk_set_notification_types(
        &self,
        user_id: Uuid,
        types: std::collections::HashMap<String, bool>,
    ) -> Result<UserPreferences> {
        let mut prefs = self.get_or_create(user_id).await?;
        prefs.notification_types.extend(types);
        prefs.updated_at = chrono::Utc::now();
        self.upsert(&prefs).await?;
        Ok(prefs)
    }

    pub async fn set_quiet_hours(&self, user_id: Uuid, quiet_hours: QuietHoursConfig) -> Result<UserPreferences> {
        let mut prefs = self.get_or_create(user_id).await?;
        prefs.quiet_hours = quiet_hours;
        prefs.updated_at = chrono::Utc::now();
        self.upsert(&prefs).await?;
        Ok(prefs)
    }
}

fn row_to_preferences(row: sqlx::postgres::PgRow) -> Result<UserPreferences> {
    let notification_types_json: serde_json::Value = row.get("notification_types");
    let quiet_hours_json: serde_json::Value = row.get("quiet_hours");
    let blocked_json: serde_json::Value = row.get("blocked");

    Ok(UserPreferences {
        user_id: row.get("user_id"),
        notification_types: serde_json::from_value(notification_types_json)
            .map_err(|e| AppError::Internal(format!("deserialize notification_types: {e}")))?,
        quiet_hours: serde_json::from_value(quiet_hours_json)
            .map_err(|e| AppError::Internal(format!("deserialize quiet_hours: {e}")))?,
        blocked: serde_json::from_value(blocked_json)
            .unwrap_or_else(|_| BlockedFilters::default()),
        max_daily_notifications: row.get("max_daily_notifications"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
