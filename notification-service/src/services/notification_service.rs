/// Core notification CRUD and the C7-step-7 `NotificationService.send` path.
/// Device loading here is shared by the event handler, C9's worker pool and
/// C5's stale-token cleanup.
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CreateNotificationRequest, DeliveryState, Device, Interaction, Notification,
    NotificationCategory, NotificationPriority, NotificationStatus, Platform,
};

pub struct NotificationService {
    db: PgPool,
}

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active devices for a user, newest-registered first.
    pub async fn load_active_devices(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, user_id, platform, device_token, fcm_token, app_version,
                   device_info, push_enabled, push_sound, push_badge, push_alert,
                   is_active, last_seen, registration_date, failure_count, last_failure,
                   deactivated_at, tags, metadata
            FROM devices
            WHERE user_id = $1 AND is_active = true
            ORDER BY registration_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_device).collect()
    }

    /// `NotificationService.send` (C7 step 7). Returns the existing row on a
    /// duplicate-key race against the `(user_id, category, resource_id)`
    /// partial index instead of erroring.
    pub async fn send(&self, req: CreateNotificationRequest) -> Result<Notification> {
        let devices = self.load_active_devices(req.user_id).await?;
        if devices.is_empty() {
            return self.insert(&req, NotificationStatus::Failed, DeliveryState::default())
                .await;
        }

        let schedule_at = req.schedule_at;
        let status = if schedule_at.map(|t| t > Utc::now()).unwrap_or(false) {
            NotificationStatus::Scheduled
        } else {
            NotificationStatus::Pending
        };

        match self.insert(&req, status, DeliveryState::default()).await {
            Ok(n) => Ok(n),
            Err(AppError::Store(e)) if is_unique_violation(&e) => {
                self.find_by_dedup_key(req.user_id, req.category, req.resource_id.as_deref())
                    .await?
                    .ok_or_else(|| AppError::Internal("duplicate insert raced but no row found".into()))
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(
        &self,
        req: &CreateNotificationRequest,
        status: NotificationStatus,
        delivery: DeliveryState,
    ) -> Result<Notification> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + req.priority.ttl();
        let delivery_json = serde_json::to_value(&delivery)
            .map_err(|e| AppError::Internal(format!("serialize delivery state: {e}")))?;
        let interactions: Vec<Interaction> = Vec::new();
        let interactions_json = serde_json::to_value(&interactions)
            .map_err(|e| AppError::Internal(format!("serialize interactions: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO notifications (
                notification_id, user_id, title, body, data, image_url, icon_url,
                category, priority, tags, urgent, schedule_at, timezone, expires_at,
                status, is_read, delivery, interactions, source, campaign, metadata,
                resource_id, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, false, $16, $17, $18, $19, $20, $21, $22, $22
            )
            ON CONFLICT (user_id, category, resource_id)
                WHERE resource_id IS NOT NULL
                DO NOTHING
            RETURNING notification_id, user_id, title, body, data, image_url, icon_url,
                      category, priority, tags, urgent, schedule_at, timezone, expires_at,
                      status, is_read, read_at, locked_by, locked_at, lock_expiry,
                      delivery, interactions, source, campaign, metadata, resource_id,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(req.user_id)
        .bind(&req.title)
        .bind(&req.body)
        .bind(&req.data)
        .bind(&req.image_url)
        .bind(None::<String>)
        .bind(req.category.as_str())
        .bind(req.priority.as_str())
        .bind(Vec::<String>::new())
        .bind(req.urgent)
        .bind(req.schedule_at)
        .bind(&req.timezone)
        .bind(expires_at)
        .bind(status.as_str())
        .bind(&delivery_json)
        .bind(&interactions_json)
        .bind(&req.source)
        .bind(None::<String>)
        .bind(&req.metadata)
        .bind(&req.resource_id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => row_to_notification(row),
            None => self
                .find_by_dedup_key(req.user_id, req.category, req.resource_id.as_deref())
                .await?
                .ok_or_else(|| AppError::Internal("insert skipped but no row found".into())),
        }
    }

    pub async fn find_by_id(&self, notification_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(
            r#"
            SELECT notification_id, user_id, title, body, data, image_url, icon_url,
                   category, priority, tags, urgent, schedule_at, timezone, expires_at,
                   status, is_read, read_at, locked_by, locked_at, lock_expiry,
                   delivery, interactions, source, campaign, metadata, resource_id,
                   created_at, updated_at
            FROM notifications
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_notification).transpose()
    }

    async fn find_by_dedup_key(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        resource_id: Option<&str>,
    ) -> Result<Option<Notification>> {
        let row = sqlx::query(
            r#"
            SELECT notification_id, user_id, title, body, data, image_url, icon_url,
                   category, priority, tags, urgent, schedule_at, timezone, expires_at,
                   status, is_read, read_at, locked_by, locked_at, lock_expiry,
                   delivery, interactions, source, campaign, metadata, resource_id,
                   created_at, updated_at
            FROM notifications
            WHERE user_id = $1 AND category = $2 AND resource_id = $3
            "#,
        )
        .bind(user_id)
        .bind(category.as_str())
        .bind(resource_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_notification).transpose()
    }

    pub async fn mark_as_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<chrono::DateTime<Utc>> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = $1, updated_at = $1
            WHERE notification_id = $2 AND user_id = $3
            RETURNING read_at
            "#,
        )
        .bind(now)
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(row.get::<Option<chrono::DateTime<Utc>>, _>("read_at").unwrap_or(now)),
            None => Err(AppError::NotFound(format!(
                "notification {notification_id} not found for user"
            ))),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

fn row_to_device(row: sqlx::postgres::PgRow) -> Result<Device> {
    let platform_str: String = row.get("platform");
    Ok(Device {
        device_id: row.get("device_id"),
        user_id: row.get("user_id"),
        platform: Platform::parse(&platform_str),
        device_token: row.get("device_token"),
        fcm_token: row.get("fcm_token"),
        app_version: row.get("app_version"),
        device_info: row.get("device_info"),
        push_enabled: row.get("push_enabled"),
        push_sound: row.get("push_sound"),
        push_badge: row.get("push_badge"),
        push_alert: row.get("push_alert"),
        is_active: row.get("is_active"),
        last_seen: row.get("last_seen"),
        registration_date: row.get("registration_date"),
        failure_count: row.get("failure_count"),
        last_failure: row.get("last_failure"),
        deactivated_at: row.get("deactivated_at"),
        tags: row.get("tags"),
        metadata: row.get("metadata"),
    })
}

pub(crate) fn row_to_notification(row: sqlx::postgres::PgRow) -> Result<Notification> {
    let category_str: String = row.get("category");
    let priority_str: String = row.get("priority");
    let status_str: String = row.get("status");
    let delivery_json: serde_json::Value = row.get("delivery");
    let interactions_json: serde_json::Value = row.get("interactions");

    Ok(Notification {
        notification_id: row.get("notification_id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        body: row.get("body"),
        data: row.get("data"),
        image_url: row.get("image_url"),
        icon_url: row.get("icon_url"),
        category: NotificationCategory::parse(&category_str),
        priority: NotificationPriority::parse(&priority_str),
        tags: row.get("tags"),
        urgent: row.get("urgent"),
        schedule_at: row.get("schedule_at"),
        timezone: row.get("timezone"),
        expires_at: row.get("expires_at"),
        status: NotificationStatus::parse(&status_str),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        locked_by: row.get("locked_by"),
        locked_at: row.get("locked_at"),
        lock_expiry: row.get("lock_expiry"),
        delivery: serde_json::from_value(delivery_json)
            .map_err(|e| AppError::Internal(format!("deserialize delivery state: {e}")))?,
        interactions: serde_json::from_value(interactions_json)
            .map_err(|e| AppError::Internal(format!("deserialize interactions: {e}")))?,
        source: row.get("source"),
        campaign: row.get("campaign"),
        metadata: row.get("metadata"),
        resource_id: row.get("resource_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_unique_violation_detects_23505() {
        // Constructed indirectly: sqlx::Error doesn't expose a public
        // constructor for DatabaseError in tests, so this exercises the
        // false branch only; the true branch is covered by the `send`
        // race-recovery path at the integration layer.
        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
