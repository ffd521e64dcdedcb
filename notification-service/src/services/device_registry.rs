/// Device registration, refresh and soft-deactivation for the
/// `/devices/*` HTTP surface. Complements C5's gateway-failure-driven
/// lifecycle (`token_lifecycle.rs`) with the client-driven side of the same
/// table.
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Device, Platform};

pub struct DeviceRegistry {
    db: PgPool,
}

impl DeviceRegistry {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Upserts on `(user_id, device_token)`: a device re-registering after a
    /// reinstall or app-version bump refreshes its row instead of
    /// accumulating duplicates.
    pub async fn register(
        &self,
        user_id: Uuid,
        device_token: String,
        platform: Platform,
        fcm_token: Option<String>,
    ) -> Result<Device> {
        let now = Utc::now();
        let device_id = Uuid::new_v4();

        let row = sqlx::query(
            r#"
            INSERT INTO devices (
                device_id, user_id, platform, device_token, fcm_token,
                is_active, last_seen, registration_date, failure_count, tags
            ) VALUES ($1, $2, $3, $4, $5, true, $6, $6, 0, '{}')
            ON CONFLICT (user_id, device_token) DO UPDATE SET
                platform = EXCLUDED.platform,
                fcm_token = EXCLUDED.fcm_token,
                is_active = true,
                deactivated_at = NULL,
                failure_count = 0,
                last_seen = EXCLUDED.last_seen
            RETURNING device_id, user_id, platform, device_token, fcm_token, app_version,
                      device_info, push_enabled, push_sound, push_badge, push_alert,
                      is_active, last_seen, registration_date, failure_count, last_failure,
                      deactivated_at, tags, metadata
            "#,
        )
        .bind(device_id)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(&device_token)
        .bind(&fcm_token)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        row_to_device(row)
    }

    /// `POST /devices/refresh`. 404 (via `Ok(None)`) if the device is unknown.
    pub async fn refresh(&self, device_id: Uuid, fcm_token: Option<String>) -> Result<Option<()>> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET fcm_token = COALESCE($1, fcm_token), last_seen = $2
            WHERE device_id = $3
            "#,
        )
        .bind(&fcm_token)
        .bind(now)
        .bind(device_id)
        .execute(&self.db)
        .await?;

        Ok((result.rows_affected() > 0).then_some(()))
    }

    /// `DELETE /devices/{deviceId}`: soft delete, never a hard row delete.
    pub async fn deactivate(&self, device_id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET is_active = false, deactivated_at = $1
            WHERE device_id = $2 AND is_active = true
            "#,
        )
        .bind(now)
        .bind(device_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_as_str() {
        assert_eq!(Platform::parse(Platform::Ios.as_str()), Platform::Ios);
        assert_eq!(Platform::parse(Platform::Android.as_str()), Platform::Android);
    }
}
