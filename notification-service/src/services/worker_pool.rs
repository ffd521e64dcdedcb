/// Delivery Worker Pool (C9). A fixed-size pool that leases due
/// notifications, partitions by platform, gates on the per-gateway circuit
/// breaker (C2), dispatches through the FCM/APNs clients, and records
/// per-device outcomes through C5's failure/success handling.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{AppError, Result};
use crate::models::{
    DeliveryState, Device, DeviceDeliveryState, DeviceDeliveryStatus, Notification,
    NotificationPriority, NotificationStatus, Platform,
};
use crate::services::fcm_client::FCMClient;
use crate::services::apns_client::{APNsClient, APNsPriority};
use crate::services::quiet_hours::{check_quiet_hours, is_urgent};
use crate::services::token_lifecycle::{handle_delivery_failure, handle_delivery_success, Classification};

const BASE_RETRY_SECS: i64 = 60;
const MAX_RETRY_SECS: i64 = 3600;
const CIRCUIT_OPEN_RESCHEDULE_SECS: i64 = 300;

/// Globally-unique per-process worker identity: hostname + pid + random suffix.
pub fn worker_identity() -> String {
    let hostname = hostname_or_unknown();
    let pid = std::process::id();
    let suffix: u32 = rand::thread_rng().gen();
    format!("{hostname}-{pid}-{suffix:08x}")
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            hostname_from_uname()
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn hostname_from_uname() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
}

pub struct GatewayBreakers {
    pub fcm: CircuitBreaker,
    pub apns: CircuitBreaker,
}

pub struct DeliveryWorker {
    id: String,
    db: PgPool,
    fcm: Option<Arc<FCMClient>>,
    apns: Option<Arc<APNsClient>>,
    breakers: Arc<GatewayBreakers>,
    config: WorkerConfig,
}

impl DeliveryWorker {
    pub fn new(
        db: PgPool,
        fcm: Option<Arc<FCMClient>>,
        apns: Option<Arc<APNsClient>>,
        breakers: Arc<GatewayBreakers>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: worker_identity(),
            db,
            fcm,
            apns,
            breakers,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// One poll-lease-process cycle. Returns the number of notifications handled.
    pub async fn tick(&self) -> Result<usize> {
        let leased = self.lease_batch().await?;
        let count = leased.len();
        for notification in leased {
            if let Err(e) = self.process_one(notification).await {
                tracing::error!(worker = %self.id, error = %e, "failed processing leased notification");
            }
        }
        Ok(count)
    }

    /// Atomic multi-row lease: claims up to `batch_size` due rows for this worker.
    async fn lease_batch(&self) -> Result<Vec<Notification>> {
        let now = Utc::now();
        let lock_expiry = now + ChronoDuration::seconds(self.config.lock_ttl_secs);

        let ids: Vec<Uuid> = sqlx::query(
            r#"
            UPDATE notifications
            SET locked_by = $1, locked_at = $2, lock_expiry = $3
            WHERE notification_id IN (
                SELECT notification_id FROM notifications
                WHERE status IN ('pending', 'scheduled')
                  AND (locked_by IS NULL OR lock_expiry < $2)
                  AND (schedule_at IS NULL OR schedule_at <= $2)
                  AND (delivery->>'attempts')::int < $4
                ORDER BY created_at ASC
                LIMIT $5
                FOR UPDATE SKIP LOCKED
            )
            RETURNING notification_id
            "#,
        )
        .bind(&self.id)
        .bind(now)
        .bind(lock_expiry)
        .bind(self.config.max_retries)
        .bind(self.config.batch_size)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|row| row.get::<Uuid, _>("notification_id"))
        .collect();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(n) = self.load(id).await? {
                out.push(n);
            }
        }
        Ok(out)
    }

    async fn load(&self, notification_id: Uuid) -> Result<Option<Notification>> {
        crate::services::notification_service::NotificationService::new(self.db.clone())
            .find_by_id(notification_id)
            .await
    }

    async fn process_one(&self, mut notification: Notification) -> Result<()> {
        if !notification.urgent {
            let prefs = crate::services::preferences::PreferencesRepository::new(self.db.clone())
                .get_or_create(notification.user_id)
                .await?;
            let check = check_quiet_hours(&prefs.quiet_hours, Utc::now());
            if check.is_quiet {
                return self
                    .reschedule(
                        notification.notification_id,
                        check.next_available_at.unwrap_or_else(Utc::now),
                        NotificationStatus::Scheduled,
                    )
                    .await;
            }
        }

        let devices = crate::services::notification_service::NotificationService::new(self.db.clone())
            .load_active_devices(notification.user_id)
            .await?;

        if devices.is_empty() {
            return self.mark_failed_no_devices(notification.notification_id).await;
        }

        let mut by_platform: HashMap<Platform, Vec<Device>> = HashMap::new();
        for d in devices {
            by_platform.entry(d.platform).or_default().push(d);
        }

        let gateway_priority = notification.priority.as_gateway_scale();
        let mut device_states: Vec<DeviceDeliveryState> = Vec::new();
        let mut circuit_open = false;

        for (platform, platform_devices) in by_platform {
            let breaker = match platform {
                Platform::Android => &self.breakers.fcm,
                Platform::Ios => &self.breakers.apns,
            };

            for device in platform_devices {
                let device_id = device.device_id;
                let outcome = self
                    .dispatch_one(breaker, platform, &device, &notification, gateway_priority)
                    .await;

                match outcome {
                    DispatchOutcome::CircuitOpen => {
                        circuit_open = true;
                        device_states.push(DeviceDeliveryState {
                            device_id,
                            platform,
                            status: DeviceDeliveryStatus::Pending,
                            sent_at: None,
                            delivered_at: None,
                            error_message: Some("circuit-open".to_string()),
                            external_id: None,
                        });
                    }
                    DispatchOutcome::Sent { external_id } => {
                        self.apply_success(device).await;
                        device_states.push(DeviceDeliveryState {
                            device_id,
                            platform,
                            status: DeviceDeliveryStatus::Sent,
                            sent_at: Some(Utc::now()),
                            delivered_at: None,
                            error_message: None,
                            external_id,
                        });
                    }
                    DispatchOutcome::Failed { error, classification } => {
                        let mut device = device;
                        self.apply_failure(&mut device, classification).await;
                        device_states.push(DeviceDeliveryState {
                            device_id: device.device_id,
                            platform,
                            status: DeviceDeliveryStatus::Failed,
                            sent_at: None,
                            delivered_at: None,
                            error_message: Some(error),
                            external_id: None,
                        });
                    }
                }
            }
        }

        notification.delivery.devices = device_states;
        notification.delivery.attempts += 1;
        notification.delivery.last_attempt = Some(Utc::now());

        if circuit_open {
            // At least one device's gateway breaker is open; devices already
            // dispatched this tick (on the same or a different platform) keep
            // their recorded outcome, only the still-pending ones get retried.
            return self
                .persist_delivery(
                    &notification,
                    NotificationStatus::Pending,
                    Some(Utc::now() + ChronoDuration::seconds(CIRCUIT_OPEN_RESCHEDULE_SECS)),
                )
                .await;
        }

        let overall = notification.delivery.overall_status();
        self.commit_outcome(&notification, overall).await
    }

    async fn dispatch_one(
        &self,
        breaker: &CircuitBreaker,
        platform: Platform,
        device: &Device,
        notification: &Notification,
        gateway_priority: u8,
    ) -> DispatchOutcome {
        let call = async {
            match platform {
                Platform::Android => {
                    let client = match &self.fcm {
                        Some(c) => c,
                        None => return Err("fcm client not configured".to_string()),
                    };
                    client
                        .send(
                            &device.device_token,
                            &notification.title,
                            &notification.body,
                            notification.data.clone(),
                            gateway_priority,
                        )
                        .await
                        .map(|r| r.message_id)
                }
                Platform::Ios => {
                    let client = match &self.apns {
                        Some(c) => c,
                        None => return Err("apns client not configured".to_string()),
                    };
                    let priority = if gateway_priority >= 8 {
                        APNsPriority::High
                    } else {
                        APNsPriority::Low
                    };
                    client
                        .send(&device.device_token, &notification.title, &notification.body, priority)
                        .await
                        .map(|r| r.message_id)
                }
            }
        };

        match breaker.call(|| call).await {
            Ok(external_id) => DispatchOutcome::Sent {
                external_id: Some(external_id),
            },
            Err(CircuitBreakerError::Open) => DispatchOutcome::CircuitOpen,
            Err(CircuitBreakerError::CallFailed(err)) => {
                let classification = match platform {
                    Platform::Android => crate::services::token_lifecycle::classify_fcm(&err),
                    Platform::Ios => classify_apns_from_string(&err),
                };
                DispatchOutcome::Failed {
                    error: err,
                    classification,
                }
            }
        }
    }

    async fn apply_success(&self, device: Device) {
        let mut device = device;
        handle_delivery_success(&mut device, Utc::now());
        let _ = self.persist_device(&device).await;
    }

    async fn apply_failure(&self, device: &mut Device, classification: Classification) {
        handle_delivery_failure(device, classification);
        let _ = self.persist_device(device).await;
    }

    async fn persist_device(&self, device: &Device) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET failure_count = $1, last_failure = $2, is_active = $3,
                deactivated_at = $4, last_seen = $5
            WHERE device_id = $6
            "#,
        )
        .bind(device.failure_count)
        .bind(device.last_failure)
        .bind(device.is_active)
        .bind(device.deactivated_at)
        .bind(device.last_seen)
        .bind(device.device_id)
        .execute(&self.db)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn commit_outcome(&self, notification: &Notification, overall: NotificationStatus) -> Result<()> {
        let (next_status, schedule_at) = if overall == NotificationStatus::Failed
            && notification.delivery.attempts < self.config.max_retries
        {
            (NotificationStatus::Pending, Some(next_retry_at(notification.delivery.attempts)))
        } else {
            (overall, notification.schedule_at)
        };

        self.persist_delivery(notification, next_status, schedule_at).await
    }

    /// Writes `notification.delivery` alongside a caller-chosen status and
    /// `schedule_at`, and releases the lease. Shared by the normal
    /// post-dispatch commit and the circuit-open early-retry path so neither
    /// one can write a status/lease update without the per-device outcomes
    /// recorded so far.
    async fn persist_delivery(
        &self,
        notification: &Notification,
        status: NotificationStatus,
        schedule_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let delivery_json = serde_json::to_value(&notification.delivery)
            .map_err(|e| AppError::Internal(format!("serialize delivery: {e}")))?;

        sqlx::query(
            r#"
            UPDATE notifications
            SET delivery = $1, status = $2, schedule_at = $3,
                locked_by = NULL, locked_at = NULL, lock_expiry = NULL, updated_at = $4
            WHERE notification_id = $5
            "#,
        )
        .bind(&delivery_json)
        .bind(status.as_str())
        .bind(schedule_at)
        .bind(Utc::now())
        .bind(notification.notification_id)
        .execute(&self.db)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    /// Reschedules a notification before any per-device dispatch has
    /// happened this tick (quiet-hours deferral) — there is no `delivery`
    /// state to preserve yet.
    async fn reschedule(
        &self,
        notification_id: Uuid,
        schedule_at: DateTime<Utc>,
        status: NotificationStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, schedule_at = $2,
                locked_by = NULL, locked_at = NULL, lock_expiry = NULL, updated_at = $3
            WHERE notification_id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(schedule_at)
        .bind(Utc::now())
        .bind(notification_id)
        .execute(&self.db)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_failed_no_devices(&self, notification_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed',
                delivery = jsonb_set(delivery, '{attempts}', to_jsonb((delivery->>'attempts')::int + 1)),
                locked_by = NULL, locked_at = NULL, lock_expiry = NULL, updated_at = $1
            WHERE notification_id = $2
            "#,
        )
        .bind(Utc::now())
        .bind(notification_id)
        .execute(&self.db)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    /// On shutdown, clear every lease this worker holds so peers can reclaim
    /// it without waiting out the full `lockTtl`.
    pub async fn release_all_leases(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET locked_by = NULL, locked_at = NULL, lock_expiry = NULL
            WHERE locked_by = $1
            "#,
        )
        .bind(&self.id)
        .execute(&self.db)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected())
    }
}

enum DispatchOutcome {
    Sent { external_id: Option<String> },
    Failed { error: String, classification: Classification },
    CircuitOpen,
}

fn classify_apns_from_string(err: &str) -> Classification {
    // The adapter client formats a rejected APNs response as
    // "status=<code> reason=<reason>"; everything else (transport/config
    // failures) falls through to status 0 with no reason.
    let status = err
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("status=").and_then(|s| s.parse::<u16>().ok()))
        .unwrap_or(0);
    let reason = err
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("reason="))
        .filter(|r| *r != "unknown");
    crate::services::token_lifecycle::classify_apns(status, reason)
}

/// `base * 2^attempt` capped at 1h, ± 20% jitter.
fn next_retry_at(attempts: i32) -> DateTime<Utc> {
    let exp = BASE_RETRY_SECS.saturating_mul(1i64 << attempts.min(10));
    let capped = exp.min(MAX_RETRY_SECS);
    let jitter_frac = rand::thread_rng().gen_range(-0.2..0.2);
    let jittered = (capped as f64 * (1.0 + jitter_frac)).round() as i64;
    Utc::now() + ChronoDuration::seconds(jittered.max(1))
}

/// Runs the worker pool: spawns `pool_size` workers, each polling on its own
/// staggered offset of `pollInterval / workerCount` to spread lease contention.
pub async fn run_pool(
    db: PgPool,
    fcm: Option<Arc<FCMClient>>,
    apns: Option<Arc<APNsClient>>,
    breakers: Arc<GatewayBreakers>,
    config: WorkerConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let pool_size = config.pool_size.max(1);
    let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));
    let stagger = poll_interval / pool_size as u32;

    let mut handles = Vec::with_capacity(pool_size);
    for i in 0..pool_size {
        let worker = DeliveryWorker::new(db.clone(), fcm.clone(), apns.clone(), breakers.clone(), config.clone());
        let mut shutdown = shutdown.clone();
        let offset = stagger * i as u32;
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(offset).await;
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = worker.tick().await {
                            tracing::error!(worker = worker.id(), error = %e, "worker tick failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            if let Err(e) = worker.release_all_leases().await {
                tracing::error!(worker = worker.id(), error = %e, "failed to release leases on shutdown");
            }
        }));
    }

    shutdown.changed().await.ok();
    for h in handles {
        let _ = h.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_doubles_and_caps() {
        let t0 = next_retry_at(0);
        let t5 = next_retry_at(5);
        assert!(t5 > t0);
        // at attempt>=6 the exponent already saturates past the 1h cap
        let t_capped = next_retry_at(20);
        let now = Utc::now();
        assert!(t_capped - now <= ChronoDuration::seconds((MAX_RETRY_SECS as f64 * 1.21) as i64));
    }

    #[test]
    fn worker_identity_is_nonempty_and_unique_ish() {
        let a = worker_identity();
        let b = worker_identity();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
