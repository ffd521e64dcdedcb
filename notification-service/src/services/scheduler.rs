/// Scheduler / Retry / Archiver (C11). Three independent timer loops
/// sharing nothing but the pool: a once-a-minute expiry sweep for
/// `scheduled` rows (actual re-delivery of due `scheduled` rows happens
/// through the worker pool's own lease query, which already matches
/// `schedule_at <= now`), a 15-minute retry sweeper that returns stale
/// `failed` rows to the lease pool, and a daily archiver that copies aged
/// rows out of the live tables in bounded batches and also purges expired
/// `idempotency_records` (Postgres has no native TTL index, so this sweep
/// is the only thing bounding that table's growth).
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use idempotent_consumer::IdempotencyGuard;
use sqlx::{PgPool, Row};
use tokio::sync::watch;
use tokio::time::interval;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::models::NotificationStatus;

const SCHEDULED_DISPATCH_INTERVAL_SECS: u64 = 60;
const RETRY_SWEEP_INTERVAL_SECS: u64 = 900;
const ARCHIVE_INTERVAL_SECS: u64 = 86_400;
const ARCHIVE_BATCH_SIZE: i64 = 1_000;
const ARCHIVE_MAX_BATCHES: u32 = 100;
const ARCHIVE_MAX_RECORDS_PER_RUN: i64 = 100_000;

pub struct Scheduler {
    db: PgPool,
    config: WorkerConfig,
    dry_run_archive: bool,
    idempotency_guard: IdempotencyGuard,
}

impl Scheduler {
    pub fn new(
        db: PgPool,
        config: WorkerConfig,
        dry_run_archive: bool,
        idempotency_guard: IdempotencyGuard,
    ) -> Self {
        Self {
            db,
            config,
            dry_run_archive,
            idempotency_guard,
        }
    }

    /// Cancels `scheduled` rows whose `expires_at` has passed. Delivery of
    /// due-but-unexpired `scheduled` rows is the worker pool's job.
    pub async fn run_scheduled_dispatch(&self) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, updated_at = $2
            WHERE status = $3 AND expires_at < $2
            "#,
        )
        .bind(NotificationStatus::Cancelled.as_str())
        .bind(now)
        .bind(NotificationStatus::Scheduled.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Resets rows stuck in `failed` with retry budget left back to
    /// `pending` so the worker pool's lease query picks them up again.
    pub async fn run_retry_sweep(&self) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::minutes(15);
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, locked_by = NULL, locked_at = NULL, lock_expiry = NULL, updated_at = $2
            WHERE status = $3
              AND (delivery->>'attempts')::int < $4
              AND (delivery->>'lastAttempt')::timestamptz < $5
            "#,
        )
        .bind(NotificationStatus::Pending.as_str())
        .bind(Utc::now())
        .bind(NotificationStatus::Failed.as_str())
        .bind(self.config.max_retries)
        .bind(cutoff)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Moves rows older than `archive_after_days` out of the live
    /// `notifications`/`group_notifications` tables, `ARCHIVE_BATCH_SIZE`
    /// rows at a time, capped at `ARCHIVE_MAX_BATCHES` batches and
    /// `ARCHIVE_MAX_RECORDS_PER_RUN` rows total per call. In `dry_run`
    /// mode, counts what would move without writing anything.
    pub async fn run_archive(&self) -> Result<ArchiveReport> {
        let cutoff = Utc::now() - ChronoDuration::days(self.config.archive_after_days);
        let mut report = ArchiveReport::default();

        report.notifications_archived = self.archive_table(cutoff, "notifications").await?;
        report.group_notifications_archived = self.archive_group_table(cutoff).await?;
        report.idempotency_records_purged = if self.dry_run_archive {
            0
        } else {
            self.idempotency_guard
                .cleanup_old_events()
                .await
                .map_err(|e| crate::error::AppError::Internal(e.to_string()))?
        };

        Ok(report)
    }

    async fn archive_table(&self, cutoff: DateTime<Utc>, _table: &str) -> Result<i64> {
        let mut total = 0i64;
        for _ in 0..ARCHIVE_MAX_BATCHES {
            if total >= ARCHIVE_MAX_RECORDS_PER_RUN {
                break;
            }
            if self.dry_run_archive {
                let count: i64 = sqlx::query(
                    "SELECT COUNT(*) AS c FROM notifications WHERE created_at < $1 LIMIT $2",
                )
                .bind(cutoff)
                .bind(ARCHIVE_BATCH_SIZE)
                .fetch_one(&self.db)
                .await?
                .get("c");
                total += count;
                if count == 0 {
                    break;
                }
                continue;
            }

            let mut tx = self.db.begin().await?;
            let moved = sqlx::query(
                r#"
                WITH batch AS (
                    SELECT notification_id FROM notifications
                    WHERE created_at < $1
                    ORDER BY created_at ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                ),
                inserted AS (
                    INSERT INTO notifications_archive
                    SELECT n.*, now() FROM notifications n
                    JOIN batch USING (notification_id)
                    RETURNING notification_id
                )
                DELETE FROM notifications
                WHERE notification_id IN (SELECT notification_id FROM inserted)
                "#,
            )
            .bind(cutoff)
            .bind(ARCHIVE_BATCH_SIZE)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            tx.commit().await?;

            total += moved as i64;
            if moved == 0 {
                break;
            }
        }
        Ok(total)
    }

    async fn archive_group_table(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let mut total = 0i64;
        for _ in 0..ARCHIVE_MAX_BATCHES {
            if total >= ARCHIVE_MAX_RECORDS_PER_RUN {
                break;
            }
            if self.dry_run_archive {
                let count: i64 = sqlx::query(
                    "SELECT COUNT(*) AS c FROM group_notifications WHERE created_at < $1 LIMIT $2",
                )
                .bind(cutoff)
                .bind(ARCHIVE_BATCH_SIZE)
                .fetch_one(&self.db)
                .await?
                .get("c");
                total += count;
                if count == 0 {
                    break;
                }
                continue;
            }

            let mut tx = self.db.begin().await?;
            let moved = sqlx::query(
                r#"
                WITH batch AS (
                    SELECT group_notification_id FROM group_notifications
                    WHERE created_at < $1
                    ORDER BY created_at ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                ),
                inserted AS (
                    INSERT INTO group_notifications_archive
                    SELECT g.*, now() FROM group_notifications g
                    JOIN batch USING (group_notification_id)
                    RETURNING group_notification_id
                )
                DELETE FROM group_notifications
                WHERE group_notification_id IN (SELECT group_notification_id FROM inserted)
                "#,
            )
            .bind(cutoff)
            .bind(ARCHIVE_BATCH_SIZE)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            tx.commit().await?;

            total += moved as i64;
            if moved == 0 {
                break;
            }
        }
        Ok(total)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveReport {
    pub notifications_archived: i64,
    pub group_notifications_archived: i64,
    pub idempotency_records_purged: u64,
}

/// Runs the three loops concurrently until `shutdown` fires.
pub async fn run_scheduler(
    db: PgPool,
    config: WorkerConfig,
    dry_run_archive: bool,
    idempotency_guard: IdempotencyGuard,
    mut shutdown: watch::Receiver<bool>,
) {
    let scheduler = std::sync::Arc::new(Scheduler::new(db, config, dry_run_archive, idempotency_guard));

    let dispatch_task = {
        let scheduler = scheduler.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(SCHEDULED_DISPATCH_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_scheduled_dispatch().await {
                            Ok(n) if n > 0 => tracing::info!(cancelled = n, "scheduled-dispatch: cancelled expired rows"),
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "scheduled-dispatch failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    let retry_task = {
        let scheduler = scheduler.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(RETRY_SWEEP_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_retry_sweep().await {
                            Ok(n) if n > 0 => tracing::info!(requeued = n, "retry-sweep: requeued stale failures"),
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "retry-sweep failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    let archive_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(ARCHIVE_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_archive().await {
                            Ok(report) => tracing::info!(
                                notifications = report.notifications_archived,
                                groups = report.group_notifications_archived,
                                idempotency_records_purged = report.idempotency_records_purged,
                                "archiver run complete"
                            ),
                            Err(e) => tracing::error!(error = %e, "archiver run failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    let _ = tokio::join!(dispatch_task, retry_task, archive_task);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_report_defaults_to_zero() {
        let report = ArchiveReport::default();
        assert_eq!(report.notifications_archived, 0);
        assert_eq!(report.group_notifications_archived, 0);
        assert_eq!(report.idempotency_records_purged, 0);
    }

    #[test]
    fn batch_caps_are_consistent() {
        assert!(ARCHIVE_MAX_RECORDS_PER_RUN >= ARCHIVE_BATCH_SIZE * (ARCHIVE_MAX_BATCHES as i64 - 1));
    }
}
