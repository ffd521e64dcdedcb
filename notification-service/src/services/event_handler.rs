/// Event Handler (C7). Per-message pipeline over the `notification.events`
/// topic: decode, validate, dedup via C1, gate on preferences, derive a
/// recipient, fan out via C8, and materialize a Notification (or
/// GroupNotification) row. Replaces the old batched `kafka_consumer`.
use chrono::Utc;
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, EventError};
use crate::models::{
    CommentCreatedPayload, CreateNotificationRequest, InboundEnvelope, LikeCreatedPayload,
    MentionCreatedPayload, NotificationCategory, NotificationPriority, UserFollowedPayload,
};
use crate::services::fanout::FanoutSelector;
use crate::services::idempotency::IdempotencyStore;
use crate::services::notification_service::NotificationService;
use crate::services::preferences::PreferencesRepository;
use transactional_outbox::{OutboxEvent, OutboxRepository, SqlxOutboxRepository};

pub struct EventHandler {
    db: PgPool,
    notifications: NotificationService,
    preferences: PreferencesRepository,
    idempotency: IdempotencyStore,
    fanout: FanoutSelector,
    outbox: SqlxOutboxRepository,
}

/// Outcome of processing one message, telling the broker consumer loop
/// whether to ack, nack-with-requeue, or nack-without-requeue (DLQ).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ack,
    NackRequeue,
    NackDrop,
}

/// What `handle_personal`/`handle_broadcast` actually did, so `process` can
/// tell `publish_processed` whether to carry a real notification id or the
/// `skipped-by-preference` sentinel.
enum HandleOutcome {
    Delivered(Option<Uuid>),
    SkippedByPreference,
}

struct Derived {
    recipient: Uuid,
    category: NotificationCategory,
    priority: NotificationPriority,
    title: String,
    body: String,
    action_url: Option<String>,
    data: Option<Json>,
    resource_id: String,
    source: &'static str,
}

impl EventHandler {
    pub fn new(
        db: PgPool,
        notifications: NotificationService,
        preferences: PreferencesRepository,
        idempotency: IdempotencyStore,
        fanout: FanoutSelector,
    ) -> Self {
        let outbox = SqlxOutboxRepository::new(db.clone());
        Self {
            db,
            notifications,
            preferences,
            idempotency,
            fanout,
            outbox,
        }
    }

    /// Process one decoded broker message. Never panics; every failure mode
    /// resolves to an `Ack` variant so the consumer loop has a total function
    /// from "message in" to "broker action".
    pub async fn handle(&self, raw: &[u8]) -> Ack {
        let envelope: InboundEnvelope = match serde_json::from_slice(raw) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "malformed event payload, dropping");
                return Ack::NackDrop;
            }
        };

        match self.process(&envelope).await {
            Ok(()) => Ack::Ack,
            Err(EventError::Malformed(reason)) => {
                tracing::warn!(event_id = %envelope.event_id, reason, "schema validation failed, dropping");
                Ack::NackDrop
            }
            Err(EventError::Terminal(reason)) => {
                tracing::error!(event_id = %envelope.event_id, reason, "terminal failure, dropping");
                Ack::NackDrop
            }
            Err(EventError::Transient(reason)) => {
                tracing::warn!(event_id = %envelope.event_id, reason, "transient failure, requeuing");
                Ack::NackRequeue
            }
        }
    }

    async fn process(&self, envelope: &InboundEnvelope) -> Result<(), EventError> {
        let idempotency_key = format!("event:{}:{}", envelope.event_type, envelope.event_id);
        if self
            .idempotency
            .is_seen(&idempotency_key)
            .await
            .map_err(EventError::from)?
        {
            return Ok(());
        }

        let broadcast_types = [
            "PostCreated",
            "LiveStreamStarted",
            "StoryPosted",
            "AnnouncementMade",
        ];

        let outcome = if broadcast_types.contains(&envelope.event_type.as_str()) {
            self.handle_broadcast(envelope).await.map(|_| HandleOutcome::Delivered(None))
        } else {
            self.handle_personal(envelope).await
        };

        match &outcome {
            Ok(HandleOutcome::Delivered(notification_id)) => {
                self.idempotency
                    .mark_seen(&idempotency_key)
                    .await
                    .map_err(EventError::from)?;
                self.publish_processed(envelope, true, None, notification_id.map(|id| id.to_string()))
                    .await;
            }
            Ok(HandleOutcome::SkippedByPreference) => {
                self.idempotency
                    .mark_seen(&idempotency_key)
                    .await
                    .map_err(EventError::from)?;
                self.publish_processed(envelope, true, None, Some("skipped-by-preference".to_string()))
                    .await;
            }
            Err(EventError::Terminal(reason)) | Err(EventError::Malformed(reason)) => {
                // Terminal failures still count as "handled": mark processed
                // so the DLQ'd event is never retried from scratch.
                self.idempotency
                    .mark_seen(&idempotency_key)
                    .await
                    .map_err(EventError::from)?;
                self.publish_processed(envelope, false, Some(reason.clone()), None)
                    .await;
            }
            Err(EventError::Transient(_)) => {}
        }

        outcome.map(|_| ())
    }

    async fn handle_personal(&self, envelope: &InboundEnvelope) -> Result<HandleOutcome, EventError> {
        let derived = derive_recipient(envelope)?;

        let prefs = self
            .preferences
            .get_or_create(derived.recipient)
            .await
            .map_err(EventError::from)?;

        let check = prefs.should_deliver(
            derived.category,
            derived.priority,
            derived.source,
            &derived.title,
            &derived.body,
        );
        if !check.deliver {
            tracing::info!(
                event_id = %envelope.event_id,
                reason = ?check.reason,
                "notification skipped by preference"
            );
            return Ok(HandleOutcome::SkippedByPreference);
        }

        let req = CreateNotificationRequest {
            user_id: derived.recipient,
            title: derived.title,
            body: derived.body,
            data: derived.data,
            image_url: None,
            category: derived.category,
            priority: derived.priority,
            urgent: false,
            source: derived.source.to_string(),
            resource_id: Some(derived.resource_id),
            schedule_at: None,
            timezone: None,
            metadata: Some(serde_json::json!({ "action_url": derived.action_url })),
        };

        let notification = self
            .notifications
            .send(req)
            .await
            .map_err(EventError::from)?;

        Ok(HandleOutcome::Delivered(Some(notification.notification_id)))
    }

    async fn handle_broadcast(&self, envelope: &InboundEnvelope) -> Result<(), EventError> {
        #[derive(serde::Deserialize)]
        struct Payload {
            actor_id: Uuid,
            title: String,
            body: String,
            #[serde(default)]
            data: Option<Json>,
            #[serde(default)]
            target_audience: Option<crate::models::TargetAudience>,
            #[serde(default)]
            push_strategy: Option<crate::models::PushStrategy>,
            #[serde(default)]
            topic: Option<String>,
            #[serde(default)]
            estimated_reach: Option<i64>,
        }

        let payload: Payload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| EventError::Malformed(e.to_string()))?;
        let event_type = crate::models::GroupEventType::parse(&envelope.event_type)
            .ok_or_else(|| EventError::Malformed(format!("unknown broadcast type {}", envelope.event_type)))?;

        let follower_count = payload.estimated_reach.unwrap_or(0);
        // These event types only arrive for actors already routed through the
        // high-follower broadcast path; the fanout check just confirms the
        // threshold and picks topic vs. individual push strategy below.
        self.fanout
            .should_use_fanout_on_read(payload.actor_id, Some(follower_count))
            .await;

        let group = self.fanout.build_group_notification(
            envelope.event_id,
            event_type,
            payload.actor_id,
            follower_count,
            payload.title,
            payload.body,
            payload.data,
            NotificationPriority::Normal,
            None,
            None,
            payload.target_audience.unwrap_or(crate::models::TargetAudience::Followers),
            payload.push_strategy,
            payload.topic,
        );

        insert_group_notification(&self.db, &group)
            .await
            .map_err(EventError::from)?;

        if group.push_strategy == crate::models::PushStrategy::Topic {
            tracing::info!(
                topic = ?group.broadcast_topic,
                group_notification_id = %group.group_notification_id,
                "topic push dispatched for broadcast event"
            );
        }

        Ok(())
    }

    async fn publish_processed(
        &self,
        envelope: &InboundEnvelope,
        success: bool,
        error: Option<String>,
        notification_id: Option<String>,
    ) {
        let outcome = crate::models::EventProcessedOutcome {
            original_event_id: envelope.event_id,
            original_event_type: envelope.event_type.clone(),
            notification_id,
            processed_at: Utc::now(),
            success,
            error,
            correlation_id: Uuid::new_v4().to_string(),
        };

        let payload = match serde_json::to_value(&outcome) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize processed outcome");
                return;
            }
        };

        let event = OutboxEvent {
            id: Uuid::new_v4(),
            aggregate_type: "notification".to_string(),
            aggregate_id: envelope.event_id,
            event_type: "notification.event.processed".to_string(),
            payload,
            metadata: None,
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
            last_error: None,
        };

        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "failed to open transaction for processed ack");
                return;
            }
        };
        if let Err(e) = self.outbox.insert(&mut tx, &event).await {
            tracing::error!(error = %e, "failed to enqueue processed ack");
            return;
        }
        if let Err(e) = tx.commit().await {
            tracing::error!(error = %e, "failed to commit processed ack");
        }
    }
}

fn derive_recipient(envelope: &InboundEnvelope) -> Result<Derived, EventError> {
    match envelope.event_type.as_str() {
        "user.followed" => {
            let p: UserFollowedPayload = serde_json::from_value(envelope.payload.clone())
                .map_err(|e| EventError::Malformed(e.to_string()))?;
            Ok(Derived {
                recipient: p.followee_id,
                category: NotificationCategory::Social,
                priority: NotificationPriority::Normal,
                title: "New Follower".to_string(),
                body: "Someone started following you!".to_string(),
                action_url: p.action_url,
                data: None,
                resource_id: p.follower_id.to_string(),
                source: "user-service",
            })
        }
        "comment.created" => {
            let p: CommentCreatedPayload = serde_json::from_value(envelope.payload.clone())
                .map_err(|e| EventError::Malformed(e.to_string()))?;
            Ok(Derived {
                recipient: p.post_owner_id,
                category: NotificationCategory::Comment,
                priority: NotificationPriority::Normal,
                title: "New Comment".to_string(),
                body: p.comment_text,
                action_url: p.action_url,
                data: None,
                resource_id: p.post_id.to_string(),
                source: "content-service",
            })
        }
        "mention.created" => {
            let p: MentionCreatedPayload = serde_json::from_value(envelope.payload.clone())
                .map_err(|e| EventError::Malformed(e.to_string()))?;
            Ok(Derived {
                recipient: p.mentioned_user_id,
                category: NotificationCategory::Mention,
                priority: NotificationPriority::High,
                title: "You were mentioned".to_string(),
                body: p.mention_text,
                action_url: p.action_url,
                data: None,
                resource_id: p.context_id.to_string(),
                source: "content-service",
            })
        }
        "like.created" => {
            let p: LikeCreatedPayload = serde_json::from_value(envelope.payload.clone())
                .map_err(|e| EventError::Malformed(e.to_string()))?;
            Ok(Derived {
                recipient: p.target_owner_id,
                category: NotificationCategory::Like,
                priority: NotificationPriority::Normal,
                title: "New Like".to_string(),
                body: "Someone liked your content".to_string(),
                action_url: p.action_url,
                data: None,
                resource_id: format!("{}-{}", p.liker_id, p.target_id),
                source: "content-service",
            })
        }
        other => Err(EventError::Malformed(format!("unknown event type {other}"))),
    }
}

async fn insert_group_notification(
    db: &PgPool,
    group: &crate::models::GroupNotification,
) -> crate::error::Result<()> {
    let target_user_ids: Vec<Uuid> = group.target_user_ids.clone();
    let exclude_user_ids: Vec<Uuid> = group.exclude_user_ids.clone();

    sqlx::query(
        r#"
        INSERT INTO group_notifications (
            group_notification_id, event_id, event_type, actor_user_id,
            actor_follower_count, title, body, data, priority, action_url,
            image_url, target_audience, target_user_ids, exclude_user_ids,
            push_strategy, broadcast_topic, created_at, expires_at, is_active,
            view_count, click_count, actual_reach, estimated_reach
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
            $15, $16, $17, $18, $19, $20, $21, $22, $23
        )
        "#,
    )
    .bind(group.group_notification_id)
    .bind(group.event_id)
    .bind(group.event_type.as_str())
    .bind(group.actor_user_id)
    .bind(group.actor_follower_count)
    .bind(&group.title)
    .bind(&group.body)
    .bind(&group.data)
    .bind(group.priority.as_str())
    .bind(&group.action_url)
    .bind(&group.image_url)
    .bind(group.target_audience.as_str())
    .bind(&target_user_ids)
    .bind(&exclude_user_ids)
    .bind(group.push_strategy.as_str())
    .bind(&group.broadcast_topic)
    .bind(group.created_at)
    .bind(group.expires_at)
    .bind(group.is_active)
    .bind(group.view_count)
    .bind(group.click_count)
    .bind(group.actual_reach)
    .bind(group.estimated_reach)
    .execute(db)
    .await
    .map_err(AppError::from)?;

    Ok(())
}

/// Drives the `notification.events` topic into `EventHandler::handle`. One
/// message at a time, manual offset commit gated on the `Ack` the handler
/// returns: `Ack` and `NackDrop` both advance the offset (a dropped message
/// is logged and not retried), `NackRequeue` leaves the offset alone so the
/// next poll redelivers it.
pub async fn run_consumer(
    broker: String,
    topic: String,
    group_id: String,
    handler: std::sync::Arc<EventHandler>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let broker = broker.as_str();
    let topic = topic.as_str();
    let group_id = group_id.as_str();
    use rdkafka::config::ClientConfig;
    use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
    use rdkafka::message::Message;

    let consumer: StreamConsumer = match ClientConfig::new()
        .set("bootstrap.servers", broker)
        .set("group.id", group_id)
        .set("auto.offset.reset", "latest")
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", "30000")
        .set("heartbeat.interval.ms", "10000")
        .create()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to create event consumer, not starting");
            return;
        }
    };

    if let Err(e) = consumer.subscribe(&[topic]) {
        tracing::error!(error = %e, topic, "failed to subscribe to events topic, not starting");
        return;
    }

    tracing::info!(topic, group_id, "event consumer subscribed");

    loop {
        tokio::select! {
            msg = consumer.recv() => {
                match msg {
                    Ok(m) => {
                        let Some(payload) = m.payload() else {
                            if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                                tracing::warn!(error = %e, "failed to commit offset for empty message");
                            }
                            continue;
                        };

                        match handler.handle(payload).await {
                            Ack::Ack | Ack::NackDrop => {
                                if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                                    tracing::warn!(error = %e, "failed to commit offset");
                                }
                            }
                            Ack::NackRequeue => {
                                tracing::warn!("leaving offset uncommitted, message will be redelivered");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "event consumer recv error");
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("event consumer shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InboundEnvelope;

    fn envelope(event_type: &str, payload: Json) -> InboundEnvelope {
        InboundEnvelope {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            version: "v1".to_string(),
            payload,
        }
    }

    #[test]
    fn derives_social_recipient_for_user_followed() {
        let follower = Uuid::new_v4();
        let followee = Uuid::new_v4();
        let e = envelope(
            "user.followed",
            serde_json::json!({
                "follower_id": follower,
                "followee_id": followee,
                "action_url": null,
            }),
        );
        let derived = derive_recipient(&e).unwrap();
        assert_eq!(derived.recipient, followee);
        assert_eq!(derived.category, NotificationCategory::Social);
        assert_eq!(derived.resource_id, follower.to_string());
    }

    #[test]
    fn mention_created_gets_high_priority() {
        let e = envelope(
            "mention.created",
            serde_json::json!({
                "mentioner_id": Uuid::new_v4(),
                "mentioned_user_id": Uuid::new_v4(),
                "context_type": "post",
                "context_id": Uuid::new_v4(),
                "mention_text": "hey @you",
                "action_url": null,
            }),
        );
        let derived = derive_recipient(&e).unwrap();
        assert_eq!(derived.priority, NotificationPriority::High);
    }

    #[test]
    fn unknown_event_type_is_malformed() {
        let e = envelope("totally.unknown", serde_json::json!({}));
        assert!(matches!(derive_recipient(&e), Err(EventError::Malformed(_))));
    }
}
