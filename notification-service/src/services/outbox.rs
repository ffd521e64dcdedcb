/// C6 Outbox + Relay wiring. The storage and retry machinery live in
/// `transactional-outbox`; this module supplies the notification-service's
/// single-topic routing and the constructor that assembles the processor
/// from `Config`.
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use transactional_outbox::{
    metrics::OutboxMetrics, OutboxError, OutboxEvent, OutboxProcessor, OutboxPublisher,
    OutboxResult, SqlxOutboxRepository,
};

use crate::config::Config;

/// Every domain event this service emits (`user.followed`, `comment.created`,
/// `mention.created`, `like.created`, ...) routes to one topic — unlike the
/// shared library's default per-aggregate topic split.
pub struct NotificationEventsPublisher {
    producer: FutureProducer,
    topic: String,
}

impl NotificationEventsPublisher {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait::async_trait]
impl OutboxPublisher for NotificationEventsPublisher {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()> {
        let payload_str = serde_json::to_string(&event.payload)
            .map_err(|e| OutboxError::PublishFailed(format!("serialize payload: {e}")))?;
        let event_id_str = event.id.to_string();
        let aggregate_id_str = event.aggregate_id.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(event.event_type.as_bytes()),
            })
            .insert(Header {
                key: "event_id",
                value: Some(event_id_str.as_bytes()),
            })
            .insert(Header {
                key: "aggregate_id",
                value: Some(aggregate_id_str.as_bytes()),
            });

        let record = FutureRecord::to(&self.topic)
            .key(&aggregate_id_str)
            .payload(&payload_str)
            .headers(headers);

        self.producer
            .send(record, Duration::from_secs(30))
            .await
            .map_err(|(err, _)| OutboxError::PublishFailed(format!("kafka publish: {err}")))?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            topic = %self.topic,
            "outbox event published"
        );
        Ok(())
    }
}

pub fn build_processor(
    config: &Config,
    pool: sqlx::PgPool,
    producer: FutureProducer,
    metrics: OutboxMetrics,
) -> OutboxProcessor<SqlxOutboxRepository, NotificationEventsPublisher> {
    let repository = Arc::new(SqlxOutboxRepository::new(pool));
    let publisher = Arc::new(NotificationEventsPublisher::new(
        producer,
        config.broker.events_topic.clone(),
    ));

    OutboxProcessor::new_with_metrics(
        repository,
        publisher,
        metrics,
        100,
        Duration::from_secs(5),
        10,
    )
}

/// `eventType` → aggregate type, for the `OutboxEvent.aggregate_type` column.
/// All four producer-side event types in §6 share the `"notification"`
/// aggregate namespace since they all funnel into the one `notification.events`
/// topic.
pub fn aggregate_type_for_event(_event_type: &str) -> &'static str {
    "notification"
}
