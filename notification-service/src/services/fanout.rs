/// C8 Fanout Selector.
use nova_cache::{CacheKey, CacheOperations, NovaCache};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{GroupNotification, PushStrategy, TargetAudience};
use crate::services::stampede::{StampedeGuard, SwrOptions};

const TOPIC_PUSH_THRESHOLD_DEFAULT: i64 = 50_000;
const FOLLOWER_SERVICE_DEADLINE: Duration = Duration::from_secs(2);

pub struct FanoutSelector {
    cache: NovaCache,
    stampede: std::sync::Arc<StampedeGuard>,
    follower_service_base_url: Option<String>,
    high_reach_threshold: i64,
    topic_push_threshold: i64,
    fresh: Duration,
    stale: Duration,
}

impl FanoutSelector {
    pub fn new(
        cache: NovaCache,
        stampede: std::sync::Arc<StampedeGuard>,
        follower_service_base_url: Option<String>,
        high_reach_threshold: i64,
        topic_push_threshold: i64,
    ) -> Self {
        Self {
            cache,
            stampede,
            follower_service_base_url,
            high_reach_threshold,
            topic_push_threshold,
            fresh: Duration::from_secs(300),
            stale: Duration::from_secs(600),
        }
    }

    /// `shouldUseFanoutOnRead(actorUserId, followerCount?)`.
    pub async fn should_use_fanout_on_read(
        &self,
        actor_user_id: Uuid,
        follower_count: Option<i64>,
    ) -> bool {
        if let Some(count) = follower_count {
            return count >= self.high_reach_threshold;
        }

        let key = CacheKey::follower_count(actor_user_id);
        if let Ok(Some(count)) = self.cache.get::<i64>(&key).await {
            return count >= self.high_reach_threshold;
        }

        let base_url = match &self.follower_service_base_url {
            Some(url) => url.clone(),
            None => return false,
        };

        let opts = SwrOptions {
            fresh: self.fresh,
            stale: self.stale,
            use_durable_cache: true,
        };

        let result = self
            .stampede
            .get_or_set_with_swr(&key, &opts, move || {
                let base_url = base_url.clone();
                async move { fetch_follower_count(&base_url, actor_user_id).await }
            })
            .await;

        match result {
            Ok(count) => count >= self.high_reach_threshold,
            Err(e) => {
                // Failure defaults to false: safer to fanout-on-write small
                // than to silently drop notifications for a large audience.
                tracing::warn!(actor_user_id = %actor_user_id, error = %e, "follower count lookup failed");
                false
            }
        }
    }

    /// Decide `pushStrategy` for a broadcast event whose actor already
    /// crossed the fanout-on-read threshold.
    pub fn choose_push_strategy(
        &self,
        explicit: Option<PushStrategy>,
        estimated_reach: i64,
    ) -> PushStrategy {
        choose_push_strategy(explicit, estimated_reach, self.topic_push_threshold)
    }

    pub fn broadcast_topic_name(&self, actor_id: Uuid) -> String {
        broadcast_topic_name(actor_id)
    }

    pub fn build_group_notification(
        &self,
        event_id: Uuid,
        event_type: crate::models::GroupEventType,
        actor_id: Uuid,
        actor_follower_count: i64,
        title: String,
        body: String,
        data: Option<serde_json::Value>,
        priority: crate::models::NotificationPriority,
        action_url: Option<String>,
        image_url: Option<String>,
        target_audience: TargetAudience,
        explicit_strategy: Option<PushStrategy>,
        explicit_topic: Option<String>,
    ) -> GroupNotification {
        let estimated_reach = actor_follower_count;
        let push_strategy = self.choose_push_strategy(explicit_strategy, estimated_reach);
        let broadcast_topic = match push_strategy {
            PushStrategy::Topic => {
                Some(explicit_topic.unwrap_or_else(|| self.broadcast_topic_name(actor_id)))
            }
            _ => None,
        };

        GroupNotification {
            group_notification_id: Uuid::new_v4(),
            event_id,
            event_type,
            actor_user_id: actor_id,
            actor_follower_count,
            title,
            body,
            data,
            priority,
            action_url,
            image_url,
            target_audience,
            target_user_ids: Vec::new(),
            exclude_user_ids: Vec::new(),
            push_strategy,
            broadcast_topic,
            created_at: chrono::Utc::now(),
            expires_at: None,
            is_active: true,
            view_count: 0,
            click_count: 0,
            actual_reach: 0,
            estimated_reach,
        }
    }
}

fn broadcast_topic_name(actor_id: Uuid) -> String {
    format!("user_{}_followers", actor_id)
}

fn choose_push_strategy(
    explicit: Option<PushStrategy>,
    estimated_reach: i64,
    topic_push_threshold: i64,
) -> PushStrategy {
    if let Some(strategy) = explicit {
        return strategy;
    }
    if estimated_reach > topic_push_threshold {
        PushStrategy::Topic
    } else {
        PushStrategy::Individual
    }
}

async fn fetch_follower_count(base_url: &str, actor_user_id: Uuid) -> crate::error::Result<i64> {
    let client = reqwest::Client::builder()
        .timeout(FOLLOWER_SERVICE_DEADLINE)
        .build()
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

    let url = format!("{}/internal/users/{}/follower-count", base_url, actor_user_id);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| crate::error::AppError::Gateway(format!("follower service: {e}")))?;

    #[derive(serde::Deserialize)]
    struct FollowerCountResponse {
        count: i64,
    }

    let body: FollowerCountResponse = response
        .json()
        .await
        .map_err(|e| crate::error::AppError::Gateway(format!("follower service body: {e}")))?;

    Ok(body.count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_threshold_selects_topic_strategy() {
        assert_eq!(
            choose_push_strategy(None, 60_000, TOPIC_PUSH_THRESHOLD_DEFAULT),
            PushStrategy::Topic
        );
        assert_eq!(
            choose_push_strategy(None, 1_000, TOPIC_PUSH_THRESHOLD_DEFAULT),
            PushStrategy::Individual
        );
    }

    #[test]
    fn explicit_strategy_wins_over_threshold() {
        assert_eq!(
            choose_push_strategy(
                Some(PushStrategy::Individual),
                1_000_000,
                TOPIC_PUSH_THRESHOLD_DEFAULT
            ),
            PushStrategy::Individual
        );
    }

    #[test]
    fn broadcast_topic_name_is_stable_per_actor() {
        let actor = Uuid::new_v4();
        assert_eq!(broadcast_topic_name(actor), format!("user_{}_followers", actor));
    }
}
