/// Domain data model for the notification service.
///
/// Backed by PostgreSQL (see migrations/0001_init.sql). Enum-shaped fields are
/// stored as TEXT and converted at the boundary rather than via sqlx derive,
/// matching how the rest of this codebase talks to the database.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Preference-key / notification category. Resolved to the superset
/// `{follow, like, comment, mention, message, social, system}` so every
/// category C7 and the broadcast path can materialize is independently
/// toggleable in preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Follow,
    Like,
    Comment,
    Mention,
    Message,
    Social,
    System,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Mention => "mention",
            Self::Message => "message",
            Self::Social => "social",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "follow" => Self::Follow,
            "like" => Self::Like,
            "comment" => Self::Comment,
            "mention" => Self::Mention,
            "message" => Self::Message,
            "social" => Self::Social,
            _ => Self::System,
        }
    }

    pub fn all() -> [Self; 7] {
        [
            Self::Follow,
            Self::Like,
            Self::Comment,
            Self::Mention,
            Self::Message,
            Self::Social,
            Self::System,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Normal,
        }
    }

    /// TTL derived from priority, per §3: 12h/24h/48h/72h.
    pub fn ttl(&self) -> chrono::Duration {
        match self {
            Self::Critical => chrono::Duration::hours(12),
            Self::High => chrono::Duration::hours(24),
            Self::Normal => chrono::Duration::hours(48),
            Self::Low => chrono::Duration::hours(72),
        }
    }

    /// 1-10 scale used by the gateway clients (APNs priority mapping, FCM android priority).
    pub fn as_gateway_scale(&self) -> u8 {
        match self {
            Self::Critical => 10,
            Self::High => 8,
            Self::Normal => 5,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Scheduled,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ios" => Self::Ios,
            _ => Self::Android,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl DeviceDeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// Per-device outcome inside `Notification.delivery.devices[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDeliveryState {
    pub device_id: Uuid,
    pub platform: Platform,
    pub status: DeviceDeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryState {
    pub attempts: i32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub devices: Vec<DeviceDeliveryState>,
}

impl DeliveryState {
    /// Overall status derived from the multiset of device statuses (§3 invariant).
    /// `delivered` iff all delivered, `sent` iff at least one sent/delivered and
    /// not all delivered, `failed` iff all failed.
    pub fn overall_status(&self) -> NotificationStatus {
        if self.devices.is_empty() {
            return NotificationStatus::Pending;
        }
        let total = self.devices.len();
        let delivered = self
            .devices
            .iter()
            .filter(|d| d.status == DeviceDeliveryStatus::Delivered)
            .count();
        let failed = self
            .devices
            .iter()
            .filter(|d| d.status == DeviceDeliveryStatus::Failed)
            .count();
        let sent_or_delivered = self
            .devices
            .iter()
            .filter(|d| {
                matches!(
                    d.status,
                    DeviceDeliveryStatus::Sent | DeviceDeliveryStatus::Delivered
                )
            })
            .count();

        if delivered == total {
            NotificationStatus::Delivered
        } else if failed == total {
            NotificationStatus::Failed
        } else if sent_or_delivered > 0 {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Opened,
    Clicked,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub timestamp: DateTime<Utc>,
    pub device_id: Option<Uuid>,
    pub metadata: Option<Json>,
}

/// Personal notification (fanout-on-write). Maps to the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Option<Json>,
    pub image_url: Option<String>,
    pub icon_url: Option<String>,
    pub category: NotificationCategory,
    pub priority: NotificationPriority,
    pub tags: Vec<String>,
    pub urgent: bool,
    pub schedule_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub status: NotificationStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expiry: Option<DateTime<Utc>>,
    pub delivery: DeliveryState,
    pub interactions: Vec<Interaction>,
    pub source: String,
    pub campaign: Option<String>,
    pub metadata: Option<Json>,
    pub resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to materialize a personal notification (C7 step 7).
#[derive(Debug, Clone)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Option<Json>,
    pub image_url: Option<String>,
    pub category: NotificationCategory,
    pub priority: NotificationPriority,
    pub urgent: bool,
    pub source: String,
    pub resource_id: Option<String>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub metadata: Option<Json>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GroupEventType {
    PostCreated,
    LiveStreamStarted,
    StoryPosted,
    AnnouncementMade,
}

impl GroupEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostCreated => "PostCreated",
            Self::LiveStreamStarted => "LiveStreamStarted",
            Self::StoryPosted => "StoryPosted",
            Self::AnnouncementMade => "AnnouncementMade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PostCreated" => Some(Self::PostCreated),
            "LiveStreamStarted" => Some(Self::LiveStreamStarted),
            "StoryPosted" => Some(Self::StoryPosted),
            "AnnouncementMade" => Some(Self::AnnouncementMade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetAudience {
    Followers,
    Subscribers,
    Custom,
}

impl TargetAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::Subscribers => "subscribers",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStrategy {
    None,
    Topic,
    Individual,
}

impl PushStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Topic => "topic",
            Self::Individual => "individual",
        }
    }
}

/// Fanout-on-read broadcast record. Maps to the `group_notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupNotification {
    pub group_notification_id: Uuid,
    pub event_id: Uuid,
    pub event_type: GroupEventType,
    pub actor_user_id: Uuid,
    pub actor_follower_count: i64,
    pub title: String,
    pub body: String,
    pub data: Option<Json>,
    pub priority: NotificationPriority,
    pub action_url: Option<String>,
    pub image_url: Option<String>,
    pub target_audience: TargetAudience,
    pub target_user_ids: Vec<Uuid>,
    pub exclude_user_ids: Vec<Uuid>,
    pub push_strategy: PushStrategy,
    pub broadcast_topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub view_count: i64,
    pub click_count: i64,
    pub actual_reach: i64,
    pub estimated_reach: i64,
}

/// Device registration. Maps to the `devices` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub platform: Platform,
    pub device_token: String,
    pub fcm_token: Option<String>,
    pub app_version: Option<String>,
    pub device_info: Option<Json>,
    pub push_enabled: bool,
    pub push_sound: bool,
    pub push_badge: bool,
    pub push_alert: bool,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub registration_date: DateTime<Utc>,
    pub failure_count: i32,
    pub last_failure: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: Option<Json>,
}

impl Device {
    /// §3 invariant: `failureCount >= 5 => isActive = false`.
    pub const MAX_FAILURES_BEFORE_DEACTIVATE: i32 = 5;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start: String,    // "HH:MM"
    pub end: String,      // "HH:MM"
    pub timezone: String, // IANA
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlockedFilters {
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
    pub senders: Vec<Uuid>,
}

/// Per-user delivery policy. Maps to the `user_preferences` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub notification_types: std::collections::HashMap<String, bool>,
    pub quiet_hours: QuietHoursConfig,
    pub blocked: BlockedFilters,
    pub max_daily_notifications: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    pub fn defaults(user_id: Uuid) -> Self {
        let now = Utc::now();
        let mut notification_types = std::collections::HashMap::new();
        for category in NotificationCategory::all() {
            notification_types.insert(category.as_str().to_string(), true);
        }
        Self {
            user_id,
            notification_types,
            quiet_hours: QuietHoursConfig::default(),
            blocked: BlockedFilters::default(),
            max_daily_notifications: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `shouldDeliver(category, priority, source, {title, body})` from §4's UserPreferences
    /// contract. `critical` bypasses quiet hours (quiet-hours enforcement itself lives in C4;
    /// this only covers the category/source/keyword gates).
    pub fn should_deliver(
        &self,
        category: NotificationCategory,
        _priority: NotificationPriority,
        source: &str,
        title: &str,
        body: &str,
    ) -> ShouldDeliverResult {
        if !self
            .notification_types
            .get(category.as_str())
            .copied()
            .unwrap_or(true)
        {
            return ShouldDeliverResult::blocked("category-disabled");
        }
        if self.blocked.sources.iter().any(|s| s == source) {
            return ShouldDeliverResult::blocked("blocked-source");
        }
        let haystack = format!("{title} {body}").to_lowercase();
        if self
            .blocked
            .keywords
            .iter()
            .any(|kw| haystack.contains(&kw.to_lowercase()))
        {
            return ShouldDeliverResult::blocked("blocked-keyword");
        }
        ShouldDeliverResult {
            deliver: true,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShouldDeliverResult {
    pub deliver: bool,
    pub reason: Option<String>,
}

impl ShouldDeliverResult {
    fn blocked(reason: &str) -> Self {
        Self {
            deliver: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// DeliveryLog row — per-device delivery tracking independent of the
/// notification's own `delivery.devices[]` embedded copy, indexed for the
/// retry sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub notification_id: Uuid,
    pub device_id: Uuid,
    pub status: DeviceDeliveryStatus,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Legacy broker-level de-dup record, kept alongside C1's idempotency_records
/// for the Redis-backed fast path (`RedisDeduplicator`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

/// Envelope common to every inbound event (§6). `payload` is discriminated
/// by `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(flatten)]
    pub payload: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFollowedPayload {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentCreatedPayload {
    pub commenter_id: Uuid,
    pub post_id: Uuid,
    pub post_owner_id: Uuid,
    pub comment_text: String,
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionContextType {
    Comment,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionCreatedPayload {
    pub mentioner_id: Uuid,
    pub mentioned_user_id: Uuid,
    pub context_type: MentionContextType,
    pub context_id: Uuid,
    pub mention_text: String,
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTargetType {
    Post,
    Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeCreatedPayload {
    pub liker_id: Uuid,
    pub target_owner_id: Uuid,
    pub target_type: LikeTargetType,
    pub target_id: Uuid,
    pub action_url: Option<String>,
}

/// High-follower broadcast payload shared by `PostCreated`, `LiveStreamStarted`,
/// `StoryPosted`, `AnnouncementMade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEventPayload {
    pub actor_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Option<Json>,
    pub target_audience: Option<TargetAudience>,
    pub push_strategy: Option<PushStrategy>,
    pub topic: Option<String>,
    pub estimated_reach: Option<i64>,
}

/// Outbound `notification.event.processed` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProcessedOutcome {
    pub original_event_id: Uuid,
    pub original_event_type: String,
    pub notification_id: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub correlation_id: String,
}
