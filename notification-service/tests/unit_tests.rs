/// Unit tests for the domain model: enum round-trips, the delivery-status
/// aggregation rule, and the preference-gate business logic.
use chrono::Utc;
use notification_service::models::*;
use uuid::Uuid;

#[test]
fn notification_category_parse_is_case_insensitive_and_falls_back_to_system() {
    assert_eq!(NotificationCategory::parse("Like"), NotificationCategory::Like);
    assert_eq!(NotificationCategory::parse("FOLLOW"), NotificationCategory::Follow);
    assert_eq!(NotificationCategory::parse("whatever"), NotificationCategory::System);
}

#[test]
fn notification_priority_ttl_matches_the_four_tiers() {
    assert_eq!(NotificationPriority::Critical.ttl(), chrono::Duration::hours(12));
    assert_eq!(NotificationPriority::High.ttl(), chrono::Duration::hours(24));
    assert_eq!(NotificationPriority::Normal.ttl(), chrono::Duration::hours(48));
    assert_eq!(NotificationPriority::Low.ttl(), chrono::Duration::hours(72));
}

#[test]
fn notification_priority_ordering_and_gateway_scale() {
    assert!(NotificationPriority::Low < NotificationPriority::Normal);
    assert!(NotificationPriority::Normal < NotificationPriority::High);
    assert!(NotificationPriority::High < NotificationPriority::Critical);
    assert_eq!(NotificationPriority::Critical.as_gateway_scale(), 10);
    assert_eq!(NotificationPriority::Low.as_gateway_scale(), 2);
}

#[test]
fn notification_status_round_trips_through_as_str_and_parse() {
    for status in [
        NotificationStatus::Pending,
        NotificationStatus::Scheduled,
        NotificationStatus::Sent,
        NotificationStatus::Delivered,
        NotificationStatus::Failed,
        NotificationStatus::Cancelled,
    ] {
        assert_eq!(NotificationStatus::parse(status.as_str()), status);
    }
}

fn device_state(status: DeviceDeliveryStatus) -> DeviceDeliveryState {
    DeviceDeliveryState {
        device_id: Uuid::new_v4(),
        platform: Platform::Android,
        status,
        sent_at: None,
        delivered_at: None,
        error_message: None,
        external_id: None,
    }
}

#[test]
fn delivery_overall_status_is_pending_with_no_devices() {
    let delivery = DeliveryState::default();
    assert_eq!(delivery.overall_status(), NotificationStatus::Pending);
}

#[test]
fn delivery_overall_status_is_delivered_only_if_every_device_delivered() {
    let delivery = DeliveryState {
        devices: vec![
            device_state(DeviceDeliveryStatus::Delivered),
            device_state(DeviceDeliveryStatus::Delivered),
        ],
        ..Default::default()
    };
    assert_eq!(delivery.overall_status(), NotificationStatus::Delivered);
}

#[test]
fn delivery_overall_status_is_failed_only_if_every_device_failed() {
    let delivery = DeliveryState {
        devices: vec![
            device_state(DeviceDeliveryStatus::Failed),
            device_state(DeviceDeliveryStatus::Failed),
        ],
        ..Default::default()
    };
    assert_eq!(delivery.overall_status(), NotificationStatus::Failed);
}

#[test]
fn delivery_overall_status_is_sent_on_a_mixed_outcome() {
    let delivery = DeliveryState {
        devices: vec![
            device_state(DeviceDeliveryStatus::Sent),
            device_state(DeviceDeliveryStatus::Failed),
        ],
        ..Default::default()
    };
    assert_eq!(delivery.overall_status(), NotificationStatus::Sent);
}

#[test]
fn delivery_overall_status_stays_pending_while_devices_are_still_pending() {
    let delivery = DeliveryState {
        devices: vec![device_state(DeviceDeliveryStatus::Pending)],
        ..Default::default()
    };
    assert_eq!(delivery.overall_status(), NotificationStatus::Pending);
}

#[test]
fn user_preferences_defaults_enable_every_category() {
    let prefs = UserPreferences::defaults(Uuid::new_v4());
    for category in NotificationCategory::all() {
        assert_eq!(prefs.notification_types.get(category.as_str()), Some(&true));
    }
    assert!(!prefs.quiet_hours.enabled);
}

#[test]
fn should_deliver_blocks_a_disabled_category() {
    let mut prefs = UserPreferences::defaults(Uuid::new_v4());
    prefs.notification_types.insert(NotificationCategory::Like.as_str().to_string(), false);

    let result = prefs.should_deliver(
        NotificationCategory::Like,
        NotificationPriority::Normal,
        "content-service",
        "New Like",
        "Someone liked your post",
    );

    assert!(!result.deliver);
    assert_eq!(result.reason.as_deref(), Some("category-disabled"));
}

#[test]
fn should_deliver_blocks_a_muted_source() {
    let mut prefs = UserPreferences::defaults(Uuid::new_v4());
    prefs.blocked.sources.push("spammy-service".to_string());

    let result = prefs.should_deliver(
        NotificationCategory::System,
        NotificationPriority::Normal,
        "spammy-service",
        "Heads up",
        "Some announcement",
    );

    assert!(!result.deliver);
    assert_eq!(result.reason.as_deref(), Some("blocked-source"));
}

#[test]
fn should_deliver_blocks_a_filtered_keyword_case_insensitively() {
    let mut prefs = UserPreferences::defaults(Uuid::new_v4());
    prefs.blocked.keywords.push("giveaway".to_string());

    let result = prefs.should_deliver(
        NotificationCategory::System,
        NotificationPriority::Normal,
        "content-service",
        "Big GIVEAWAY today",
        "enter now",
    );

    assert!(!result.deliver);
    assert_eq!(result.reason.as_deref(), Some("blocked-keyword"));
}

#[test]
fn should_deliver_allows_an_unfiltered_notification() {
    let prefs = UserPreferences::defaults(Uuid::new_v4());
    let result = prefs.should_deliver(
        NotificationCategory::Mention,
        NotificationPriority::High,
        "content-service",
        "You were mentioned",
        "hey @you",
    );
    assert!(result.deliver);
    assert!(result.reason.is_none());
}

#[test]
fn device_deactivates_at_the_fifth_consecutive_failure() {
    assert_eq!(Device::MAX_FAILURES_BEFORE_DEACTIVATE, 5);
}

#[test]
fn event_processed_outcome_serializes_notification_id_as_a_string() {
    let outcome = EventProcessedOutcome {
        original_event_id: Uuid::new_v4(),
        original_event_type: "like.created".to_string(),
        notification_id: Some("skipped-by-preference".to_string()),
        processed_at: Utc::now(),
        success: true,
        error: None,
        correlation_id: Uuid::new_v4().to_string(),
    };

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["notificationId"], "skipped-by-preference");
    assert_eq!(json["success"], true);
}
