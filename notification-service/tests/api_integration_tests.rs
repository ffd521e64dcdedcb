/// Wire-format tests for the HTTP handler DTOs: request bodies decode from
/// the camelCase JSON clients actually send, response bodies encode the
/// shape documented for each route.
use notification_service::handlers::devices::{RegisterDeviceRequest, RegisterDeviceResponse};
use notification_service::handlers::notifications::{
    MarkReadResponse, ReadBatchRequest, ReadBatchResponse,
};
use notification_service::handlers::preferences::{
    BulkUpdatePreferencesRequest, UpdatePreferencesRequest,
};
use notification_service::models::QuietHoursConfig;
use serde_json::json;
use uuid::Uuid;

#[test]
fn register_device_request_decodes_camel_case_body() {
    let user_id = Uuid::new_v4();
    let payload = json!({
        "userId": user_id,
        "deviceId": "device-abc",
        "platform": "ios",
        "fcmToken": null,
    });

    let req: RegisterDeviceRequest = serde_json::from_value(payload).unwrap();
    assert_eq!(req.user_id, user_id);
    assert_eq!(req.device_id, "device-abc");
    assert_eq!(req.platform, "ios");
    assert!(req.fcm_token.is_none());
}

#[test]
fn register_device_response_encodes_camel_case() {
    let response = RegisterDeviceResponse {
        device_id: Uuid::new_v4(),
        unread_count: 3,
        success: true,
    };

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["unreadCount"], 3);
    assert_eq!(json["success"], true);
    assert!(json.get("unread_count").is_none());
}

#[test]
fn update_preferences_request_allows_every_field_to_be_absent() {
    let req: UpdatePreferencesRequest = serde_json::from_value(json!({})).unwrap();
    assert!(req.notification_type.is_none());
    assert!(req.is_enabled.is_none());
    assert!(req.quiet_hours.is_none());
}

#[test]
fn update_preferences_request_decodes_a_partial_quiet_hours_update() {
    let payload = json!({
        "notificationType": "like",
        "isEnabled": false,
        "quietHours": {
            "enabled": true,
            "start": "22:00",
            "end": "08:00",
            "timezone": "America/New_York",
        },
    });

    let req: UpdatePreferencesRequest = serde_json::from_value(payload).unwrap();
    assert_eq!(req.notification_type.as_deref(), Some("like"));
    assert_eq!(req.is_enabled, Some(false));
    let quiet_hours: QuietHoursConfig = req.quiet_hours.unwrap();
    assert_eq!(quiet_hours.timezone, "America/New_York");
}

#[test]
fn bulk_update_preferences_request_decodes_a_type_map() {
    let payload = json!({
        "notificationTypes": { "like": true, "comment": false },
    });
    let req: BulkUpdatePreferencesRequest = serde_json::from_value(payload).unwrap();
    assert_eq!(req.notification_types.get("like"), Some(&true));
    assert_eq!(req.notification_types.get("comment"), Some(&false));
}

#[test]
fn read_batch_request_decodes_a_list_of_ids() {
    let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
    let payload = json!({ "notificationIds": ids });
    let req: ReadBatchRequest = serde_json::from_value(payload).unwrap();
    assert_eq!(req.notification_ids, ids);
}

#[test]
fn read_batch_response_reports_camel_case_marked_count() {
    let response = ReadBatchResponse {
        success: true,
        marked_count: 2,
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["markedCount"], 2);
}

#[test]
fn mark_read_response_encodes_read_at_as_camel_case() {
    let response = MarkReadResponse {
        success: true,
        read_at: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("readAt").is_some());
    assert!(json.get("read_at").is_none());
}
