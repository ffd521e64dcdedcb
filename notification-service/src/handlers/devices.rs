/// Device registration, refresh and deactivation handlers (`/devices/*`).
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResponse;
use crate::models::Platform;
use crate::services::device_registry::DeviceRegistry;
use crate::services::inbox::InboxReader;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: String,
    pub fcm_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceResponse {
    pub device_id: Uuid,
    pub unread_count: i64,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshDeviceRequest {
    pub device_id: Uuid,
    pub fcm_token: Option<String>,
}

/// `POST /devices/register`.
pub async fn register(
    registry: web::Data<DeviceRegistry>,
    inbox: web::Data<InboxReader>,
    req: web::Json<RegisterDeviceRequest>,
) -> ActixResult<HttpResponse> {
    let platform = Platform::parse(&req.platform);
    let device = registry
        .register(req.user_id, req.device_id.clone(), platform, req.fcm_token.clone())
        .await?;
    let unread_count = inbox.get_unread_count(req.user_id).await.unwrap_or(0);

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RegisterDeviceResponse {
        device_id: device.device_id,
        unread_count,
        success: true,
    })))
}

/// `POST /devices/refresh`. 404 if the device is unknown.
pub async fn refresh(
    registry: web::Data<DeviceRegistry>,
    req: web::Json<RefreshDeviceRequest>,
) -> ActixResult<HttpResponse> {
    match registry.refresh(req.device_id, req.fcm_token.clone()).await? {
        Some(()) => Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "success": true })))),
        None => Ok(HttpResponse::NotFound().json(ApiResponse::<()>::err("device not found"))),
    }
}

/// `DELETE /devices/{deviceId}`. Soft-deactivates; never a hard delete.
pub async fn deactivate(
    registry: web::Data<DeviceRegistry>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let device_id = path.into_inner();
    if registry.deactivate(device_id).await? {
        Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "success": true }))))
    } else {
        Ok(HttpResponse::NotFound().json(ApiResponse::<()>::err("device not found")))
    }
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/devices")
            .route("/register", web::post().to(register))
            .route("/refresh", web::post().to(refresh))
            .route("/{deviceId}", web::delete().to(deactivate)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_deserializes_camel_case() {
        let json = r#"{"userId":"00000000-0000-0000-0000-000000000001","deviceId":"abc","platform":"ios","fcmToken":"tok"}"#;
        let req: RegisterDeviceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.device_id, "abc");
        assert_eq!(req.fcm_token.as_deref(), Some("tok"));
    }
}
