/// `/users/{userId}/notification-preferences*` handlers.
use std::collections::HashMap;

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResponse;
use crate::models::QuietHoursConfig;
use crate::services::preferences::PreferencesRepository;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    pub notification_type: Option<String>,
    pub is_enabled: Option<bool>,
    pub quiet_hours: Option<QuietHoursConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdatePreferencesRequest {
    pub notification_types: HashMap<String, bool>,
}

/// `GET /users/{userId}/notification-preferences`. Creates defaults on first access.
pub async fn get_preferences(
    repo: web::Data<PreferencesRepository>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let prefs = repo.get_or_create(user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

/// `POST /users/{userId}/notification-preferences`.
pub async fn update_preferences(
    repo: web::Data<PreferencesRepository>,
    path: web::Path<Uuid>,
    req: web::Json<UpdatePreferencesRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let mut prefs = repo.get_or_create(user_id).await?;

    if let (Some(notification_type), Some(is_enabled)) = (&req.notification_type, req.is_enabled) {
        prefs = repo
            .set_notification_type(user_id, notification_type, is_enabled)
            .await?;
    }
    if let Some(quiet_hours) = req.quiet_hours.clone() {
        prefs = repo.set_quiet_hours(user_id, quiet_hours).await?;
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

/// `PUT /users/{userId}/notification-preferences/bulk`.
pub async fn bulk_update_preferences(
    repo: web::Data<PreferencesRepository>,
    path: web::Path<Uuid>,
    req: web::Json<BulkUpdatePreferencesRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let prefs = repo
        .bulk_set_notification_types(user_id, req.into_inner().notification_types)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users/{userId}/notification-preferences")
            .route("", web::get().to(get_preferences))
            .route("", web::post().to(update_preferences))
            .route("/bulk", web::put().to(bulk_update_preferences)),
    );
}
