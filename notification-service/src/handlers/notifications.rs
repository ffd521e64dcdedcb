/// Inbox read-path handlers (`/notifications/*`). Every route here sits
/// behind the JWT auth scope; the recipient is always the authenticated
/// user, never a path parameter.
use actix_web::{web, HttpResponse, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResponse;
use crate::services::auth::UserId;
use crate::services::inbox::{InboxParams, InboxReader};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    #[serde(rename = "includeRead")]
    pub include_read: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub success: bool,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBatchRequest {
    pub notification_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBatchResponse {
    pub success: bool,
    pub marked_count: usize,
}

/// `GET /notifications?limit&includeRead&since&cursor`.
pub async fn list_notifications(
    user_id: UserId,
    inbox: web::Data<InboxReader>,
    query: web::Query<ListQuery>,
) -> ActixResult<HttpResponse> {
    let params = InboxParams {
        limit: query.limit.unwrap_or(20),
        cursor: query.cursor.clone(),
        include_read: query.include_read.unwrap_or(false),
        since: query.since,
    };
    let page = inbox.get_notifications(user_id.0, params).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// `GET /notifications/unread-count`.
pub async fn unread_count(user_id: UserId, inbox: web::Data<InboxReader>) -> ActixResult<HttpResponse> {
    let count = inbox.get_unread_count(user_id.0).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "unreadCount": count }))))
}

/// `POST /notifications/{id}/read?type=personal|group`.
pub async fn mark_read(
    user_id: UserId,
    inbox: web::Data<InboxReader>,
    path: web::Path<Uuid>,
    query: web::Query<MarkReadQuery>,
) -> ActixResult<HttpResponse> {
    let notification_id = path.into_inner();
    let read_at = match query.kind.as_deref() {
        Some("group") => inbox.mark_group_read(notification_id, user_id.0).await?,
        _ => inbox.mark_personal_read(notification_id, user_id.0).await?,
    };
    Ok(HttpResponse::Ok().json(MarkReadResponse {
        success: true,
        read_at,
    }))
}

/// `POST /notifications/read-batch`.
pub async fn mark_read_batch(
    user_id: UserId,
    inbox: web::Data<InboxReader>,
    req: web::Json<ReadBatchRequest>,
) -> ActixResult<HttpResponse> {
    let mut marked_count = 0usize;
    for notification_id in &req.notification_ids {
        if inbox.mark_personal_read(*notification_id, user_id.0).await.is_ok() {
            marked_count += 1;
        }
    }
    Ok(HttpResponse::Ok().json(ReadBatchResponse {
        success: true,
        marked_count,
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("/unread-count", web::get().to(unread_count))
            .route("/read-batch", web::post().to(mark_read_batch))
            .route("/{id}/read", web::post().to(mark_read)),
    );
}
