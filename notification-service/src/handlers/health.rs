/// Health endpoints. `/health` and `/health/live` are pure liveness checks
/// (the process is scheduling requests); `/health/ready` additionally
/// verifies the database is reachable; `/health/detailed` folds in the
/// store sample the resource monitor already computes.
use actix_web::{web, HttpResponse};
use serde::Serialize;
use sqlx::PgPool;

use crate::services::monitor::ResourceMonitor;

#[derive(Debug, Serialize)]
struct LivenessBody {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessBody {
    status: &'static str,
    database: &'static str,
}

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessBody { status: "ok" })
}

pub async fn readiness(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(ReadinessBody {
            status: "ok",
            database: "up",
        }),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check: database unreachable");
            HttpResponse::ServiceUnavailable().json(ReadinessBody {
                status: "unavailable",
                database: "down",
            })
        }
    }
}

pub async fn detailed(pool: web::Data<PgPool>) -> HttpResponse {
    let monitor = ResourceMonitor::new(pool.get_ref().clone(), None);
    match monitor.sample().await {
        Ok(sample) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "store": {
                "pending": sample.pending,
                "scheduled": sample.scheduled,
                "locked": sample.locked,
                "oldestDueLagSeconds": sample.oldest_due_lag_secs,
            }
        })),
        Err(e) => {
            tracing::warn!(error = %e, "detailed health check: store sample failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({ "status": "unavailable" }))
        }
    }
}
