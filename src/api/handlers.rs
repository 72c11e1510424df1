// HTTP request handlers for the sync admin surface.
//
// Every handler answers 200; failures travel in the `success` field.

use crate::api::models::*;
use crate::api::state::AppState;
use crate::sync::error::SyncError;
use crate::sync::result::{SyncResult, SyncStage};
use actix_web::{web, HttpResponse, Result};
use serde::Serialize;

fn ok<T: Serialize>(body: ApiResponse<T>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(body))
}

fn respond<T: Serialize>(what: &str, result: Result<T, SyncError>) -> Result<HttpResponse> {
    match result {
        Ok(data) => ok(ApiResponse::success(data)),
        Err(e) => {
            tracing::error!(error = %e, "{what} failed");
            ok(ApiResponse::<()>::error(e.to_string()))
        }
    }
}

fn stage_response(result: SyncResult) -> Result<HttpResponse> {
    let message = result.message.clone();
    ok(ApiResponse::outcome(result.success, result, message))
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let database = match &state.db {
        None => "not configured",
        Some(db) => match sqlx::query_scalar::<_, bool>("SELECT true")
            .persistent(false)
            .fetch_one(&db.pool)
            .await
        {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
    };

    ok(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: database.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    }))
}

pub async fn get_status(state: web::Data<AppState>) -> Result<HttpResponse> {
    respond("sync status", state.stats.sync_status().await)
}

pub async fn get_statistics(state: web::Data<AppState>) -> Result<HttpResponse> {
    respond("sync statistics", state.stats.sync_stats().await)
}

pub async fn get_api_info(state: web::Data<AppState>) -> Result<HttpResponse> {
    let info = state.stats.api_info().await;
    ok(ApiResponse::success(info))
}

pub async fn get_logs(
    state: web::Data<AppState>,
    query: web::Query<LogsQuery>,
) -> Result<HttpResponse> {
    respond("sync logs", state.stats.recent_sync_logs(query.limit()).await)
}

/// `{stage}` is a ledger key (`ASBIS_PRODUCTS`) or a stage name (`products`).
pub async fn get_last_result(
    state: web::Data<AppState>,
    stage: web::Path<String>,
) -> Result<HttpResponse> {
    match SyncStage::from_key(&stage) {
        Some(stage) => respond("last sync result", state.stats.last_sync_result(stage).await),
        None => ok(ApiResponse::<()>::error(format!("unknown sync stage: {stage}"))),
    }
}

pub async fn get_integrity_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    respond("integrity check", state.stats.check_data_integrity().await)
}

pub async fn get_available_categories(state: web::Data<AppState>) -> Result<HttpResponse> {
    respond("category discovery", state.stats.available_categories().await)
}

pub async fn get_available_manufacturers(state: web::Data<AppState>) -> Result<HttpResponse> {
    respond(
        "manufacturer discovery",
        state.stats.available_manufacturers().await,
    )
}

pub async fn test_connection(state: web::Data<AppState>) -> Result<HttpResponse> {
    let check = state.stats.test_connection().await;
    let message = check.message.clone();
    ok(ApiResponse::outcome(check.success, check, message))
}

pub async fn get_raw_xml(state: web::Data<AppState>) -> Result<HttpResponse> {
    let xml = state
        .orchestrator
        .vendor()
        .get_raw_product_list_xml()
        .await
        .map(|xml| RawXmlResponse {
            bytes: xml.len(),
            xml: xml.as_str().to_owned(),
        });
    respond("raw product feed", xml)
}

pub async fn sync_stage(state: web::Data<AppState>, stage: SyncStage) -> Result<HttpResponse> {
    tracing::info!(stage = %stage, "stage sync requested");
    let result = state.orchestrator.run_stage(stage).await.into_result(stage);
    stage_response(result)
}

pub async fn sync_categories(state: web::Data<AppState>) -> Result<HttpResponse> {
    sync_stage(state, SyncStage::Categories).await
}

pub async fn sync_manufacturers(state: web::Data<AppState>) -> Result<HttpResponse> {
    sync_stage(state, SyncStage::Manufacturers).await
}

pub async fn sync_parameters(state: web::Data<AppState>) -> Result<HttpResponse> {
    sync_stage(state, SyncStage::Parameters).await
}

pub async fn sync_products(state: web::Data<AppState>) -> Result<HttpResponse> {
    sync_stage(state, SyncStage::Products).await
}

pub async fn sync_full(state: web::Data<AppState>) -> Result<HttpResponse> {
    tracing::info!("full sync requested");
    let report = state.coordinator.run_full_sync().await;
    let message = report.message.clone();
    ok(ApiResponse::outcome(report.success, report, message))
}

pub async fn clear_cache(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.orchestrator.vendor().clear_cache();
    tracing::info!("vendor cache cleared");
    ok(ApiResponse::success(ClearCacheResponse {
        message: "vendor cache cleared".to_string(),
    }))
}
