// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1/sync/asbis")
                // Read-only views
                .route("/status", web::get().to(handlers::get_status))
                .route("/statistics", web::get().to(handlers::get_statistics))
                .route("/api-info", web::get().to(handlers::get_api_info))
                .route("/logs", web::get().to(handlers::get_logs))
                .route(
                    "/last-result/{stage}",
                    web::get().to(handlers::get_last_result),
                )
                .route(
                    "/integrity-check",
                    web::get().to(handlers::get_integrity_check),
                )
                .route(
                    "/available-categories",
                    web::get().to(handlers::get_available_categories),
                )
                .route(
                    "/available-manufacturers",
                    web::get().to(handlers::get_available_manufacturers),
                )
                .route("/test-connection", web::get().to(handlers::test_connection))
                .route("/raw-xml", web::get().to(handlers::get_raw_xml))
                // Sync triggers
                .route("/categories", web::post().to(handlers::sync_categories))
                .route(
                    "/manufacturers",
                    web::post().to(handlers::sync_manufacturers),
                )
                .route("/parameters", web::post().to(handlers::sync_parameters))
                .route("/products", web::post().to(handlers::sync_products))
                .route("/full", web::post().to(handlers::sync_full))
                .route("/clear-cache", web::post().to(handlers::clear_cache)),
        );
}
