// Access log, response compression and CORS for the admin server

use actix_cors::Cors;
use actix_web::http::{header, Method};
use actix_web::middleware::{Compress, Logger};

/// Peer, request line, status, bytes, latency.
const ACCESS_LOG_FORMAT: &str = r#"%a "%r" %s %b %Dms"#;

pub fn access_log() -> Logger {
    Logger::new(ACCESS_LOG_FORMAT).exclude("/health")
}

pub fn compression() -> Compress {
    Compress::default()
}

/// Splits `ALLOWED_ORIGINS` on commas, dropping blanks and trailing slashes.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// The admin surface only serves GET views and POST triggers.
pub fn cors(origins: &[String]) -> Cors {
    origins.iter().fold(
        Cors::default()
            .allowed_methods([Method::GET, Method::POST])
            .allowed_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600),
        |cors, origin| cors.allowed_origin(origin),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    #[::core::prelude::v1::test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_origins(" https://shop.example/ ,,http://localhost:3000"),
            vec!["https://shop.example".to_string(), "http://localhost:3000".to_string()]
        );
        assert!(parse_origins("  ").is_empty());
    }

    #[actix_web::test]
    async fn allowed_origin_is_echoed() {
        let origins = parse_origins("https://shop.example");
        let app = test::init_service(
            App::new()
                .wrap(cors(&origins))
                .route("/status", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/status")
            .insert_header((header::ORIGIN, "https://shop.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://shop.example"
        );
    }
}
