//! Route table shared by the server and the tests.

use crate::error::AppError;
use crate::{handlers, health, websocket};
use actix_web::{web, HttpResponse};

/// Register every route plus the extractor error handlers.
///
/// Malformed JSON bodies and query strings answer with the same JSON error
/// shape as handler errors instead of actix's plain-text defaults.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(format!("Invalid JSON body: {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(format!("Invalid query string: {}", err)).into()
    }))
    .route("/", web::get().to(health::root))
    .route("/favicon.ico", web::get().to(|| async { HttpResponse::NoContent().finish() }))
    .route("/health", web::get().to(health::health_check))
    .route("/metrics", web::get().to(health::detailed_metrics))
    .route("/docs", web::get().to(health::docs))
    .route("/transcribe", web::post().to(handlers::transcribe))
    .service(
        web::scope("/api")
            .route("/get_intent", web::post().to(handlers::get_intent))
            .route("/synthesize", web::post().to(handlers::synthesize)),
    )
    .route("/ws/stream_stt", web::get().to(websocket::stream_stt))
    .default_service(web::to(|| async {
        Err::<HttpResponse, AppError>(AppError::NotFound("No such route".to_string()))
    }));
}
