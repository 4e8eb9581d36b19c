use super::LOG_EXCERPT_CHARS;
use crate::error::{AppError, AppResult};
use crate::gemini::excerpt;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub text: String,
}

/// `POST /api/get_intent`: route a complaint to a clinic.
///
/// Empty text is rejected before the credential is even looked at, so a
/// blank request never reaches the remote API.
pub async fn get_intent(
    state: web::Data<AppState>,
    body: web::Json<IntentRequest>,
) -> AppResult<HttpResponse> {
    let text = body.text.as_str();
    info!(
        endpoint = "/api/get_intent",
        excerpt = %excerpt(text, LOG_EXCERPT_CHARS),
        "Intent request received"
    );

    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Text must not be empty".to_string()));
    }

    let client = state.gemini().map_err(|e| {
        error!(endpoint = "/api/get_intent", "Intent request failed: API key missing");
        e
    })?;

    let intent = client.classify_intent(text).await.map_err(|e| {
        error!(
            endpoint = "/api/get_intent",
            excerpt = %excerpt(text, LOG_EXCERPT_CHARS),
            error = %e,
            "Intent request failed"
        );
        AppError::from(e)
    })?;

    if intent.is_undetermined() {
        warn!(
            excerpt = %excerpt(text, LOG_EXCERPT_CHARS),
            "Complaint could not be routed to a clinic"
        );
    } else {
        info!(
            poliklinik = %intent.poliklinik,
            aciliyet = intent.aciliyet.as_str(),
            "Intent resolved"
        );
    }
    Ok(HttpResponse::Ok().json(intent))
}
