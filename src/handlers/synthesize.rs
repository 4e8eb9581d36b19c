use super::LOG_EXCERPT_CHARS;
use crate::error::{AppError, AppResult};
use crate::gemini::excerpt;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,

    /// Prebuilt voice name; the configured default when absent
    #[serde(default)]
    pub voice: Option<String>,
}

/// `POST /api/synthesize`: speak `text` and return it as a WAV file.
pub async fn synthesize(
    state: web::Data<AppState>,
    body: web::Json<SynthesisRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    info!(
        endpoint = "/api/synthesize",
        excerpt = %excerpt(&request.text, LOG_EXCERPT_CHARS),
        voice = request.voice.as_deref().unwrap_or("default"),
        "Synthesis request received"
    );

    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("Text must not be empty".to_string()));
    }

    let client = state.gemini().map_err(|e| {
        error!(endpoint = "/api/synthesize", "Synthesis request failed: API key missing");
        e
    })?;

    let audio = client
        .synthesize(&request.text, request.voice.as_deref())
        .await
        .map_err(|e| {
            error!(endpoint = "/api/synthesize", error = %e, "Synthesis request failed");
            AppError::from(e)
        })?;

    let duration_seconds = audio.samples.len() as f64 / audio.sample_rate as f64;
    let wav = audio.into_wav()?;

    info!(
        bytes = wav.len(),
        duration_seconds,
        "Synthesis produced WAV"
    );
    Ok(HttpResponse::Ok().content_type("audio/wav").body(wav))
}
