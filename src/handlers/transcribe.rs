//! `POST /transcribe`: one-shot transcription of an uploaded WAV file.
//!
//! ## Upload Handling:
//! 1. Read the multipart field `file`, enforcing the configured size cap
//! 2. Check the client filename; it is only ever logged, never used as a path
//! 3. Persist the bytes under a generated name inside the upload directory
//! 4. Decode the WAV container (must be mono 16-bit) and run one-shot decoding
//!    on the blocking thread pool

use crate::audio::wav;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::transcribe_clip;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Name of the multipart field carrying the audio.
const FILE_FIELD: &str = "file";

struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// Reject client filenames that could escape the upload directory.
pub fn check_filename(name: &str) -> AppResult<&str> {
    let unsafe_name = name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.chars().any(char::is_control);

    if unsafe_name {
        return Err(AppError::BadRequest(format!(
            "Unsafe upload filename: {:?}",
            name
        )));
    }
    Ok(name)
}

/// Path for a new upload; the client never influences it.
fn storage_path(upload_dir: &Path) -> PathBuf {
    upload_dir.join(format!("{}.wav", Uuid::new_v4()))
}

async fn read_upload(mut payload: Multipart, max_bytes: usize) -> AppResult<Upload> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?;

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_string),
                cd.get_filename().map(str::to_string),
            ),
            None => (None, None),
        };

        if name.as_deref() != Some(FILE_FIELD) {
            // Drain fields we do not use
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?;
            }
            continue;
        }

        if let Some(filename) = filename.as_deref() {
            check_filename(filename)?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Upload interrupted: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "Upload exceeds the {} byte limit",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(Upload { filename, bytes });
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

pub async fn transcribe(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let engine = state.speech_engine()?;
    let stt = &state.config().stt;

    let upload = read_upload(payload, stt.max_upload_bytes).await?;

    tokio::fs::create_dir_all(&stt.upload_dir).await?;
    let path = storage_path(&stt.upload_dir);
    tokio::fs::write(&path, &upload.bytes).await?;

    info!(
        endpoint = "/transcribe",
        filename = upload.filename.as_deref().unwrap_or("<none>"),
        stored_as = %path.display(),
        bytes = upload.bytes.len(),
        "Upload stored"
    );

    let clip = wav::decode_mono16(&upload.bytes).map_err(|e| {
        warn!(endpoint = "/transcribe", error = %e, "Upload is not usable audio");
        AppError::BadRequest(format!("{:#}", e))
    })?;

    let text = web::block(move || transcribe_clip(engine.as_ref(), &clip))
        .await
        .map_err(|e| AppError::Internal(format!("Decoding task failed: {}", e)))??;

    info!(endpoint = "/transcribe", chars = text.len(), "Upload transcribed");
    Ok(HttpResponse::Ok().json(json!({ "text": text })))
}
