//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between section and key)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Option<T>**: The remote API key may legitimately be absent
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special environment variables (HOST, PORT, GEMINI_API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_STT__MODEL_PATH, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Lowest sample rate a client may request for a streaming session.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest sample rate a client may request for a streaming session.
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Key values that people leave in `.env` files instead of a real credential.
const PLACEHOLDER_KEYS: &[&str] = &["YOUR_API_KEY_HERE", "changeme"];

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, speech recognition,
/// remote generative API) keeps each handler looking only at what it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stt: SttConfig,
    pub gemini: GeminiConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Local speech recognition settings.
///
/// ## Fields:
/// - `model_path`: Directory of the Vosk model (e.g. `models/vosk-model-small-tr-0.3`)
/// - `default_sample_rate`: Used when a streaming client omits `sample_rate`
/// - `upload_dir`: Where `/transcribe` persists uploaded files
/// - `max_upload_bytes`: Uploads larger than this are rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub model_path: PathBuf,
    pub default_sample_rate: u32,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Remote generative API (Gemini) settings.
///
/// The API key is normally injected through `GEMINI_API_KEY` and never
/// written to a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub intent_model: String,
    pub tts_model: String,
    pub default_voice: String,
    pub intent_timeout_secs: u64,
    pub tts_timeout_secs: u64,
    /// Refuse to start without a key instead of serving "not configured" errors.
    pub require_api_key: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            stt: SttConfig {
                model_path: PathBuf::from("models/vosk-model-small-tr-0.3"),
                default_sample_rate: 16_000,
                upload_dir: PathBuf::from("data"),
                max_upload_bytes: 50 * 1024 * 1024,
            },
            gemini: GeminiConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                intent_model: "gemini-2.5-flash-preview-09-2025".to_string(),
                tts_model: "gemini-2.5-flash-preview-tts".to_string(),
                default_voice: "Kore".to_string(),
                intent_timeout_secs: 30,
                tts_timeout_secs: 20,
                require_api_key: false,
            },
        }
    }
}

impl GeminiConfig {
    /// The configured key, or `None` when it is absent, blank or a placeholder.
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !PLACEHOLDER_KEYS.contains(key))
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and GEMINI_API_KEY
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STT__MODEL_PATH=/opt/vosk/tr`: Override the recognizer model
    /// - `APP_GEMINI__TTS_TIMEOUT_SECS=40`: Override the synthesis deadline
    /// - `GEMINI_API_KEY=...`: The remote API credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms set these without our prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("gemini.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Default sample rate lies within the supported range
    /// - Remote call deadlines and the upload cap are non-zero
    /// - Model names and the default voice are not blank
    /// - A usable API key exists when `require_api_key` is set
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.stt.default_sample_rate) {
            return Err(anyhow::anyhow!(
                "Default sample rate must be between {} and {} Hz, got {}",
                MIN_SAMPLE_RATE,
                MAX_SAMPLE_RATE,
                self.stt.default_sample_rate
            ));
        }

        if self.stt.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Upload size limit must be greater than 0"));
        }

        if self.gemini.intent_timeout_secs == 0 || self.gemini.tts_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Remote API timeouts must be greater than 0"));
        }

        for (name, value) in [
            ("gemini.intent_model", &self.gemini.intent_model),
            ("gemini.tts_model", &self.gemini.tts_model),
            ("gemini.default_voice", &self.gemini.default_voice),
            ("gemini.base_url", &self.gemini.base_url),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("{} cannot be empty", name));
            }
        }

        if self.gemini.require_api_key && self.gemini.usable_api_key().is_none() {
            return Err(anyhow::anyhow!(
                "GEMINI_API_KEY is required (gemini.require_api_key = true) but is not set"
            ));
        }

        Ok(())
    }
}
