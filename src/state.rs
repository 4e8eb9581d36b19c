//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor through
//! `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets every worker thread hold the same configuration, engine and metrics
//! - **Cloning**: `AppState::clone()` only bumps reference counts
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Metrics are written by every request and read by `/metrics`
//! - **Poisoning**: A panic while holding the lock must not take metrics down
//!   with it, so a poisoned lock is recovered with `PoisonError::into_inner`
//!
//! ### Trait objects
//! - `Arc<dyn SpeechEngine>` lets the server run with the Vosk backend or a
//!   deterministic engine in tests without changing any handler.
//!
//! ## What is NOT here:
//! Recognizer sessions. Each WebSocket connection owns its decoder state;
//! only the immutable model behind the engine is shared.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::gemini::GeminiClient;
use crate::transcription::SpeechEngine;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Configuration is fixed after startup validation
    pub config: Arc<AppConfig>,

    /// Performance metrics (updated by the metrics middleware and WebSocket actors)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,

    /// Remote API client; `None` when no usable key is configured
    gemini: Option<GeminiClient>,

    /// Local recognizer; `None` when no engine is compiled in or loaded
    speech_engine: Option<Arc<dyn SpeechEngine>>,
}

/// Counters collected across all requests.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: Overall load and reliability
/// - **active_sessions**: Open streaming connections, each holding a decoder
/// - **endpoint_metrics**: Per-route statistics keyed by "METHOD /route/pattern"
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub total_sessions: u64,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Statistics for a single route.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Create state with no remote client and no speech engine.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            gemini: None,
            speech_engine: None,
        }
    }

    pub fn with_gemini(mut self, client: Option<GeminiClient>) -> Self {
        self.gemini = client;
        self
    }

    pub fn with_speech_engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.speech_engine = Some(engine);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The remote API client, or the fixed "not configured" error.
    pub fn gemini(&self) -> AppResult<&GeminiClient> {
        self.gemini.as_ref().ok_or(AppError::NotConfigured)
    }

    pub fn has_gemini(&self) -> bool {
        self.gemini.is_some()
    }

    /// The loaded speech engine, or a 503 when none is available.
    pub fn speech_engine(&self) -> AppResult<Arc<dyn SpeechEngine>> {
        self.speech_engine
            .clone()
            .ok_or_else(|| AppError::Unavailable("Speech recognition engine is not loaded".to_string()))
    }

    pub fn speech_engine_name(&self) -> Option<&'static str> {
        self.speech_engine.as_ref().map(|engine| engine.name())
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record one request against `endpoint` (e.g. "POST /api/get_intent").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Called when a streaming connection opens.
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics_mut();
        metrics.active_sessions += 1;
        metrics.total_sessions += 1;
    }

    /// Called when a streaming connection closes. Never goes below zero.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics_mut();
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }

    /// Copy of the current metrics, taken under a read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average = total duration / number of requests.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, from 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::testing::ScriptedEngine;

    #[test]
    fn test_missing_collaborators_map_to_errors() {
        let state = AppState::new(AppConfig::default());

        assert!(matches!(state.gemini(), Err(AppError::NotConfigured)));
        assert!(matches!(state.speech_engine(), Err(AppError::Unavailable(_))));
        assert_eq!(state.speech_engine_name(), None);
    }

    #[test]
    fn test_speech_engine_is_shared() {
        let state = AppState::new(AppConfig::default()).with_speech_engine(Arc::new(ScriptedEngine::default()));
        let cloned = state.clone();

        assert_eq!(cloned.speech_engine_name(), Some("scripted"));
        assert!(Arc::ptr_eq(
            &state.speech_engine().unwrap(),
            &cloned.speech_engine().unwrap()
        ));
    }

    #[test]
    fn test_session_counter_never_underflows() {
        let state = AppState::new(AppConfig::default());
        state.increment_active_sessions();
        state.decrement_active_sessions();
        state.decrement_active_sessions();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_sessions, 0);
        assert_eq!(metrics.total_sessions, 1);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /api/get_intent", 10, false);
        state.record_endpoint_request("POST /api/get_intent", 30, true);

        let metrics = state.get_metrics_snapshot();
        let metric = &metrics.endpoint_metrics["POST /api/get_intent"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
