//! # Clinic Voice Backend
//!
//! Library half of the server: everything except process startup, so the
//! `voice-flow` client can share the wire types.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, config.toml, environment)
//! - **state**: Shared state, metrics and the loaded collaborators
//! - **audio**: PCM reassembly and WAV containers
//! - **transcription**: Speech engine seam, Vosk backend, streaming sessions
//! - **gemini**: Remote intent classification and speech synthesis
//! - **handlers / websocket / health**: HTTP and WebSocket endpoints
//! - **middleware**: Request logging and metrics
//! - **error**: Error types and their HTTP responses

pub mod audio; // PCM and WAV handling (audio/ directory)
pub mod config; // Configuration management (config.rs)
pub mod error; // Error handling types (error.rs)
pub mod gemini; // Remote generative API client (gemini/ directory)
pub mod handlers; // REST handlers (handlers/ directory)
pub mod health; // Liveness, health, metrics and docs (health.rs)
pub mod middleware; // Custom middleware (middleware/ directory)
pub mod routes; // Route table (routes.rs)
pub mod state; // Application state management (state.rs)
pub mod transcription; // Speech recognition (transcription/ directory)
pub mod websocket; // Streaming recognition endpoint (websocket.rs)
