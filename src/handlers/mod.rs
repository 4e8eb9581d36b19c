//! HTTP request handlers for the REST endpoints.
//!
//! The streaming endpoint lives in `websocket.rs`; liveness, health and
//! metrics live in `health.rs`.

pub mod intent;
pub mod synthesize;
pub mod transcribe;

pub use intent::get_intent;
pub use synthesize::synthesize;
pub use transcribe::transcribe;

/// User text is cut to this many characters before it is logged.
pub const LOG_EXCERPT_CHARS: usize = 80;
