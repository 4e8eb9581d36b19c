//! # Transcription Module
//!
//! Speech-to-text through a local recognition engine. The engine itself
//! (acoustic model, language model, endpoint detection) is opaque; this module
//! only opens recognizer sessions, feeds them samples and shapes their output.
//!
//! ## Key Components:
//! - **Engine seam**: `SpeechEngine` / `RecognizerSession` traits
//! - **Vosk backend**: libvosk bindings, compiled with the `vosk` feature
//! - **Streaming session**: per-WebSocket decoder with the partial/final emit policy
//! - **One-shot decoding**: whole-file transcription for uploads

pub mod engine; // Engine traits and one-shot decoding
pub mod stream; // Per-connection streaming session
#[cfg(feature = "vosk")]
pub mod vosk; // libvosk backend

#[cfg(test)]
pub mod testing; // Deterministic engine for tests

pub use engine::{transcribe_clip, Decoded, RecognizerSession, SpeechEngine, Utterance, WordTiming};
pub use stream::{is_eof_marker, StreamingSession, TranscriptKind, TranscriptMessage};
