//! # Streaming Recognition Session
//!
//! One `StreamingSession` exists per WebSocket connection. It owns its
//! recognizer outright: created when the socket opens, dropped when the
//! socket goes away, never shared or pooled.
//!
//! ## Session Lifecycle:
//! 1. **Open**: a recognizer is opened at the requested sample rate
//! 2. **Receiving**: each binary chunk is reassembled into samples and decoded
//! 3. **Flush** (optional): the pending hypothesis is forced into a final
//! 4. **Dropped**: decoder state is released with the session
//!
//! ## Emit Policy:
//! A chunk produces at most one message. Messages whose text is empty are
//! suppressed, so silence produces no traffic.

use crate::audio::pcm::PcmAssembler;
use crate::transcription::engine::{Decoded, RecognizerSession, SpeechEngine, Utterance};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// End-of-stream markers are tiny; anything longer is audio.
const MAX_EOF_MARKER_BYTES: usize = 64;

/// Whether a frame is the `{"eof": 1}` end-of-stream marker. Any non-zero
/// number or `true` counts.
///
/// The marker may arrive as a text frame or, from clients that only send
/// binary frames, as the same bytes in a binary frame.
pub fn is_eof_marker(frame: &[u8]) -> bool {
    if frame.len() > MAX_EOF_MARKER_BYTES || !frame.trim_ascii_start().starts_with(b"{") {
        return false;
    }
    match serde_json::from_slice::<Value>(frame) {
        Ok(Value::Object(map)) => match map.get("eof") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        },
        _ => false,
    }
}

/// Whether a transcript is a revisable hypothesis or a finished utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    Partial,
    Final,
}

/// Message sent to the client: `{"type": "partial"|"final", "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    #[serde(rename = "type")]
    pub kind: TranscriptKind,
    pub text: String,
}

impl TranscriptMessage {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Partial,
            text: text.into(),
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Final,
            text: text.into(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.kind == TranscriptKind::Final
    }
}

/// Counters kept for the lifetime of one session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub chunks_received: u64,
    pub messages_emitted: u64,
    pub finals_emitted: u64,
    pub suppressed: u64,
    pub decode_time_ms: u64,
}

pub struct StreamingSession {
    session_id: String,
    sample_rate: u32,
    recognizer: Box<dyn RecognizerSession>,
    assembler: PcmAssembler,
    created_at: DateTime<Utc>,

    /// Latest non-final hypothesis, cleared at every boundary
    pending: String,

    stats: SessionStats,
}

impl StreamingSession {
    /// Open a session with a fresh recognizer from `engine`.
    pub fn open(engine: &dyn SpeechEngine, sample_rate: u32) -> Result<Self> {
        let recognizer = engine
            .open_session(sample_rate)
            .with_context(|| format!("Failed to start {} recognizer at {} Hz", engine.name(), sample_rate))?;

        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            sample_rate,
            recognizer,
            assembler: PcmAssembler::new(),
            created_at: Utc::now(),
            pending: String::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn bytes_received(&self) -> usize {
        self.assembler.total_bytes()
    }

    /// Whether the last chunk ended in the middle of a sample.
    pub fn has_partial_sample(&self) -> bool {
        self.assembler.has_pending_byte()
    }

    /// The hypothesis that would be lost if the stream stopped now.
    pub fn pending_hypothesis(&self) -> &str {
        &self.pending
    }

    pub fn age_seconds(&self) -> f64 {
        Utc::now()
            .signed_duration_since(self.created_at)
            .num_milliseconds() as f64
            / 1000.0
    }

    /// Feed one chunk of raw PCM and return the message to send, if any.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<TranscriptMessage>> {
        self.stats.chunks_received += 1;

        let samples = self.assembler.push(chunk);
        if samples.is_empty() {
            return Ok(None);
        }

        let started = Instant::now();
        let decoded = self.recognizer.accept(&samples)?;
        self.stats.decode_time_ms += started.elapsed().as_millis() as u64;

        let message = match decoded {
            Decoded::Boundary(utterance) => {
                let message = self.finalize(utterance);
                // Speech after the boundary in the same chunk is already decoding
                self.pending = self.recognizer.partial()?;
                message
            }
            Decoded::Accumulating(hypothesis) => {
                self.pending = hypothesis.clone();
                TranscriptMessage::partial(hypothesis)
            }
        };

        Ok(self.emit(message))
    }

    /// Force the recognizer to finalize whatever it has heard.
    pub fn flush(&mut self) -> Result<Option<TranscriptMessage>> {
        let utterance = self.recognizer.finish()?;
        let message = self.finalize(utterance);
        Ok(self.emit(message))
    }

    fn finalize(&mut self, utterance: Utterance) -> TranscriptMessage {
        self.pending.clear();
        if !utterance.words.is_empty() {
            tracing::debug!(
                session_id = %self.session_id,
                words = utterance.words.len(),
                "Utterance finalized with word timings"
            );
        }
        TranscriptMessage::final_text(utterance.text)
    }

    fn emit(&mut self, message: TranscriptMessage) -> Option<TranscriptMessage> {
        if message.text.trim().is_empty() {
            self.stats.suppressed += 1;
            return None;
        }

        self.stats.messages_emitted += 1;
        if message.is_final() {
            self.stats.finals_emitted += 1;
        }
        Some(message)
    }
}
