//! # Recognition Engine Seam
//!
//! A `SpeechEngine` is loaded once per process and hands out independent
//! `RecognizerSession`s. Each session owns its decoder state exclusively; the
//! engine only shares immutable model data between them.
//!
//! ## Decoding Contract:
//! Every call to `accept` reports one of two outcomes, decided by the engine's
//! own endpoint detection:
//! - **Boundary**: the utterance is complete; carries the final text (possibly empty).
//!   Samples after the boundary in the same block already belong to the next
//!   utterance, whose hypothesis `partial` reports
//! - **Accumulating**: speech continues; carries the current best hypothesis

use crate::audio::wav::PcmClip;
use anyhow::{Context, Result};
use std::time::Instant;

/// Samples handed to the decoder per call during one-shot decoding.
pub const ONE_SHOT_BLOCK_SAMPLES: usize = 4000;

/// Timing and confidence for a single recognized word.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f32,
    pub end: f32,
    pub confidence: f32,
}

/// A completed utterance as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utterance {
    pub text: String,

    /// Word-level detail, when the engine provides it
    pub words: Vec<WordTiming>,
}

/// Outcome of feeding one block of samples to a recognizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Endpoint reached; the recognizer has started a fresh utterance
    Boundary(Utterance),

    /// Still inside an utterance; the current partial hypothesis
    Accumulating(String),
}

/// Stateful decoder bound to one audio stream.
pub trait RecognizerSession: Send {
    /// Feed mono 16-bit samples at the session's sample rate.
    fn accept(&mut self, samples: &[i16]) -> Result<Decoded>;

    /// Current hypothesis for the utterance in progress, empty between utterances.
    fn partial(&mut self) -> Result<String>;

    /// Force whatever has been heard so far into a final utterance and reset.
    fn finish(&mut self) -> Result<Utterance>;
}

/// Factory for recognizer sessions.
pub trait SpeechEngine: Send + Sync {
    /// Short engine identifier for logs and health output.
    fn name(&self) -> &'static str;

    /// Open an independent session decoding audio at `sample_rate` Hz.
    fn open_session(&self, sample_rate: u32) -> Result<Box<dyn RecognizerSession>>;
}

/// Decode a whole clip with a fresh session.
///
/// ## Process:
/// 1. Open a session at the clip's own sample rate
/// 2. Feed the samples in fixed-size blocks, collecting boundary finals
/// 3. Flush the session for the trailing utterance
/// 4. Join all non-empty utterances with single spaces
pub fn transcribe_clip(engine: &dyn SpeechEngine, clip: &PcmClip) -> Result<String> {
    let start_time = Instant::now();
    let mut session = engine
        .open_session(clip.sample_rate)
        .with_context(|| format!("Failed to open {} session at {} Hz", engine.name(), clip.sample_rate))?;

    let mut utterances = Vec::new();
    for block in clip.samples.chunks(ONE_SHOT_BLOCK_SAMPLES) {
        if let Decoded::Boundary(utterance) = session.accept(block).context("Decoding failed")? {
            utterances.push(utterance.text);
        }
    }
    utterances.push(session.finish().context("Final decoding failed")?.text);

    let text = utterances
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    tracing::debug!(
        engine = engine.name(),
        audio_seconds = clip.duration_seconds(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        chars = text.len(),
        "One-shot transcription finished"
    );

    Ok(text)
}
