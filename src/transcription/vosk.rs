//! libvosk backend.
//!
//! The model is loaded once and shared read-only; every session gets its own
//! `Recognizer`, which is never touched by two connections.

use super::engine::{Decoded, RecognizerSession, SpeechEngine, Utterance, WordTiming};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use vosk::{CompleteResult, DecodingState, LogLevel, Model, Recognizer};

pub struct VoskEngine {
    model: Arc<Model>,
}

impl VoskEngine {
    /// Load the acoustic and language model from `model_path`.
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.is_dir() {
            anyhow::bail!("Vosk model directory not found: {}", model_path.display());
        }

        // libvosk is chatty at its default level
        vosk::set_log_level(LogLevel::Error);

        let path = model_path
            .to_str()
            .ok_or_else(|| anyhow!("Model path is not valid UTF-8: {}", model_path.display()))?;
        let model = Model::new(path)
            .with_context(|| format!("Failed to load Vosk model from '{}'", path))?;

        tracing::info!("Vosk model loaded from {}", path);
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

impl SpeechEngine for VoskEngine {
    fn name(&self) -> &'static str {
        "vosk"
    }

    fn open_session(&self, sample_rate: u32) -> Result<Box<dyn RecognizerSession>> {
        let mut recognizer = Recognizer::new(&self.model, sample_rate as f32)
            .with_context(|| format!("Failed to create Vosk recognizer at {} Hz", sample_rate))?;
        recognizer.set_words(true);

        Ok(Box::new(VoskSession {
            recognizer,
            _model: Arc::clone(&self.model),
        }))
    }
}

struct VoskSession {
    recognizer: Recognizer,

    // Keeps the model alive for as long as the recognizer references it
    _model: Arc<Model>,
}

fn to_utterance(result: CompleteResult<'_>) -> Utterance {
    match result.single() {
        Some(single) => Utterance {
            text: single.text.to_string(),
            words: single
                .result
                .iter()
                .map(|w| WordTiming {
                    word: w.word.to_string(),
                    start: w.start,
                    end: w.end,
                    confidence: w.conf,
                })
                .collect(),
        },
        None => Utterance::default(),
    }
}

impl RecognizerSession for VoskSession {
    fn accept(&mut self, samples: &[i16]) -> Result<Decoded> {
        let state = self
            .recognizer
            .accept_waveform(samples)
            .map_err(|e| anyhow!("Vosk rejected waveform: {:?}", e))?;

        match state {
            DecodingState::Finalized => Ok(Decoded::Boundary(to_utterance(self.recognizer.result()))),
            DecodingState::Running => Ok(Decoded::Accumulating(
                self.recognizer.partial_result().partial.to_string(),
            )),
            DecodingState::Failed => Err(anyhow!("Vosk decoding failed")),
        }
    }

    fn partial(&mut self) -> Result<String> {
        Ok(self.recognizer.partial_result().partial.to_string())
    }

    fn finish(&mut self) -> Result<Utterance> {
        Ok(to_utterance(self.recognizer.final_result()))
    }
}
