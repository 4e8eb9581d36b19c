//! Deterministic stand-in for a real recognizer.
//!
//! Loud samples count as speech: every `samples_per_word` loud samples add one
//! word from a fixed vocabulary, and `silence_for_boundary` quiet samples after
//! speech end the utterance. The outcome depends only on the sample sequence,
//! never on how it was chunked.

use super::engine::{Decoded, RecognizerSession, SpeechEngine, Utterance, WordTiming};
use anyhow::{anyhow, bail, Result};
use std::sync::{Arc, Mutex};

pub const VOCABULARY: &[&str] = &["boğazım", "ağrıyor", "ve", "başım", "dönüyor"];

/// Amplitude used for generated speech samples.
const SPEECH_AMPLITUDE: i16 = 3000;

#[derive(Clone)]
pub struct ScriptedEngine {
    pub samples_per_word: usize,
    pub silence_for_boundary: usize,
    pub loudness_threshold: i16,
    fail_open: bool,
    poison_sample: Option<i16>,
    opened: Arc<Mutex<Vec<u32>>>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            samples_per_word: 1600,
            silence_for_boundary: 4800,
            loudness_threshold: 500,
            fail_open: false,
            poison_sample: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ScriptedEngine {
    /// An engine whose sessions cannot be opened.
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// An engine whose sessions fail when they see `i16::MIN`.
    pub fn failing_decode() -> Self {
        Self {
            poison_sample: Some(i16::MIN),
            ..Self::default()
        }
    }

    /// Sample rates of every session opened so far.
    pub fn opened_sample_rates(&self) -> Vec<u32> {
        self.opened.lock().unwrap().clone()
    }
}

impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open_session(&self, sample_rate: u32) -> Result<Box<dyn RecognizerSession>> {
        if self.fail_open {
            bail!("model directory not found");
        }
        self.opened.lock().unwrap().push(sample_rate);
        Ok(Box::new(ScriptedSession {
            engine: self.clone(),
            sample_rate,
            loud: 0,
            silent_run: 0,
            words: 0,
            position: 0,
            completed: Vec::new(),
        }))
    }
}

struct ScriptedSession {
    engine: ScriptedEngine,
    sample_rate: u32,
    loud: usize,
    silent_run: usize,
    words: usize,
    position: usize,
    completed: Vec<Utterance>,
}

impl ScriptedSession {
    fn current_text(&self) -> String {
        (0..self.words)
            .map(|i| VOCABULARY[i % VOCABULARY.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn take_utterance(&mut self) -> Utterance {
        let seconds_per_word = self.engine.samples_per_word as f32 / self.sample_rate as f32;
        let end = self.position as f32 / self.sample_rate as f32;
        let words = (0..self.words)
            .map(|i| WordTiming {
                word: VOCABULARY[i % VOCABULARY.len()].to_string(),
                start: (end - (self.words - i) as f32 * seconds_per_word).max(0.0),
                end: (end - (self.words - i - 1) as f32 * seconds_per_word).max(0.0),
                confidence: 1.0,
            })
            .collect();
        let utterance = Utterance {
            text: self.current_text(),
            words,
        };
        self.loud = 0;
        self.silent_run = 0;
        self.words = 0;
        utterance
    }
}

impl RecognizerSession for ScriptedSession {
    fn accept(&mut self, samples: &[i16]) -> Result<Decoded> {
        for &sample in samples {
            if Some(sample) == self.engine.poison_sample {
                return Err(anyhow!("scripted decoder failure at sample {}", self.position));
            }
            self.position += 1;

            if sample.unsigned_abs() >= self.engine.loudness_threshold.unsigned_abs() {
                self.loud += 1;
                self.silent_run = 0;
                if self.loud % self.engine.samples_per_word == 0 {
                    self.words += 1;
                }
            } else if self.loud > 0 {
                self.silent_run += 1;
                if self.silent_run >= self.engine.silence_for_boundary {
                    let utterance = self.take_utterance();
                    self.completed.push(utterance);
                }
            }
        }

        if self.completed.is_empty() {
            return Ok(Decoded::Accumulating(self.current_text()));
        }

        let completed = std::mem::take(&mut self.completed);
        let text = completed
            .iter()
            .map(|u| u.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let words = completed.into_iter().flat_map(|u| u.words).collect();
        Ok(Decoded::Boundary(Utterance { text, words }))
    }

    fn partial(&mut self) -> Result<String> {
        Ok(self.current_text())
    }

    fn finish(&mut self) -> Result<Utterance> {
        Ok(self.take_utterance())
    }
}

/// `words` words of generated speech.
pub fn speech(engine: &ScriptedEngine, words: usize) -> Vec<i16> {
    (0..words * engine.samples_per_word)
        .map(|i| if i % 2 == 0 { SPEECH_AMPLITUDE } else { -SPEECH_AMPLITUDE })
        .collect()
}

/// Quiet samples that never count as speech.
pub fn silence(len: usize) -> Vec<i16> {
    (0..len).map(|i| if i % 2 == 0 { 40 } else { -40 }).collect()
}

/// Speech followed, optionally, by enough silence to end the utterance.
pub fn speech_then_silence(engine: &ScriptedEngine, words: usize, end_utterance: bool) -> Vec<i16> {
    let mut samples = speech(engine, words);
    if end_utterance {
        samples.extend(silence(engine.silence_for_boundary));
    }
    samples
}
