//! Speech synthesis through the audio response modality.
//!
//! The API answers with base64 linear PCM and a MIME descriptor such as
//! `audio/L16;codec=pcm;rate=24000`; the declared rate becomes the WAV rate.

use super::{GeminiClient, GeminiError};
use crate::audio::pcm::samples_from_le_bytes_exact;
use crate::audio::wav;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

/// Mono 16-bit PCM returned by the synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn into_wav(self) -> anyhow::Result<Vec<u8>> {
        wav::encode_mono16(self.samples, self.sample_rate)
    }
}

pub(crate) fn speech_payload(text: &str, voice: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }
        }
    })
}

/// Extract the `rate=` parameter from an audio MIME type.
pub(crate) fn sample_rate_from_mime(mime_type: &str) -> Result<u32, GeminiError> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .next()
        .ok_or_else(|| GeminiError::Malformed(format!("no sample rate in MIME type '{}'", mime_type)))?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|rate| *rate > 0)
        .ok_or_else(|| GeminiError::Malformed(format!("invalid sample rate in MIME type '{}'", mime_type)))
}

pub(crate) fn decode_inline_audio(mime_type: &str, data: &str) -> Result<SynthesizedAudio, GeminiError> {
    let sample_rate = sample_rate_from_mime(mime_type)?;
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| GeminiError::Malformed(format!("audio payload is not valid base64: {}", e)))?;
    let samples = samples_from_le_bytes_exact(&bytes).map_err(GeminiError::Malformed)?;

    Ok(SynthesizedAudio {
        samples,
        sample_rate,
    })
}

impl GeminiClient {
    /// Synthesize `text` with `voice`, or the configured default voice.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio, GeminiError> {
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_voice.as_str());

        let response = self
            .generate("tts", &self.tts_model, self.tts_timeout, &speech_payload(text, voice))
            .await?;

        let inline = response
            .into_first_part()?
            .inline_data
            .ok_or_else(|| GeminiError::Malformed("candidate part has no inlineData".to_string()))?;

        let audio = decode_inline_audio(&inline.mime_type, &inline.data)?;
        tracing::debug!(
            voice,
            sample_rate = audio.sample_rate,
            samples = audio.samples.len(),
            "Synthesized audio decoded"
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::samples_to_le_bytes;
    use crate::gemini::test_support::client_for;

    fn audio_envelope(mime_type: &str, samples: &[i16]) -> String {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": mime_type,
                            "data": STANDARD.encode(samples_to_le_bytes(samples))
                        }
                    }]
                }
            }]
        })
        .to_string()
    }

    #[test]
    fn test_sample_rate_from_mime() {
        assert_eq!(sample_rate_from_mime("audio/L16;codec=pcm;rate=24000").unwrap(), 24_000);
        assert_eq!(sample_rate_from_mime("audio/L16; rate=16000").unwrap(), 16_000);
        assert!(sample_rate_from_mime("audio/L16;codec=pcm").is_err());
        assert!(sample_rate_from_mime("audio/L16;rate=fast").is_err());
        assert!(sample_rate_from_mime("audio/L16;rate=0").is_err());
    }

    #[test]
    fn test_payload_selects_voice() {
        let payload = speech_payload("Merhaba", "Puck");
        assert_eq!(payload["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            payload["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_odd_length_pcm_is_rejected() {
        let data = STANDARD.encode([1u8, 2, 3]);
        assert!(decode_inline_audio("audio/L16;rate=24000", &data).is_err());
        assert!(decode_inline_audio("audio/L16;rate=24000", "%%%").is_err());
    }

    #[tokio::test]
    async fn test_synthesize_produces_wav_at_declared_rate() {
        let samples: Vec<i16> = (0..480).map(|i| (i * 37 % 2000) as i16 - 1000).collect();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash-preview-tts:generateContent")
            .match_body(mockito::Matcher::PartialJson(json!({
                "generationConfig": {
                    "speechConfig": { "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } } }
                }
            })))
            .with_status(200)
            .with_body(audio_envelope("audio/L16;codec=pcm;rate=24000", &samples))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let audio = client.synthesize("Merhaba", None).await.unwrap();
        mock.assert_async().await;

        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.samples, samples);

        let clip = wav::decode_mono16(&audio.into_wav().unwrap()).unwrap();
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.samples, samples);
    }

    #[tokio::test]
    async fn test_synthesize_without_inline_data_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"no audio here"}]}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.synthesize("Merhaba", Some("Puck")).await.unwrap_err();
        assert!(err.to_string().contains("inlineData"));
    }
}
