//! # WAV Containers
//!
//! The synthesis endpoint wraps raw linear PCM from the remote API in a WAV
//! container; the upload endpoint unwraps client WAV files before decoding.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Cursor;

/// `WAVE_FORMAT_PCM` format tag in the RIFF header.
const WAVE_FORMAT_PCM: u16 = 0x0001;

/// Decoded mono 16-bit audio.
#[derive(Debug, Clone)]
pub struct PcmClip {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl PcmClip {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Wrap mono 16-bit samples in a WAV container.
pub fn encode_mono16(samples: Vec<i16>, sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        bail!("Sample rate must be greater than 0");
    }

    let header = wav::Header::new(WAVE_FORMAT_PCM, 1, sample_rate, 16);
    let mut cursor = Cursor::new(Vec::new());
    wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor)
        .context("Failed to write WAV container")?;

    Ok(cursor.into_inner())
}

/// Read a WAV file that must be mono 16-bit PCM.
pub fn decode_mono16(bytes: &[u8]) -> Result<PcmClip> {
    let mut cursor = Cursor::new(bytes);
    let (header, data) = wav::read(&mut cursor).context("Not a readable WAV file")?;

    if header.channel_count != 1 {
        bail!(
            "Audio must be mono, got {} channels",
            header.channel_count
        );
    }

    let samples = match data {
        wav::BitDepth::Sixteen(samples) => samples,
        _ => {
            return Err(anyhow!(
                "Audio must be 16-bit PCM, got {} bits per sample",
                header.bits_per_sample
            ))
        }
    };

    Ok(PcmClip {
        sample_rate: header.sampling_rate,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect()
    }

    #[test]
    fn test_encoded_header_is_mono_16bit_at_requested_rate() {
        let bytes = encode_mono16(tone(2400), 24_000).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let clip = decode_mono16(&bytes).unwrap();
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.samples.len(), 2400);
        assert!((clip.duration_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_stereo_is_rejected() {
        let header = wav::Header::new(WAVE_FORMAT_PCM, 2, 16_000, 16);
        let mut cursor = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(tone(400)), &mut cursor).unwrap();

        let err = decode_mono16(&cursor.into_inner()).unwrap_err();
        assert!(err.to_string().contains("mono"));
    }

    #[test]
    fn test_eight_bit_is_rejected() {
        let header = wav::Header::new(WAVE_FORMAT_PCM, 1, 8_000, 8);
        let mut cursor = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Eight(vec![128; 80]), &mut cursor).unwrap();

        let err = decode_mono16(&cursor.into_inner()).unwrap_err();
        assert!(err.to_string().contains("16-bit"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_mono16(b"definitely not audio").is_err());
        assert!(encode_mono16(vec![0; 10], 0).is_err());
    }
}
