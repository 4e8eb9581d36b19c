//! # PCM Chunk Handling
//!
//! WebSocket clients send raw 16-bit little-endian PCM in frames of any size.
//! A frame boundary can fall in the middle of a sample, so the odd byte is
//! held back and prepended to the next frame.

use byteorder::{ByteOrder, LittleEndian};

/// Bytes per 16-bit PCM sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Reassembles arbitrary-sized byte chunks into whole 16-bit samples.
#[derive(Debug, Default)]
pub struct PcmAssembler {
    /// Low byte of a sample whose high byte has not arrived yet
    carry: Option<u8>,

    /// Total bytes pushed through this assembler
    total_bytes: usize,
}

impl PcmAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every sample it completes.
    ///
    /// ## Example:
    /// Pushing `[0x01]` yields nothing; pushing `[0x00, 0x02, 0x00]` afterwards
    /// yields `[1, 2]`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<i16> {
        self.total_bytes += chunk.len();

        let joined;
        let bytes: &[u8] = match self.carry.take() {
            Some(low) => {
                let mut buf = Vec::with_capacity(chunk.len() + 1);
                buf.push(low);
                buf.extend_from_slice(chunk);
                joined = buf;
                &joined
            }
            None => chunk,
        };

        let whole = bytes.len() - bytes.len() % BYTES_PER_SAMPLE;
        if whole < bytes.len() {
            self.carry = Some(bytes[whole]);
        }

        samples_from_le_bytes(&bytes[..whole])
    }

    /// Whether half a sample is waiting for its second byte.
    pub fn has_pending_byte(&self) -> bool {
        self.carry.is_some()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// Decode little-endian 16-bit PCM. A trailing odd byte is ignored.
pub fn samples_from_le_bytes(data: &[u8]) -> Vec<i16> {
    let whole = data.len() - data.len() % BYTES_PER_SAMPLE;
    let mut samples = vec![0i16; whole / BYTES_PER_SAMPLE];
    LittleEndian::read_i16_into(&data[..whole], &mut samples);
    samples
}

/// Decode little-endian 16-bit PCM, rejecting buffers that end mid-sample.
pub fn samples_from_le_bytes_exact(data: &[u8]) -> Result<Vec<i16>, String> {
    if data.len() % BYTES_PER_SAMPLE != 0 {
        return Err(format!(
            "PCM payload length {} is not a multiple of {} bytes",
            data.len(),
            BYTES_PER_SAMPLE
        ));
    }
    Ok(samples_from_le_bytes(data))
}

/// Encode samples as little-endian 16-bit PCM.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * BYTES_PER_SAMPLE];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}
