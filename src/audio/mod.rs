//! # Audio Formats
//!
//! Byte-level audio plumbing shared by the upload endpoint, the streaming
//! session and the synthesis endpoint.
//!
//! ## Audio Format Requirements:
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//! - **Sample Rate**: Whatever the client declares (streaming) or the WAV header says (upload)

pub mod pcm; // Raw PCM chunk reassembly and conversion
pub mod wav; // WAV container encoding/decoding
