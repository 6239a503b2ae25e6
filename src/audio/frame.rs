use serde::{Deserialize, Serialize};

/// Sample encodings accepted from clients.
///
/// The backend takes 16-bit little-endian PCM; anything else is rejected at
/// the decoder rather than transcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioEncoding {
    Pcm16Le,
}

/// Negotiated audio format for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Sample encoding
    pub encoding: AudioEncoding,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // NEST streaming expects 16kHz
            channels: 1,        // Mono
            encoding: AudioEncoding::Pcm16Le,
        }
    }
}

impl AudioFormat {
    /// Interleaved sample count for a span of the given duration.
    pub fn samples_for_ms(&self, ms: u64) -> usize {
        (self.sample_rate as u64 * self.channels as u64 * ms / 1000) as usize
    }
}

/// One fixed-duration slice of decoded PCM audio.
///
/// Produced by the frame decoder and moved stage to stage; never mutated
/// after production.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Monotonically increasing per-session sequence number
    pub sequence: u64,
    /// Offset in milliseconds since the start of the session's audio
    pub offset_ms: u64,
    /// Marks the (possibly empty, possibly short) last frame of the stream
    pub end_of_audio: bool,
}

impl AudioFrame {
    /// Samples re-serialized as little-endian PCM bytes for the wire.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}
