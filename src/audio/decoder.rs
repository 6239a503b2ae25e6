use tracing::debug;

use super::frame::{AudioEncoding, AudioFormat, AudioFrame};
use crate::error::{DecodeError, DecodeReason};

/// Configuration for the frame decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Negotiated session format; inbound audio must match it
    pub format: AudioFormat,
    /// Fixed frame duration in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            frame_duration_ms: 100,
        }
    }
}

/// Upper bound on bytes buffered while a WAV header is still incomplete.
/// Real headers fit in well under 1 KiB; a header that declares huge
/// pre-data chunks must not grow the buffer without bound.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Tracks whether the stream opened with a WAV header or is raw PCM.
#[derive(Debug)]
enum HeaderState {
    /// Not enough bytes yet to tell RIFF from raw PCM
    Undecided,
    /// RIFF prefix seen, still accumulating the header chunks
    Parsing,
    /// Header consumed (or never present); bytes are samples
    Pcm,
}

/// Normalizes arbitrarily chunked client audio into fixed-duration PCM frames.
///
/// Client chunk boundaries rarely align with frame boundaries, so up to one
/// frame's worth of bytes is carried across `submit` calls. A leading PCM16
/// WAV header is validated against the negotiated format and stripped; any
/// other container or encoding is rejected. One decoder instance serves one
/// session; restart means a fresh decoder.
pub struct FrameDecoder {
    config: DecoderConfig,
    frame_samples: usize,
    header: HeaderState,
    pending: Vec<u8>,
    sequence: u64,
    samples_emitted: u64,
    finished: bool,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        let frame_samples = config.format.samples_for_ms(config.frame_duration_ms);
        Self {
            config,
            frame_samples,
            header: HeaderState::Undecided,
            pending: Vec::new(),
            sequence: 0,
            samples_emitted: 0,
            finished: false,
        }
    }

    /// Interleaved samples per full frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Feed one client chunk; returns every full frame now available.
    ///
    /// Chunks must arrive in send order. Errors are fatal: the caller tears
    /// the session down rather than resubmitting.
    pub fn submit(&mut self, bytes: &[u8]) -> Result<Vec<AudioFrame>, DecodeError> {
        debug_assert!(!self.finished, "submit after finish");
        self.pending.extend_from_slice(bytes);

        if !matches!(self.header, HeaderState::Pcm) {
            if !self.try_consume_header()? {
                if self.pending.len() > MAX_HEADER_BYTES {
                    return Err(DecodeError::new(
                        DecodeReason::TruncatedHeader,
                        format!(
                            "WAV header still incomplete after {} bytes",
                            self.pending.len()
                        ),
                    ));
                }
                return Ok(Vec::new());
            }
        }

        let frame_bytes = self.frame_samples * 2;
        let mut frames = Vec::new();
        while self.pending.len() >= frame_bytes {
            let chunk: Vec<u8> = self.pending.drain(..frame_bytes).collect();
            frames.push(self.make_frame(&chunk, false));
        }
        Ok(frames)
    }

    /// Flush the trailing short frame, flagged as the end-of-audio marker.
    ///
    /// The final frame may be shorter than the fixed duration, or empty when
    /// the stream length was an exact frame multiple; either way it is
    /// emitted so the backend sees an explicit end of audio.
    pub fn finish(&mut self) -> Result<AudioFrame, DecodeError> {
        self.finished = true;

        if matches!(self.header, HeaderState::Undecided | HeaderState::Parsing)
            && !self.pending.is_empty()
            && self.pending.starts_with(b"RIFF")
        {
            return Err(DecodeError::new(
                DecodeReason::TruncatedHeader,
                "stream ended inside the WAV header",
            ));
        }

        if self.pending.len() % 2 != 0 {
            return Err(DecodeError::new(
                DecodeReason::TruncatedHeader,
                "stream ended mid-sample (odd byte count)",
            ));
        }

        let rest: Vec<u8> = self.pending.drain(..).collect();
        debug!(
            "Decoder flushed: {} frames emitted, {} trailing samples",
            self.sequence,
            rest.len() / 2
        );
        Ok(self.make_frame(&rest, true))
    }

    fn make_frame(&mut self, bytes: &[u8], end_of_audio: bool) -> AudioFrame {
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let format = &self.config.format;
        let offset_ms =
            self.samples_emitted * 1000 / (format.sample_rate as u64 * format.channels as u64);
        self.samples_emitted += samples.len() as u64;

        let frame = AudioFrame {
            samples,
            sequence: self.sequence,
            offset_ms,
            end_of_audio,
        };
        self.sequence += 1;
        frame
    }

    /// Returns true once sample bytes may be consumed.
    fn try_consume_header(&mut self) -> Result<bool, DecodeError> {
        if matches!(self.header, HeaderState::Undecided) {
            if self.pending.len() < 4 {
                return Ok(false);
            }
            if &self.pending[..4] != b"RIFF" {
                // Raw PCM stream, nothing to strip
                self.header = HeaderState::Pcm;
                return Ok(true);
            }
            self.header = HeaderState::Parsing;
        }

        // RIFF prefix confirmed; wait for the full descriptor
        if self.pending.len() < 12 {
            return Ok(false);
        }
        if &self.pending[8..12] != b"WAVE" {
            return Err(DecodeError::new(
                DecodeReason::UnsupportedEncoding,
                "RIFF container is not WAVE",
            ));
        }

        // Walk chunks until the data chunk; a valid WAV puts fmt first
        let mut pos = 12usize;
        let mut fmt_seen = false;
        loop {
            if self.pending.len() < pos + 8 {
                return Ok(false);
            }
            let id = &self.pending[pos..pos + 4];
            let size = u32::from_le_bytes([
                self.pending[pos + 4],
                self.pending[pos + 5],
                self.pending[pos + 6],
                self.pending[pos + 7],
            ]) as usize;

            if id == b"data" {
                if !fmt_seen {
                    return Err(DecodeError::new(
                        DecodeReason::TruncatedHeader,
                        "WAV data chunk before fmt chunk",
                    ));
                }
                self.pending.drain(..pos + 8);
                self.header = HeaderState::Pcm;
                return Ok(true);
            }

            if self.pending.len() < pos + 8 + size {
                return Ok(false);
            }
            if id == b"fmt " {
                self.check_fmt_chunk(pos + 8, size)?;
                fmt_seen = true;
            }
            pos += 8 + size + (size % 2); // chunks are word-aligned
        }
    }

    fn check_fmt_chunk(&self, at: usize, size: usize) -> Result<(), DecodeError> {
        if size < 16 {
            return Err(DecodeError::new(
                DecodeReason::TruncatedHeader,
                format!("WAV fmt chunk too short ({size} bytes)"),
            ));
        }
        let fmt = &self.pending[at..at + 16];
        let audio_format = u16::from_le_bytes([fmt[0], fmt[1]]);
        let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
        let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
        let bits_per_sample = u16::from_le_bytes([fmt[14], fmt[15]]);

        let expected = &self.config.format;
        debug_assert_eq!(expected.encoding, AudioEncoding::Pcm16Le);

        if audio_format != 1 || bits_per_sample != 16 {
            return Err(DecodeError::new(
                DecodeReason::UnsupportedEncoding,
                format!("WAV is format {audio_format}, {bits_per_sample}-bit; need PCM16"),
            ));
        }
        if channels != expected.channels {
            return Err(DecodeError::new(
                DecodeReason::UnsupportedEncoding,
                format!("WAV has {channels} channels, session negotiated {}", expected.channels),
            ));
        }
        if sample_rate != expected.sample_rate {
            return Err(DecodeError::new(
                DecodeReason::InvalidSampleRate,
                format!("WAV is {sample_rate}Hz, session negotiated {}Hz", expected.sample_rate),
            ));
        }
        Ok(())
    }
}
