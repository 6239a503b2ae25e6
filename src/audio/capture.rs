use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::frame::{AudioFormat, AudioFrame};

/// Writes a session's decoded audio to a WAV file.
///
/// Capture is opt-in per session: audio is persisted only when the caller
/// asked for it at start. The writer is finalized on the happy path and on
/// drop so a failed session still leaves a valid file behind.
pub struct SessionCapture {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    samples_written: usize,
}

impl SessionCapture {
    pub fn create(dir: impl AsRef<Path>, session_id: &str, format: &AudioFormat) -> Result<Self> {
        fs::create_dir_all(dir.as_ref()).context("Failed to create capture directory")?;

        let path = dir.as_ref().join(format!("{session_id}.wav"));
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Session capture started: {:?}", path);

        Ok(Self {
            writer: Some(writer),
            path,
            samples_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.samples_written += frame.samples.len();
        }
        Ok(())
    }

    /// Finalize the WAV and return its path.
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        info!(
            "Session capture complete: {:?} ({} samples)",
            self.path, self.samples_written
        );
        Ok(self.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionCapture {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
