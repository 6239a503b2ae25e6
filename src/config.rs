use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioEncoding, AudioFormat};
use crate::backend::NestBackendConfig;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionSettings,
    pub backend: NestBackendConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Inbound audio settings negotiated for every session.
#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Sample rate clients must send, in Hz
    pub sample_rate: u32,
    /// Channel count clients must send
    pub channels: u16,
    /// Fixed frame duration handed to the backend, in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // NEST streaming expects 16kHz
            channels: 1,        // Mono
            frame_duration_ms: 100,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// Decoded-frame buffer capacity; exceeding it fails the session
    pub frame_buffer_frames: usize,
    /// Bounded wait for the backend to finalize after end of audio
    pub finalize_timeout_secs: u64,
    /// Directory for caller-requested WAV capture
    pub capture_dir: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            frame_buffer_frames: 50,
            finalize_timeout_secs: 5,
            capture_dir: Some(PathBuf::from("captures")),
        }
    }
}

impl Config {
    /// Load from a config file plus `NEST_GATEWAY_*` environment overrides
    /// (e.g. `NEST_GATEWAY_BACKEND__CLIENT_SECRET`).
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("NEST_GATEWAY").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Derive the configuration for one new session.
    pub fn session_config(
        &self,
        session_id: Option<String>,
        language: Option<String>,
        capture: bool,
    ) -> SessionConfig {
        SessionConfig {
            session_id: session_id.unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4())),
            format: AudioFormat {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                encoding: AudioEncoding::Pcm16Le,
            },
            frame_duration_ms: self.audio.frame_duration_ms,
            frame_buffer_frames: self.session.frame_buffer_frames,
            finalize_timeout: Duration::from_secs(self.session.finalize_timeout_secs),
            language: language.unwrap_or_else(|| self.backend.language.clone()),
            capture_dir: if capture {
                self.session.capture_dir.clone()
            } else {
                None
            },
        }
    }
}
