//! Session configuration.
//!
//! Credentials come from an external secrets collaborator; here that is the
//! process environment, the same way the demo binary supplies its API key.

use crate::transport::ReconnectPolicy;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Realtime provider endpoint, `ws://` or `wss://`.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    /// PCM sample rate in Hz, 16-bit mono assumed throughout.
    pub sample_rate: u32,
    /// Capture chunk cadence. 100 ms balances latency against per-chunk
    /// protocol overhead.
    pub chunk_ms: u64,
    /// Voice used when an agent utterance does not name one.
    pub voice_id: String,
    /// TTS collaborator endpoint. Empty means synthesis is disabled and the
    /// binary falls back to a silent synthesizer.
    pub tts_endpoint: String,
    pub reconnect: ReconnectPolicy,
    /// Chunks retained while the transport is reconnecting.
    pub buffer_chunks: usize,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: "general".to_string(),
            language: "en-US".to_string(),
            sample_rate: 16_000,
            chunk_ms: 100,
            voice_id: "default".to_string(),
            tts_endpoint: String::new(),
            reconnect: ReconnectPolicy::default(),
            buffer_chunks: 32,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Bytes per capture chunk: s16le mono at `sample_rate` for `chunk_ms`.
    pub fn chunk_bytes(&self) -> usize {
        (self.sample_rate as u64 * 2 * self.chunk_ms / 1000) as usize
    }

    /// Read configuration from `VOXLIVE_*` environment variables.
    /// `VOXLIVE_ENDPOINT` and `VOXLIVE_API_KEY` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            endpoint: require("VOXLIVE_ENDPOINT")?,
            api_key: require("VOXLIVE_API_KEY")?,
            ..Self::default()
        };
        if let Ok(model) = std::env::var("VOXLIVE_MODEL") {
            config.model = model;
        }
        if let Ok(language) = std::env::var("VOXLIVE_LANGUAGE") {
            config.language = language;
        }
        if let Ok(voice) = std::env::var("VOXLIVE_VOICE") {
            config.voice_id = voice;
        }
        if let Ok(tts) = std::env::var("VOXLIVE_TTS_ENDPOINT") {
            config.tts_endpoint = tts;
        }
        config.sample_rate = parse_var("VOXLIVE_SAMPLE_RATE", config.sample_rate)?;
        config.chunk_ms = parse_var("VOXLIVE_CHUNK_MS", config.chunk_ms)?;
        Ok(config)
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bytes_matches_cadence() {
        let config = SessionConfig::default();
        // 16 kHz * 2 bytes * 100 ms
        assert_eq!(config.chunk_bytes(), 3200);

        let config = SessionConfig {
            chunk_ms: 250,
            ..SessionConfig::default()
        };
        assert_eq!(config.chunk_bytes(), 8000);
    }
}
