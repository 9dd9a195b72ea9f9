//! voxlive - realtime voice streaming client.
//!
//! Captures microphone audio, streams it over a websocket to a realtime
//! transcription provider, aggregates interim and final transcript
//! fragments, and plays back synthesized agent responses. Everything is
//! coordinated by a single voice-session state machine that supports
//! barge-in and survives transient connection loss.

#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod events;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

/// Real microphone input (enabled with the "pulse" feature)
#[cfg(feature = "pulse")]
pub mod pulse_source;

pub use capture::{AudioCapturer, AudioSource, CaptureError, SilenceSource};
pub use config::{ConfigError, SessionConfig};
pub use events::{AudioChunk, PlaybackEvent, ServerEvent, SessionCommand, TranscriptFragment};
pub use playback::{
    AudioSink, HttpSynthesizer, NullSynthesizer, PlaybackController, PlaybackRequest, Priority,
    SynthesisError, Synthesizer, WavSink,
};
pub use session::{SessionSnapshot, SourceFactory, VoiceSession, VoiceSessionState};
pub use transcript::TranscriptAggregator;
pub use transport::{ConnectionState, ReconnectPolicy, TransportClient, TransportError};
