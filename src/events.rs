//! Shared event and data types passed between session components.
//!
//! Ownership is hand-off only: a value is produced by one component, sent
//! over a channel, and consumed by exactly one other. Nothing here is
//! mutated after creation.

use crate::transport::{TransportClient, TransportError};
use std::time::Instant;

/// One fixed-cadence slice of captured audio. `seq` increases strictly
/// within a single capture run.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub seq: u64,
    pub captured_at: Instant,
    /// Raw PCM, 16-bit little-endian mono.
    pub data: Vec<u8>,
}

/// A transcript update from the provider. Interim fragments are revised
/// wholesale until a final fragment terminates the segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
    pub start_offset_ms: u64,
    pub end_offset_ms: u64,
    pub confidence: f32,
}

/// Parsed inbound traffic from the transport, after protocol decoding.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Provider acknowledged our config message.
    Ready,
    Transcript(TranscriptFragment),
    /// Voice-agent mode: the server decided what to say next.
    AgentUtterance {
        text: String,
        voice_id: Option<String>,
    },
    /// Provider-side error signal.
    ProviderError(String),
    /// The connection is gone and the retry budget is exhausted.
    ConnectionLost(String),
}

/// Status reports from the playback controller.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Started,
    /// One utterance failed; the queue keeps advancing.
    UtteranceFailed(String),
    /// Queue drained and nothing is playing.
    QueueIdle,
}

/// Commands the UI collaborator may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    BargeIn,
    Reset,
}

/// Everything the session runner consumes. All component callbacks funnel
/// into one queue so state mutation stays serialized.
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Server(ServerEvent),
    Playback(PlaybackEvent),
    Chunk(AudioChunk),
    /// Outcome of an in-flight connection attempt. Connecting happens off
    /// the runner task so commands stay responsive meanwhile.
    Connected(Result<TransportClient, TransportError>),
    CaptureFailed(String),
    /// Tear the runner down entirely (not a UI command).
    Shutdown,
}
