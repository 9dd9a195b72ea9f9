//! Wire format for the realtime voice provider.
//!
//! Outbound: one JSON config message right after connect, then raw binary
//! audio frames, then an optional JSON close message before the close
//! frame. Inbound: JSON messages tagged by `"type"`. Malformed inbound
//! traffic is dropped with a warning and never surfaces as an error.

use crate::events::{ServerEvent, TranscriptFragment};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Config {
        model: String,
        language: String,
        sample_rate: u32,
        encoding: String,
    },
    Close,
}

impl OutboundMessage {
    pub fn config(model: &str, language: &str, sample_rate: u32) -> Self {
        OutboundMessage::Config {
            model: model.to_string(),
            language: language.to_string(),
            sample_rate,
            encoding: "linear16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Ready,
    #[serde(rename_all = "camelCase")]
    Transcript {
        text: String,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        start_ms: u64,
        #[serde(default)]
        end_ms: u64,
        #[serde(default)]
        confidence: f32,
    },
    #[serde(rename_all = "camelCase")]
    AgentUtterance {
        text: String,
        #[serde(default)]
        voice_id: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Decode one inbound text frame. Returns `None` (with a warning) for
/// anything we cannot parse; the connection stays up either way.
pub fn parse_inbound(text: &str) -> Option<ServerEvent> {
    let msg: InboundMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, raw = text, "dropping malformed server message");
            return None;
        }
    };

    Some(match msg {
        InboundMessage::Ready => ServerEvent::Ready,
        InboundMessage::Transcript {
            text,
            is_final,
            start_ms,
            end_ms,
            confidence,
        } => ServerEvent::Transcript(TranscriptFragment {
            text,
            is_final,
            start_offset_ms: start_ms,
            end_offset_ms: end_ms,
            confidence,
        }),
        InboundMessage::AgentUtterance { text, voice_id } => {
            ServerEvent::AgentUtterance { text, voice_id }
        }
        InboundMessage::Error { message } => ServerEvent::ProviderError(message),
    })
}
