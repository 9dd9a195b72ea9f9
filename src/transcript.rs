//! Transcript aggregation: merges interim and final fragments into one
//! running transcript.
//!
//! Invariants:
//! - at most one pending interim fragment exists, and it is replaced
//!   wholesale on every interim update;
//! - a final fragment appends to the finalized sequence and clears the
//!   pending interim;
//! - fragments that arrive out of order (end offset below the high-water
//!   mark) are discarded, so displayed text never regresses.

use crate::events::TranscriptFragment;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    finalized: Vec<String>,
    pending: Option<TranscriptFragment>,
    high_water_ms: u64,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the running transcript. Returns the segment
    /// text when the fragment finalizes a segment.
    pub fn on_fragment(&mut self, frag: TranscriptFragment) -> Option<String> {
        if frag.end_offset_ms < self.high_water_ms {
            warn!(
                end_ms = frag.end_offset_ms,
                high_water_ms = self.high_water_ms,
                "discarding out-of-order transcript fragment"
            );
            return None;
        }
        self.high_water_ms = frag.end_offset_ms;

        if frag.is_final {
            debug!(text = %frag.text, "segment finalized");
            self.pending = None;
            self.finalized.push(frag.text.clone());
            Some(frag.text)
        } else {
            self.pending = Some(frag);
            None
        }
    }

    /// Finalized text plus the pending interim, if any. Pure read.
    pub fn running_text(&self) -> String {
        let mut text = self.finalized.join(" ");
        if let Some(pending) = &self.pending {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&pending.text);
        }
        text
    }

    /// Clear all state. Called at session start and end.
    pub fn reset(&mut self) {
        self.finalized.clear();
        self.pending = None;
        self.high_water_ms = 0;
    }
}
