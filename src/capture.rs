//! Audio capture: pulls PCM frames from an [`AudioSource`] and re-chunks
//! them into fixed-cadence [`AudioChunk`]s for the transport.
//!
//! The device itself sits behind the `AudioSource` trait so the capture
//! loop, sequencing, and flush behavior are testable without a microphone;
//! the real PulseAudio source lives behind the `pulse` cargo feature.

use crate::events::{AudioChunk, SessionEvent};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("no usable input device: {0}")]
    DeviceUnavailable(String),
    #[error("device read failed: {0}")]
    ReadFailed(String),
}

/// A raw PCM frame producer. Frames may be any size; the capturer
/// re-chunks them. Returning `Ok(None)` ends the stream.
#[async_trait]
pub trait AudioSource: Send {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;
}

/// Emits silence at roughly real-time cadence. Stands in for a microphone
/// when the `pulse` feature is off.
pub struct SilenceSource {
    frame_bytes: usize,
    cadence: Duration,
}

impl SilenceSource {
    pub fn new(sample_rate: u32, frame_ms: u64) -> Self {
        Self {
            frame_bytes: (sample_rate as u64 * 2 * frame_ms / 1000) as usize,
            cadence: Duration::from_millis(frame_ms),
        }
    }
}

#[async_trait]
impl AudioSource for SilenceSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        tokio::time::sleep(self.cadence).await;
        Ok(Some(vec![0u8; self.frame_bytes]))
    }
}

/// Owns the capture task for one listening stretch. Dropping the handle
/// without calling [`stop`](AudioCapturer::stop) aborts the task.
pub struct AudioCapturer {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AudioCapturer {
    /// Start pulling frames from `source`, emitting `chunk_bytes`-sized
    /// chunks as [`SessionEvent::Chunk`].
    pub fn start(
        mut source: Box<dyn AudioSource>,
        chunk_bytes: usize,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut pending: Vec<u8> = Vec::with_capacity(chunk_bytes * 2);
            let mut seq = 0u64;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    frame = source.next_frame() => match frame {
                        Ok(Some(data)) => {
                            pending.extend_from_slice(&data);
                            while pending.len() >= chunk_bytes {
                                let data: Vec<u8> = pending.drain(..chunk_bytes).collect();
                                if emit(&events, &mut seq, data).is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(None) => {
                            debug!("audio source ended");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "capture failed");
                            let _ = events.send(SessionEvent::CaptureFailed(e.to_string()));
                            return;
                        }
                    },
                }
            }

            // Flush the partial chunk so trailing speech is not lost.
            if !pending.is_empty() {
                let data = std::mem::take(&mut pending);
                let _ = emit(&events, &mut seq, data);
            }
            debug!(chunks = seq, "capture stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop capturing: the device is released and the buffered partial
    /// chunk is flushed before this returns. Safe to call twice.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for AudioCapturer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn emit(
    events: &mpsc::UnboundedSender<SessionEvent>,
    seq: &mut u64,
    data: Vec<u8>,
) -> Result<(), ()> {
    let chunk = AudioChunk {
        seq: *seq,
        captured_at: Instant::now(),
        data,
    };
    *seq += 1;
    events
        .send(SessionEvent::Chunk(chunk))
        .map_err(|_| ())
}
