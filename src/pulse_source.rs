//! Microphone capture via PulseAudio's simple API.
//!
//! `Simple::read` is blocking, so the reads happen on a dedicated OS
//! thread that feeds frames into a channel; `next_frame` just awaits the
//! channel. Only built with the `pulse` feature.

use crate::capture::{AudioSource, CaptureError};
use async_trait::async_trait;
use libpulse_binding::error::PAErr;
use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FRAME_MS: u64 = 20;

pub struct PulseSource {
    frames_rx: mpsc::Receiver<Result<Vec<u8>, CaptureError>>,
}

impl PulseSource {
    /// Open the default input device, 16-bit little-endian mono PCM at
    /// `sample_rate`. The reader thread runs until the source is dropped.
    pub fn open(app_name: &str, sample_rate: u32) -> Result<Self, CaptureError> {
        let spec = Spec {
            format: Format::S16le,
            channels: 1,
            rate: sample_rate,
        };
        let simple = Simple::new(
            None, // default server
            app_name,
            Direction::Record,
            None, // default device
            "record",
            &spec,
            None, // default channel map
            None, // default buffering
        )
        .map_err(map_pa_err)?;

        let frame_bytes = (sample_rate as u64 * 2 * FRAME_MS / 1000) as usize;
        let (frames_tx, frames_rx) = mpsc::channel(8);

        std::thread::Builder::new()
            .name("pulse-capture".to_string())
            .spawn(move || {
                let mut buffer = vec![0u8; frame_bytes];
                loop {
                    let frame = match simple.read(&mut buffer) {
                        Ok(()) => Ok(buffer.clone()),
                        Err(e) => {
                            warn!(error = %e, "pulse read failed");
                            Err(CaptureError::ReadFailed(e.to_string()))
                        }
                    };
                    let fatal = frame.is_err();
                    if frames_tx.blocking_send(frame).is_err() {
                        // Consumer gone; release the device.
                        debug!("pulse capture thread exiting");
                        return;
                    }
                    if fatal {
                        return;
                    }
                }
            })
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        Ok(Self { frames_rx })
    }
}

#[async_trait]
impl AudioSource for PulseSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        match self.frames_rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

fn map_pa_err(e: PAErr) -> CaptureError {
    use libpulse_binding::error::Code;
    match Code::try_from(e) {
        Ok(Code::Access) => CaptureError::PermissionDenied,
        Ok(Code::NoEntity) => CaptureError::DeviceUnavailable("no such device".to_string()),
        _ => CaptureError::DeviceUnavailable(e.to_string()),
    }
}
