//! Playback controller: a FIFO queue of TTS requests with interrupt-now
//! support for barge-in.
//!
//! Synthesis and output sit behind traits so the queueing and cancellation
//! behavior is testable without a TTS provider or a sound device.

use crate::events::{PlaybackEvent, SessionEvent};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("TTS request failed: {0}")]
    Http(String),
    #[error("TTS provider error: {0}")]
    Provider(String),
    #[error("audio output failed: {0}")]
    Sink(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    /// Cancel whatever is playing and speak this next.
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub text: String,
    pub voice_id: String,
    pub priority: Priority,
}

impl PlaybackRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            priority: Priority::Normal,
        }
    }

    pub fn interrupt(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            priority: Priority::Interrupt,
            ..Self::new(text, voice_id)
        }
    }
}

/// Turns text into playable audio bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Plays (or otherwise consumes) synthesized audio. Implementations must
/// tolerate being cancelled mid-play; the controller drops the in-flight
/// future on barge-in.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<(), SynthesisError>;
}

enum PlaybackCmd {
    Enqueue(PlaybackRequest),
    Cancel,
    Shutdown,
}

pub struct PlaybackController {
    cmd_tx: mpsc::UnboundedSender<PlaybackCmd>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackController {
    pub fn spawn(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(synthesizer, sink, cmd_rx, events));
        Self {
            cmd_tx,
            task: Some(task),
        }
    }

    pub fn enqueue(&self, request: PlaybackRequest) {
        let _ = self.cmd_tx.send(PlaybackCmd::Enqueue(request));
    }

    /// Abort in-flight playback and drop anything still queued. No-op when
    /// idle.
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(PlaybackCmd::Cancel);
    }

    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(PlaybackCmd::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn run(
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    mut cmd_rx: mpsc::UnboundedReceiver<PlaybackCmd>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut queue: VecDeque<PlaybackRequest> = VecDeque::new();

    'outer: loop {
        let request = match queue.pop_front() {
            Some(request) => request,
            None => match cmd_rx.recv().await {
                Some(PlaybackCmd::Enqueue(request)) => request,
                Some(PlaybackCmd::Cancel) => continue, // nothing to cancel
                Some(PlaybackCmd::Shutdown) | None => break,
            },
        };

        debug!(text = %request.text, "speaking");
        let _ = events.send(SessionEvent::Playback(PlaybackEvent::Started));

        let speak = speak_one(synthesizer.as_ref(), sink.as_ref(), &request);
        tokio::pin!(speak);
        loop {
            tokio::select! {
                result = &mut speak => {
                    if let Err(e) = result {
                        warn!(error = %e, "utterance dropped, advancing queue");
                        let _ = events.send(SessionEvent::Playback(
                            PlaybackEvent::UtteranceFailed(e.to_string()),
                        ));
                    }
                    break;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(PlaybackCmd::Enqueue(next)) if next.priority == Priority::Interrupt => {
                        info!("interrupting current utterance");
                        queue.push_front(next);
                        break;
                    }
                    Some(PlaybackCmd::Enqueue(next)) => queue.push_back(next),
                    Some(PlaybackCmd::Cancel) => {
                        info!("playback cancelled");
                        queue.clear();
                        // Not QueueIdle: the caller drove this transition.
                        continue 'outer;
                    }
                    Some(PlaybackCmd::Shutdown) | None => break 'outer,
                },
            }
        }

        if queue.is_empty() {
            let _ = events.send(SessionEvent::Playback(PlaybackEvent::QueueIdle));
        }
    }
}

async fn speak_one(
    synthesizer: &dyn Synthesizer,
    sink: &dyn AudioSink,
    request: &PlaybackRequest,
) -> Result<(), SynthesisError> {
    let audio = synthesizer
        .synthesize(&request.text, &request.voice_id)
        .await?;
    sink.play(&audio).await
}

/// TTS collaborator over HTTP: posts `{text, voiceId}` and takes the
/// response body as audio bytes.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        let body = serde_json::json!({ "text": text, "voiceId": voice_id });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| SynthesisError::Provider(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Http(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SynthesisError::Provider("empty audio response".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Produces a short stretch of silence instead of calling a provider.
/// Used by the demo binary when no TTS endpoint is configured.
pub struct NullSynthesizer {
    pub sample_rate: u32,
}

#[async_trait]
impl Synthesizer for NullSynthesizer {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        // Half a second of s16le silence.
        Ok(vec![0u8; self.sample_rate as usize])
    }
}

/// Writes each utterance to a WAV file and sleeps for its real-time
/// duration, which gives barge-in a window to cancel into.
pub struct WavSink {
    dir: PathBuf,
    sample_rate: u32,
    counter: AtomicU64,
}

impl WavSink {
    pub fn new(dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            dir: dir.into(),
            sample_rate,
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for WavSink {
    async fn play(&self, audio: &[u8]) -> Result<(), SynthesisError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("utterance-{n:04}.wav"));
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer =
            WavWriter::create(&path, spec).map_err(|e| SynthesisError::Sink(e.to_string()))?;
        for sample in audio.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| SynthesisError::Sink(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthesisError::Sink(e.to_string()))?;
        debug!(path = %path.display(), "utterance written");

        let seconds = (audio.len() / 2) as f64 / self.sample_rate as f64;
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockSynthesizer {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Synthesizer for MockSynthesizer {
        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(SynthesisError::Provider("boom".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Records what was played; each play takes `hold` to finish.
    struct MockSink {
        played: Mutex<Vec<String>>,
        hold: Duration,
    }

    impl MockSink {
        fn new(hold: Duration) -> Arc<Self> {
            Arc::new(Self {
                played: Mutex::new(Vec::new()),
                hold,
            })
        }

        fn played(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioSink for MockSink {
        async fn play(&self, audio: &[u8]) -> Result<(), SynthesisError> {
            tokio::time::sleep(self.hold).await;
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(audio).to_string());
            Ok(())
        }
    }

    fn controller(
        fail_on: Option<&str>,
        hold: Duration,
    ) -> (
        PlaybackController,
        Arc<MockSink>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let sink = MockSink::new(hold);
        let (tx, rx) = mpsc::unbounded_channel();
        let ctl = PlaybackController::spawn(
            Arc::new(MockSynthesizer {
                fail_on: fail_on.map(String::from),
            }),
            sink.clone(),
            tx,
        );
        (ctl, sink, rx)
    }

    async fn next_playback(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> PlaybackEvent {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for playback event")
        {
            Some(SessionEvent::Playback(ev)) => ev,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn plays_queued_requests_in_order() {
        let (ctl, sink, mut rx) = controller(None, Duration::from_millis(5));
        ctl.enqueue(PlaybackRequest::new("one", "v"));
        ctl.enqueue(PlaybackRequest::new("two", "v"));

        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::QueueIdle));
        assert_eq!(sink.played(), vec!["one", "two"]);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn interrupt_priority_cancels_current_and_plays_next() {
        let (ctl, sink, mut rx) = controller(None, Duration::from_millis(200));
        ctl.enqueue(PlaybackRequest::new("A", "v"));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));

        // A is mid-play; B interrupts it.
        ctl.enqueue(PlaybackRequest::interrupt("B", "v"));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::QueueIdle));

        // A never finished, B did, queue is empty.
        assert_eq!(sink.played(), vec!["B"]);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn failed_synthesis_advances_the_queue() {
        let (ctl, sink, mut rx) = controller(Some("bad"), Duration::from_millis(5));
        ctl.enqueue(PlaybackRequest::new("bad", "v"));
        ctl.enqueue(PlaybackRequest::new("good", "v"));

        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(
            next_playback(&mut rx).await,
            PlaybackEvent::UtteranceFailed(_)
        ));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::QueueIdle));
        assert_eq!(sink.played(), vec!["good"]);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_on_empty_queue_is_a_no_op() {
        let (ctl, sink, mut rx) = controller(None, Duration::from_millis(5));
        ctl.cancel();
        ctl.enqueue(PlaybackRequest::new("after", "v"));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::QueueIdle));
        assert_eq!(sink.played(), vec!["after"]);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_and_clears_queue() {
        let (ctl, sink, mut rx) = controller(None, Duration::from_millis(200));
        ctl.enqueue(PlaybackRequest::new("A", "v"));
        ctl.enqueue(PlaybackRequest::new("B", "v"));
        assert!(matches!(next_playback(&mut rx).await, PlaybackEvent::Started));

        ctl.cancel();
        // Give the controller time to act, then confirm nothing played and
        // no further events arrived.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sink.played().is_empty());
        assert!(rx.try_recv().is_err());
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn wav_sink_writes_playable_file() {
        let dir = std::env::temp_dir().join(format!("voxlive-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sink = WavSink::new(&dir, 16_000);
        // 100 samples of silence.
        sink.play(&vec![0u8; 200]).await.unwrap();
        let path = dir.join("utterance-0000.wav");
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 100);
        std::fs::remove_dir_all(&dir).ok();
    }
}
