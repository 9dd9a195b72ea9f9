//! Voice session state machine and runner.
//!
//! The FSM is a plain struct: `on_event` matches `(state, event)` pairs,
//! mutates the state, and pushes side effects as [`Action`]s that the
//! runner drains and applies. Transitions not listed are logged no-ops, so
//! a stray event can never corrupt the session.
//!
//! The runner is the single consumer of the session event queue; every
//! component reports into it and all state mutation happens there.

use crate::capture::{AudioCapturer, AudioSource, CaptureError};
use crate::config::SessionConfig;
use crate::events::{PlaybackEvent, ServerEvent, SessionCommand, SessionEvent};
use crate::playback::{AudioSink, PlaybackController, PlaybackRequest, Synthesizer};
use crate::transcript::TranscriptAggregator;
use crate::transport::TransportClient;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

/// Read-only view for the UI collaborator.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: VoiceSessionState,
    pub transcript: String,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            state: VoiceSessionState::Idle,
            transcript: String::new(),
            last_error: None,
        }
    }
}

/// Events the FSM consumes, after the runner has folded transcripts and
/// mapped component reports.
#[derive(Debug)]
enum FsmEvent {
    Start,
    Stop,
    BargeIn,
    Reset,
    SegmentFinalized,
    ResponseReady(PlaybackRequest),
    PlaybackIdle,
    Fatal(String),
}

/// Side effects requested by a transition, applied by the runner in order.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    ResetTranscript,
    Connect,
    StartCapture,
    StopCapture,
    CloseTransport,
    CancelPlayback,
    Speak(PlaybackRequest),
}

struct SessionFsm {
    state: VoiceSessionState,
    last_error: Option<String>,
    actions: Vec<Action>,
}

impl SessionFsm {
    fn new() -> Self {
        Self {
            state: VoiceSessionState::Idle,
            last_error: None,
            actions: Vec::new(),
        }
    }

    fn state(&self) -> VoiceSessionState {
        self.state
    }

    fn last_error(&self) -> Option<&String> {
        self.last_error.as_ref()
    }

    fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    fn on_event(&mut self, event: FsmEvent) {
        use VoiceSessionState::*;

        match (self.state, event) {
            (Idle, FsmEvent::Start) => {
                info!("session starting");
                self.actions.push(Action::ResetTranscript);
                self.actions.push(Action::Connect);
                self.actions.push(Action::StartCapture);
                self.state = Listening;
            }

            // User stopped talking; wait for something to speak.
            (Listening, FsmEvent::SegmentFinalized) => {
                self.actions.push(Action::StopCapture);
                self.state = Processing;
            }

            (Processing, FsmEvent::ResponseReady(request)) => {
                self.actions.push(Action::Speak(request));
                self.state = Speaking;
            }

            // Voice-agent mode can answer before the client sees a final
            // segment; treat it like an ordinary response.
            (Listening, FsmEvent::ResponseReady(request)) => {
                self.actions.push(Action::StopCapture);
                self.actions.push(Action::Speak(request));
                self.state = Speaking;
            }

            // Follow-up utterances extend the current speaking turn.
            (Speaking, FsmEvent::ResponseReady(request)) => {
                self.actions.push(Action::Speak(request));
            }

            (Speaking, FsmEvent::PlaybackIdle) => {
                self.actions.push(Action::StartCapture);
                self.state = Listening;
            }

            // Barge-in: exactly one cancel, then back to listening.
            (Speaking, FsmEvent::BargeIn) => {
                info!("barge-in, cancelling playback");
                self.actions.push(Action::CancelPlayback);
                self.actions.push(Action::StartCapture);
                self.state = Listening;
            }

            // Explicit stop is valid from every non-Error state and always
            // runs the full cascade.
            (Idle | Listening | Processing | Speaking, FsmEvent::Stop) => {
                info!("session stopping");
                self.push_cascade();
                self.actions.push(Action::ResetTranscript);
                self.state = Idle;
            }

            (Error, FsmEvent::Reset) => {
                info!("session reset after error");
                self.last_error = None;
                self.state = Idle;
            }

            (Error, FsmEvent::Fatal(reason)) => {
                // Keep the first error; the cascade already ran.
                debug!(reason, "further error while already failed");
            }

            (_, FsmEvent::Fatal(reason)) => {
                warn!(reason, "fatal session error");
                self.push_cascade();
                self.last_error = Some(reason);
                self.state = Error;
            }

            (state, event) => {
                debug!(?state, ?event, "ignoring event in this state");
            }
        }
    }

    fn push_cascade(&mut self) {
        self.actions.push(Action::StopCapture);
        self.actions.push(Action::CloseTransport);
        self.actions.push(Action::CancelPlayback);
    }
}

/// Creates a fresh [`AudioSource`] each time the session enters
/// `Listening`.
pub type SourceFactory =
    Arc<dyn Fn() -> Result<Box<dyn AudioSource>, CaptureError> + Send + Sync>;

/// One user-facing voice session. Owns capture, transport, aggregation,
/// and playback; exposes commands and a snapshot for the UI.
pub struct VoiceSession {
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub fn spawn(
        config: SessionConfig,
        source_factory: SourceFactory,
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());

        let runner = Runner {
            config,
            source_factory,
            events_tx: events_tx.clone(),
            events_rx,
            snapshot_tx,
            fsm: SessionFsm::new(),
            aggregator: TranscriptAggregator::new(),
            transport: None,
            capturer: None,
            playback: None,
            synthesizer,
            sink,
        };
        let task = tokio::spawn(runner.run());

        Self {
            events_tx,
            snapshot_rx,
            task: Some(task),
        }
    }

    pub fn start(&self) {
        self.command(SessionCommand::Start);
    }

    pub fn stop(&self) {
        self.command(SessionCommand::Stop);
    }

    pub fn barge_in(&self) {
        self.command(SessionCommand::BargeIn);
    }

    pub fn reset(&self) {
        self.command(SessionCommand::Reset);
    }

    fn command(&self, cmd: SessionCommand) {
        let _ = self.events_tx.send(SessionEvent::Command(cmd));
    }

    /// Client-driven playback, outside agent mode.
    pub fn speak(&self, request: PlaybackRequest) {
        let _ = self
            .events_tx
            .send(SessionEvent::Server(ServerEvent::AgentUtterance {
                text: request.text,
                voice_id: Some(request.voice_id),
            }));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch snapshot changes.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Tear the session down completely, releasing the device and socket.
    pub async fn shutdown(mut self) {
        let _ = self.events_tx.send(SessionEvent::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

struct Runner {
    config: SessionConfig,
    source_factory: SourceFactory,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    fsm: SessionFsm,
    aggregator: TranscriptAggregator,
    transport: Option<TransportClient>,
    capturer: Option<AudioCapturer>,
    playback: Option<PlaybackController>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
}

impl Runner {
    async fn run(mut self) {
        self.playback = Some(PlaybackController::spawn(
            self.synthesizer.clone(),
            self.sink.clone(),
            self.events_tx.clone(),
        ));

        // Transport events are forwarded into the single session queue so
        // everything is handled on one task.
        let (server_tx, mut server_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let forward_tx = self.events_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = server_rx.recv().await {
                if forward_tx.send(SessionEvent::Server(event)).is_err() {
                    break;
                }
            }
        });

        while let Some(event) = self.events_rx.recv().await {
            let shutdown = matches!(event, SessionEvent::Shutdown);
            self.handle_event(event);
            self.apply_actions(&server_tx).await;
            self.publish_snapshot();
            if shutdown {
                break;
            }
        }

        // Shutdown path: cascade already ran via the Stop event the
        // handler injects; release the playback task last.
        if let Some(playback) = self.playback.take() {
            playback.shutdown().await;
        }
        forwarder.abort();
        debug!("session runner finished");
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(SessionCommand::Start) => self.fsm.on_event(FsmEvent::Start),
            SessionEvent::Command(SessionCommand::Stop) => self.fsm.on_event(FsmEvent::Stop),
            SessionEvent::Command(SessionCommand::BargeIn) => {
                self.fsm.on_event(FsmEvent::BargeIn)
            }
            SessionEvent::Command(SessionCommand::Reset) => self.fsm.on_event(FsmEvent::Reset),

            SessionEvent::Server(ServerEvent::Ready) => {
                debug!("provider ready");
            }
            SessionEvent::Server(ServerEvent::Transcript(frag)) => {
                if self.aggregator.on_fragment(frag).is_some() {
                    self.fsm.on_event(FsmEvent::SegmentFinalized);
                }
            }
            SessionEvent::Server(ServerEvent::AgentUtterance { text, voice_id }) => {
                let voice = voice_id.unwrap_or_else(|| self.config.voice_id.clone());
                self.fsm
                    .on_event(FsmEvent::ResponseReady(PlaybackRequest::new(text, voice)));
            }
            SessionEvent::Server(ServerEvent::ProviderError(message)) => {
                self.fsm.on_event(FsmEvent::Fatal(message));
            }
            SessionEvent::Server(ServerEvent::ConnectionLost(reason)) => {
                self.fsm.on_event(FsmEvent::Fatal(reason));
            }

            SessionEvent::Playback(PlaybackEvent::Started) => {}
            SessionEvent::Playback(PlaybackEvent::UtteranceFailed(reason)) => {
                warn!(reason, "utterance failed");
            }
            SessionEvent::Playback(PlaybackEvent::QueueIdle) => {
                self.fsm.on_event(FsmEvent::PlaybackIdle);
            }

            SessionEvent::Chunk(chunk) => {
                if let Some(transport) = &self.transport {
                    let _ = transport.send(chunk);
                }
            }
            SessionEvent::Connected(Ok(client)) => {
                let active = !matches!(
                    self.fsm.state(),
                    VoiceSessionState::Idle | VoiceSessionState::Error
                );
                if active && self.transport.is_none() {
                    self.transport = Some(client);
                } else {
                    // The session moved on while the handshake ran.
                    debug!("discarding connection established after stop");
                    tokio::spawn(client.close());
                }
            }
            SessionEvent::Connected(Err(e)) => {
                if self.fsm.state() == VoiceSessionState::Idle {
                    debug!(error = %e, "ignoring connect failure after stop");
                } else {
                    self.fsm.on_event(FsmEvent::Fatal(e.to_string()));
                }
            }

            SessionEvent::CaptureFailed(reason) => {
                self.fsm.on_event(FsmEvent::Fatal(reason));
            }

            SessionEvent::Shutdown => {
                // Run the normal stop cascade before the runner exits.
                self.fsm.on_event(FsmEvent::Stop);
            }
        }
    }

    async fn apply_actions(&mut self, server_tx: &mpsc::UnboundedSender<ServerEvent>) {
        // Applying an action can raise a new fatal event, which in turn
        // pushes more actions; loop until quiescent.
        loop {
            let actions = self.fsm.drain_actions();
            if actions.is_empty() {
                break;
            }
            for action in actions {
                self.apply(action, server_tx).await;
            }
        }
    }

    async fn apply(&mut self, action: Action, server_tx: &mpsc::UnboundedSender<ServerEvent>) {
        match action {
            Action::ResetTranscript => self.aggregator.reset(),

            Action::Connect => {
                // Off-task so a stop() issued mid-handshake is not stuck
                // behind the connect timeout.
                let config = self.config.clone();
                let server_tx = server_tx.clone();
                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = TransportClient::connect(config, server_tx).await;
                    let _ = events_tx.send(SessionEvent::Connected(result));
                });
            }

            Action::StartCapture => {
                if self.capturer.is_some() {
                    return;
                }
                match (self.source_factory)() {
                    Ok(source) => {
                        self.capturer = Some(AudioCapturer::start(
                            source,
                            self.config.chunk_bytes(),
                            self.events_tx.clone(),
                        ));
                    }
                    Err(e) => self.fsm.on_event(FsmEvent::Fatal(e.to_string())),
                }
            }

            Action::StopCapture => {
                if let Some(capturer) = self.capturer.take() {
                    capturer.stop().await;
                }
            }

            Action::CloseTransport => {
                if let Some(transport) = self.transport.take() {
                    transport.close().await;
                }
            }

            Action::CancelPlayback => {
                if let Some(playback) = &self.playback {
                    playback.cancel();
                }
            }

            Action::Speak(request) => {
                if let Some(playback) = &self.playback {
                    playback.enqueue(request);
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.fsm.state(),
            transcript: self.aggregator.running_text(),
            last_error: self.fsm.last_error().cloned(),
        });
    }
}
