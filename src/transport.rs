//! Streaming transport client: one bidirectional WebSocket to the realtime
//! voice provider, with automatic reconnection.
//!
//! The public handle only hands commands to the connection task; the task
//! owns the socket and is the single place connection state changes.

use crate::config::SessionConfig;
use crate::events::{AudioChunk, ServerEvent};
use crate::protocol::{self, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::{http, Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("provider rejected credentials")]
    AuthRejected,
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("timed out establishing connection")]
    Timeout,
    #[error("connection lost after exhausting retries")]
    ConnectionLost,
    #[error("transport is not connected")]
    NotConnected,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Backoff policy for automatic reconnection. Kept as a standalone object
/// so retry behavior is unit-testable without any socket.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Fractional jitter applied to each delay, e.g. 0.2 for ±20 %.
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
            jitter: 0.2,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based): capped exponential with
    /// jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let capped = self.base.saturating_mul(1u32 << exp).min(self.cap);
        if self.jitter <= 0.0 {
            return capped;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        capped.mul_f64(factor.max(0.0))
    }
}

#[derive(Debug)]
enum TransportCmd {
    Send(AudioChunk),
    Close,
}

#[derive(Debug)]
pub struct TransportClient {
    cmd_tx: mpsc::UnboundedSender<TransportCmd>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl TransportClient {
    /// Open the connection and send the initial config message. Parsed
    /// inbound events are delivered on `events_tx`.
    pub async fn connect(
        config: SessionConfig,
        events_tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Self, TransportError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let mut ws = match open_socket(&config).await {
            Ok(ws) => ws,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        if let Err(e) = send_config(&mut ws, &config).await {
            state_tx.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }
        info!(endpoint = %config.endpoint, "transport connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(ws, config, cmd_rx, state_tx, events_tx));

        Ok(Self {
            cmd_tx,
            state_rx,
            task: Some(task),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Hand an audio chunk to the connection task. While reconnecting the
    /// task buffers a bounded number of chunks; once closed the chunk is
    /// dropped.
    pub fn send(&self, chunk: AudioChunk) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Closed {
            warn!(seq = chunk.seq, "dropping audio chunk, transport closed");
            return Err(TransportError::NotConnected);
        }
        self.cmd_tx
            .send(TransportCmd::Send(chunk))
            .map_err(|_| TransportError::NotConnected)
    }

    /// Graceful shutdown: close message, close frame, task joined.
    /// Idempotent by construction (consumes the handle).
    pub async fn close(mut self) {
        let _ = self.cmd_tx.send(TransportCmd::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn build_url(config: &SessionConfig) -> Result<Url, TransportError> {
    let mut url = Url::parse(&config.endpoint)
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("encoding", "linear16");
    Ok(url)
}

fn build_request(url: &Url, api_key: &str) -> Result<http::Request<()>, TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidEndpoint("missing host".to_string()))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    http::Request::builder()
        .uri(url.as_str())
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Authorization", format!("Token {api_key}"))
        .body(())
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))
}

fn classify_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(resp) if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 => {
            TransportError::AuthRejected
        }
        other => TransportError::NetworkUnreachable(other.to_string()),
    }
}

async fn open_socket(config: &SessionConfig) -> Result<WsStream, TransportError> {
    let url = build_url(config)?;
    let request = build_request(&url, &config.api_key)?;
    debug!(url = %url, "opening websocket");
    let (ws, _resp) = timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(classify_ws_error)?;
    Ok(ws)
}

async fn send_config(ws: &mut WsStream, config: &SessionConfig) -> Result<(), TransportError> {
    let msg = OutboundMessage::config(&config.model, &config.language, config.sample_rate);
    let json = serde_json::to_string(&msg)
        .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;
    ws.send(Message::Text(json.into()))
        .await
        .map_err(classify_ws_error)
}

/// Move every already-queued command into the bounded buffer, so chunks
/// that piled up while a handshake was in flight still obey the cap.
/// Returns true when a close was requested or every sender is gone.
fn drain_commands(
    cmd_rx: &mut mpsc::UnboundedReceiver<TransportCmd>,
    buffer: &mut VecDeque<AudioChunk>,
    cap: usize,
) -> bool {
    loop {
        match cmd_rx.try_recv() {
            Ok(TransportCmd::Send(chunk)) => buffer_chunk(buffer, chunk, cap),
            Ok(TransportCmd::Close) => return true,
            Err(mpsc::error::TryRecvError::Empty) => return false,
            Err(mpsc::error::TryRecvError::Disconnected) => return true,
        }
    }
}

fn buffer_chunk(buffer: &mut VecDeque<AudioChunk>, chunk: AudioChunk, cap: usize) {
    if buffer.len() >= cap {
        if let Some(dropped) = buffer.pop_front() {
            warn!(
                seq = dropped.seq,
                "reconnect buffer full, dropping oldest audio chunk"
            );
        }
    }
    buffer.push_back(chunk);
}

/// Connection task. Owns the socket; loops between a connected phase and a
/// reconnect phase until closed or the retry budget runs out.
async fn run(
    mut ws: WsStream,
    config: SessionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCmd>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut buffer: VecDeque<AudioChunk> = VecDeque::new();

    'conn: loop {
        state_tx.send_replace(ConnectionState::Connected);

        // Flush anything buffered while we were away.
        while let Some(chunk) = buffer.pop_front() {
            if let Err(e) = ws.send(Message::Binary(chunk.data.clone().into())).await {
                warn!(error = %e, "send failed while flushing buffer");
                buffer.push_front(chunk);
                break;
            }
        }

        // Connected phase; left only by error, server close, or Close cmd.
        while buffer.is_empty() {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(TransportCmd::Send(chunk)) => {
                        if let Err(e) = ws.send(Message::Binary(chunk.data.clone().into())).await {
                            warn!(error = %e, "send failed, reconnecting");
                            buffer_chunk(&mut buffer, chunk, config.buffer_chunks);
                            break;
                        }
                    }
                    Some(TransportCmd::Close) | None => {
                        debug!("closing transport");
                        if let Ok(json) = serde_json::to_string(&OutboundMessage::Close) {
                            let _ = ws.send(Message::Text(json.into())).await;
                        }
                        let _ = ws.close(None).await;
                        state_tx.send_replace(ConnectionState::Closed);
                        return;
                    }
                },
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = protocol::parse_inbound(&text) {
                            if events_tx.send(event).is_err() {
                                // Nobody listens anymore; shut down.
                                let _ = ws.close(None).await;
                                state_tx.send_replace(ConnectionState::Closed);
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error, reconnecting");
                        break;
                    }
                    None => {
                        info!("websocket stream ended");
                        break;
                    }
                },
            }
        }

        // Reconnect phase.
        state_tx.send_replace(ConnectionState::Reconnecting);
        let mut attempt = 0u32;
        ws = loop {
            attempt += 1;
            if attempt > config.reconnect.max_attempts {
                warn!(
                    attempts = config.reconnect.max_attempts,
                    "reconnect attempts exhausted"
                );
                state_tx.send_replace(ConnectionState::Closed);
                let _ = events_tx.send(ServerEvent::ConnectionLost(format!(
                    "gave up after {} attempts",
                    config.reconnect.max_attempts
                )));
                return;
            }

            let delay = config.reconnect.delay(attempt);
            debug!(attempt, ?delay, "reconnecting");
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(TransportCmd::Send(chunk)) => {
                            buffer_chunk(&mut buffer, chunk, config.buffer_chunks);
                        }
                        Some(TransportCmd::Close) | None => {
                            state_tx.send_replace(ConnectionState::Closed);
                            return;
                        }
                    },
                }
            }

            if drain_commands(&mut cmd_rx, &mut buffer, config.buffer_chunks) {
                state_tx.send_replace(ConnectionState::Closed);
                return;
            }

            match open_socket(&config).await {
                Ok(mut ws) => {
                    // Chunks that arrived during the handshake.
                    if drain_commands(&mut cmd_rx, &mut buffer, config.buffer_chunks) {
                        state_tx.send_replace(ConnectionState::Closed);
                        return;
                    }
                    match send_config(&mut ws, &config).await {
                        Ok(()) => {
                            info!(attempt, "reconnected");
                            break ws;
                        }
                        Err(e) => warn!(error = %e, "config send failed after reconnect"),
                    }
                }
                Err(TransportError::AuthRejected) => {
                    // Credentials will not get better by retrying.
                    warn!("authentication rejected during reconnect");
                    state_tx.send_replace(ConnectionState::Closed);
                    let _ = events_tx.send(ServerEvent::ConnectionLost(
                        "authentication rejected".to_string(),
                    ));
                    return;
                }
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
        };
        continue 'conn;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn test_config(addr: std::net::SocketAddr) -> SessionConfig {
        SessionConfig {
            endpoint: format!("ws://{addr}"),
            api_key: "test-key".to_string(),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
                jitter: 0.0,
                max_attempts: 3,
            },
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        }
    }

    fn chunk(seq: u64, data: &[u8]) -> AudioChunk {
        AudioChunk {
            seq,
            captured_at: Instant::now(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn reconnect_delay_is_capped_exponential_with_jitter() {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
            jitter: 0.2,
            max_attempts: 5,
        };
        for _ in 0..50 {
            let d1 = policy.delay(1);
            assert!(d1 >= Duration::from_millis(400) && d1 <= Duration::from_millis(600));
            let d3 = policy.delay(3);
            assert!(d3 >= Duration::from_millis(1600) && d3 <= Duration::from_millis(2400));
            let d10 = policy.delay(10);
            assert!(d10 >= Duration::from_millis(6400) && d10 <= Duration::from_millis(9600));
        }
    }

    #[test]
    fn zero_jitter_delay_is_deterministic() {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(1),
            jitter: 0.0,
            max_attempts: 5,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(8), Duration::from_secs(1));
    }

    #[test]
    fn buffer_drops_oldest_on_overflow() {
        let mut buffer = VecDeque::new();
        for seq in 0..5 {
            buffer_chunk(&mut buffer, chunk(seq, &[0]), 3);
        }
        let seqs: Vec<u64> = buffer.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn url_carries_stream_parameters() {
        let config = SessionConfig {
            endpoint: "wss://example.com/v1/listen".to_string(),
            ..SessionConfig::default()
        };
        let url = build_url(&config).unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("model=general"));
        assert!(query.contains("language=en-US"));
        assert!(query.contains("sample_rate=16000"));
        assert!(query.contains("encoding=linear16"));
    }

    #[tokio::test]
    async fn connect_sends_config_then_audio_and_dispatches_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // First frame is the config message.
            let first = ws.next().await.unwrap().unwrap();
            let config: serde_json::Value =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(config["type"], "config");
            assert_eq!(config["sampleRate"], 16_000);

            ws.send(Message::Text(json!({"type": "ready"}).to_string().into()))
                .await
                .unwrap();

            // Audio arrives as binary frames, in order.
            let audio = ws.next().await.unwrap().unwrap();
            assert_eq!(audio.into_data().as_ref(), &[1u8, 2, 3][..]);

            ws.send(Message::Text(
                json!({
                    "type": "transcript",
                    "text": "hello",
                    "isFinal": true,
                    "startMs": 0,
                    "endMs": 500,
                    "confidence": 0.95
                })
                .to_string()
                .into(),
            ))
            .await
            .unwrap();

            // Graceful close: close message then close frame.
            let close_msg = ws.next().await.unwrap().unwrap();
            let close_json: serde_json::Value =
                serde_json::from_str(close_msg.to_text().unwrap()).unwrap();
            assert_eq!(close_json["type"], "close");
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let client = TransportClient::connect(test_config(addr), events_tx)
            .await
            .unwrap();

        assert!(matches!(
            events_rx.recv().await,
            Some(ServerEvent::Ready)
        ));
        assert_eq!(client.state(), ConnectionState::Connected);

        client.send(chunk(0, &[1, 2, 3])).unwrap();

        match events_rx.recv().await {
            Some(ServerEvent::Transcript(frag)) => {
                assert_eq!(frag.text, "hello");
                assert!(frag.is_final);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let state_rx = client.watch_state();
        client.close().await;
        assert_eq!(*state_rx.borrow(), ConnectionState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_unexpected_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: take the config, then drop abruptly.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await.unwrap().unwrap();
            drop(ws);

            // Second connection: accept and answer ready.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let config = ws.next().await.unwrap().unwrap();
            assert!(config.is_text());
            ws.send(Message::Text(json!({"type": "ready"}).to_string().into()))
                .await
                .unwrap();
            // Hold the connection open until the client closes.
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let client = TransportClient::connect(test_config(addr), events_tx)
            .await
            .unwrap();

        // Ready only arrives on the second connection.
        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("timed out waiting for reconnect");
        assert!(matches!(event, Some(ServerEvent::Ready)));
        assert_eq!(client.state(), ConnectionState::Connected);
        client.close().await;
        server.await.unwrap();
    }

    /// Drops the first connection after the config message, then waits for
    /// the resume signal before accepting again. Returns the sequence
    /// markers of the binary frames seen on the second connection.
    async fn outage_server(
        listener: TcpListener,
        resume_rx: tokio::sync::oneshot::Receiver<()>,
        expect_frames: usize,
    ) -> Vec<u8> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _config = ws.next().await.unwrap().unwrap();
        drop(ws);

        resume_rx.await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let config = ws.next().await.unwrap().unwrap();
        assert!(config.is_text());

        let mut seqs = Vec::new();
        while seqs.len() < expect_frames {
            let msg = ws.next().await.unwrap().unwrap();
            if msg.is_binary() {
                seqs.push(msg.into_data()[0]);
            }
        }
        seqs
    }

    async fn wait_for_reconnecting(client: &TransportClient) {
        let mut state_rx = client.watch_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            while *state_rx.borrow() != ConnectionState::Reconnecting {
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("transport never started reconnecting");
    }

    #[tokio::test]
    async fn reconnect_flushes_buffered_chunks_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (resume_tx, resume_rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(outage_server(listener, resume_rx, 3));

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let client = TransportClient::connect(test_config(addr), events_tx)
            .await
            .unwrap();
        wait_for_reconnecting(&client).await;

        // Chunks handed over mid-outage land in the buffer and must come
        // out in sequence order, after the config message.
        for seq in 0..3u64 {
            client.send(chunk(seq, &[seq as u8])).unwrap();
        }
        resume_tx.send(()).unwrap();

        let seqs = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("timed out waiting for flushed chunks")
            .unwrap();
        assert_eq!(seqs, vec![0, 1, 2]);
        client.close().await;
    }

    #[tokio::test]
    async fn reconnect_buffer_keeps_only_latest_chunks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (resume_tx, resume_rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(outage_server(listener, resume_rx, 2));

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            buffer_chunks: 2,
            ..test_config(addr)
        };
        let client = TransportClient::connect(config, events_tx).await.unwrap();
        wait_for_reconnecting(&client).await;

        // Five chunks against a two-chunk cap: only the newest survive.
        for seq in 0..5u64 {
            client.send(chunk(seq, &[seq as u8])).unwrap();
        }
        resume_tx.send(()).unwrap();

        let seqs = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("timed out waiting for flushed chunks")
            .unwrap();
        assert_eq!(seqs, vec![3, 4]);
        client.close().await;
    }

    #[tokio::test]
    async fn exhausted_retries_surface_connection_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await.unwrap().unwrap();
            drop(ws);
            // Listener dropped here: every retry gets connection refused.
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let client = TransportClient::connect(test_config(addr), events_tx)
            .await
            .unwrap();
        server.await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("timed out waiting for connection-lost");
        assert!(matches!(event, Some(ServerEvent::ConnectionLost(_))));

        let mut state_rx = client.watch_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            while *state_rx.borrow() != ConnectionState::Closed {
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("transport never reached Closed");
    }

    #[tokio::test]
    async fn initial_connect_failure_reports_reason() {
        // Nothing listens on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let err = TransportClient::connect(test_config(addr), events_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NetworkUnreachable(_)));
    }
}
