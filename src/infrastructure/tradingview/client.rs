//! Stream Client
//!
//! Owns the single WebSocket connection to the provider. The socket never
//! leaves this module: the rest of the system sees only `send(message)`,
//! `reconnect()`, and the event stream.
//!
//! One task runs [`StreamClient::run`], which dials, performs the auth
//! bootstrap (`set_auth_token` then `set_locale`), then reads frames until
//! the connection fails. Failures reconnect with exponential backoff; when
//! attempts are exhausted the supervisor parks in `Disconnected` until an
//! operator-triggered reconnect arrives. Exactly one reconnect attempt is
//! ever in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionError, ConnectionState, StreamConnection};
use crate::infrastructure::tradingview::auth::{AuthError, AuthTokenManager};
use crate::infrastructure::tradingview::codec::FrameCodec;
use crate::infrastructure::tradingview::messages::{Envelope, OutboundMessage};
use crate::infrastructure::tradingview::reconnect::{ReconnectConfig, ReconnectPolicy};

/// Default provider stream URL.
pub const DEFAULT_STREAM_URL: &str =
    "wss://prodata.tradingview.com/socket.io/websocket?from=screener%2F";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type ReconnectAck = oneshot::Sender<Result<(), ConnectionError>>;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the stream client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The handshake did not complete within its deadline.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A write did not complete within its deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The auth bootstrap could not obtain a token.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// No live socket to write to.
    #[error("not connected")]
    NotConnected,

    /// The provider closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The stream URL could not be turned into a handshake request.
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    /// Outbound message serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StreamClientError {
    /// Map onto the port-level error taxonomy.
    #[must_use]
    pub fn to_connection_error(&self) -> ConnectionError {
        match self {
            Self::NotConnected => ConnectionError::NotConnected,
            Self::HandshakeTimeout(_) | Self::WriteTimeout(_) => ConnectionError::Timeout,
            Self::Auth(error) => ConnectionError::Auth(error.to_string()),
            other => ConnectionError::Transport(other.to_string()),
        }
    }
}

impl From<StreamClientError> for ConnectionError {
    fn from(error: StreamClientError) -> Self {
        error.to_connection_error()
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Provider stream URL.
    pub url: String,
    /// Deadline for the WebSocket handshake.
    pub handshake_timeout: Duration,
    /// Deadline for ordinary writes (messages, pings).
    pub write_timeout: Duration,
    /// Deadline for answering a server PING with a PONG.
    pub pong_timeout: Duration,
    /// Interval between client PINGs while connected.
    pub ping_interval: Duration,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(60),
            pong_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the stream client, in receipt order.
#[derive(Debug)]
pub enum StreamEvent {
    /// A connection is up and the auth bootstrap has been sent. The
    /// consumer re-subscribes every enabled registry row on this event.
    Connected,
    /// A reconnect attempt is about to start after a backoff delay.
    Reconnecting {
        /// Attempt number, 1-based since the last successful connection.
        attempt: u32,
    },
    /// The client gave up or shut down.
    Disconnected,
    /// One inbound protocol payload.
    Frame(Envelope),
}

struct ReconnectRequest {
    done: ReconnectAck,
}

enum ReadOutcome {
    Cancelled,
    Closed,
    Failed(StreamClientError),
    ReconnectRequested(ReconnectAck),
}

// =============================================================================
// Client
// =============================================================================

/// WebSocket supervisor for the provider stream.
pub struct StreamClient {
    config: StreamClientConfig,
    auth: Arc<AuthTokenManager>,
    codec: FrameCodec,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    sink: Mutex<Option<WsSink>>,
    state: parking_lot::RwLock<ConnectionState>,
    reconnecting: AtomicBool,
    command_tx: mpsc::Sender<ReconnectRequest>,
    command_rx: Mutex<Option<mpsc::Receiver<ReconnectRequest>>>,
}

impl StreamClient {
    /// Create a client. `run()` must be spawned for it to do anything; the
    /// cancellation token stops the reader, the ping loop, and any
    /// in-flight backoff alike.
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        auth: Arc<AuthTokenManager>,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(1);
        Self {
            config,
            auth,
            codec: FrameCodec::new(),
            event_tx,
            cancel,
            sink: Mutex::new(None),
            state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            reconnecting: AtomicBool::new(false),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether a reconnect attempt is in flight.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Run the connection supervisor until cancelled.
    pub async fn run(self: Arc<Self>) {
        let Some(mut commands) = self.command_rx.lock().await.take() else {
            tracing::error!("stream client started twice, ignoring");
            return;
        };

        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut pending_ack: Option<ReconnectAck> = None;
        let mut delay_before_dial = false;

        'supervise: loop {
            // ---- establish a connection ----
            let mut source = loop {
                if self.cancel.is_cancelled() {
                    break 'supervise;
                }

                if delay_before_dial {
                    let Some(delay) = policy.next_delay() else {
                        // Exhausted: park disconnected until operator action.
                        self.set_state(ConnectionState::Disconnected);
                        let _ = self.event_tx.send(StreamEvent::Disconnected).await;
                        tracing::error!(
                            max_attempts = self.config.reconnect.max_attempts,
                            "reconnect attempts exhausted, waiting for operator reconnect"
                        );
                        tokio::select! {
                            () = self.cancel.cancelled() => break 'supervise,
                            request = commands.recv() => {
                                let Some(request) = request else { break 'supervise };
                                stash_ack(&mut pending_ack, request.done);
                                policy.reset();
                                delay_before_dial = false;
                                continue;
                            }
                        }
                    };

                    let attempt = policy.attempt_count();
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    tracing::info!(attempt, delay_ms, "backing off before reconnect");
                    let _ = self.event_tx.send(StreamEvent::Reconnecting { attempt }).await;
                    tokio::select! {
                        () = self.cancel.cancelled() => break 'supervise,
                        () = tokio::time::sleep(delay) => {}
                        request = commands.recv() => {
                            // Operator reconnect short-circuits the backoff.
                            let Some(request) = request else { break 'supervise };
                            stash_ack(&mut pending_ack, request.done);
                            policy.reset();
                        }
                    }
                }

                self.set_state(ConnectionState::Connecting);
                self.reconnecting.store(true, Ordering::SeqCst);
                let dialed = self.connect().await;
                self.reconnecting.store(false, Ordering::SeqCst);

                match dialed {
                    Ok(source) => {
                        if let Some(ack) = pending_ack.take() {
                            let _ = ack.send(Ok(()));
                        }
                        break source;
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "provider connect failed");
                        if let Some(ack) = pending_ack.take() {
                            let _ = ack.send(Err(error.to_connection_error()));
                        }
                        delay_before_dial = true;
                    }
                }
            };

            policy.reset();
            delay_before_dial = true;
            self.set_state(ConnectionState::Connected);
            tracing::info!("provider stream connected");
            if self.event_tx.send(StreamEvent::Connected).await.is_err() {
                tracing::info!("event consumer gone, stopping stream client");
                break 'supervise;
            }

            match self.read_loop(&mut source, &mut commands).await {
                ReadOutcome::Cancelled => break 'supervise,
                ReadOutcome::Closed => {
                    tracing::info!("provider closed the stream normally");
                    break 'supervise;
                }
                ReadOutcome::Failed(error) => {
                    tracing::warn!(error = %error, "stream failed, reconnecting");
                    self.drop_sink().await;
                    self.set_state(ConnectionState::Connecting);
                }
                ReadOutcome::ReconnectRequested(done) => {
                    tracing::info!("operator reconnect requested");
                    self.drop_sink().await;
                    stash_ack(&mut pending_ack, done);
                    policy.reset();
                    delay_before_dial = false;
                    self.set_state(ConnectionState::Connecting);
                }
            }
        }

        self.shutdown_socket().await;
        self.set_state(ConnectionState::Disconnected);
        let _ = self.event_tx.try_send(StreamEvent::Disconnected);
        tracing::info!("stream client stopped");
    }

    /// Write one protocol message, wrapped in the frame envelope.
    ///
    /// # Errors
    ///
    /// Fails with [`StreamClientError::NotConnected`] when no socket is
    /// live, and with transport/timeout errors otherwise.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), StreamClientError> {
        let frame = self.codec.encode(&message.to_json()?);
        tracing::debug!(method = message.method(), "sending message");
        self.write(Message::Text(frame.into()), self.config.write_timeout)
            .await
    }

    /// Close the connection and stop the supervisor. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.shutdown_socket().await;
        self.set_state(ConnectionState::Disconnected);
    }

    // ---- internals ----

    async fn connect(&self) -> Result<WsSource, StreamClientError> {
        // Drop any previous socket before dialing again.
        self.drop_sink().await;

        tracing::info!(url = %self.config.url, "connecting to provider stream");
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|error| StreamClientError::InvalidUrl(error.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Origin", HeaderValue::from_static("https://www.tradingview.com"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            ),
        );
        headers.insert(
            "Accept-Encoding",
            HeaderValue::from_static("gzip, deflate, br, zstd"),
        );
        headers.insert(
            "Accept-Language",
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));

        let (stream, _response) = tokio::time::timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| StreamClientError::HandshakeTimeout(self.config.handshake_timeout))??;

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);

        // Auth bootstrap: the first two frames on every fresh connection.
        let token = self.auth.token().await?;
        self.send(&OutboundMessage::set_auth_token(&token)).await?;
        self.send(&OutboundMessage::set_locale()).await?;

        Ok(source)
    }

    async fn read_loop(
        &self,
        source: &mut WsSource,
        commands: &mut mpsc::Receiver<ReconnectRequest>,
    ) -> ReadOutcome {
        let mut ping_timer = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return ReadOutcome::Cancelled,
                request = commands.recv() => {
                    return match request {
                        Some(request) => ReadOutcome::ReconnectRequested(request.done),
                        None => ReadOutcome::Cancelled,
                    };
                }
                _ = ping_timer.tick() => {
                    if let Err(error) = self.send_ping().await {
                        tracing::warn!(error = %error, "ping failed");
                        return ReadOutcome::Failed(error);
                    }
                }
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(error) = self.handle_text(text.as_str()).await {
                            return match error {
                                StreamClientError::NotConnected => ReadOutcome::Cancelled,
                                other => ReadOutcome::Failed(other),
                            };
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(error) = self.send_pong(payload).await {
                            return ReadOutcome::Failed(error);
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .is_none_or(|frame| frame.code == CloseCode::Normal);
                        if normal {
                            return ReadOutcome::Closed;
                        }
                        return ReadOutcome::Failed(StreamClientError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {} // binary and raw frames are not part of the protocol
                    Some(Err(error)) => return ReadOutcome::Failed(error.into()),
                    None => return ReadOutcome::Failed(StreamClientError::ConnectionClosed),
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) -> Result<(), StreamClientError> {
        if self.codec.is_heartbeat(text) {
            tracing::trace!(frame = text, "echoing heartbeat");
            return self.send_raw(text).await;
        }

        for payload in self.codec.decode(text) {
            match serde_json::from_str::<Envelope>(payload) {
                Ok(envelope) => {
                    if self.event_tx.send(StreamEvent::Frame(envelope)).await.is_err() {
                        // The consumer is gone; drain by exiting.
                        return Err(StreamClientError::NotConnected);
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, payload, "dropping unparseable payload");
                }
            }
        }
        Ok(())
    }

    async fn send_raw(&self, raw: &str) -> Result<(), StreamClientError> {
        self.write(
            Message::Text(raw.to_string().into()),
            self.config.write_timeout,
        )
        .await
    }

    async fn send_ping(&self) -> Result<(), StreamClientError> {
        self.write(Message::Ping(Bytes::new()), self.config.write_timeout)
            .await
    }

    async fn send_pong(&self, payload: Bytes) -> Result<(), StreamClientError> {
        self.write(Message::Pong(payload), self.config.pong_timeout)
            .await
    }

    async fn write(
        &self,
        message: Message,
        deadline: Duration,
    ) -> Result<(), StreamClientError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(StreamClientError::NotConnected)?;
        match tokio::time::timeout(deadline, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(StreamClientError::WriteTimeout(deadline)),
        }
    }

    async fn drop_sink(&self) {
        drop(self.sink.lock().await.take());
    }

    async fn shutdown_socket(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
            let _ = tokio::time::timeout(Duration::from_secs(1), sink.send(close)).await;
            let _ = sink.close().await;
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "connection state change");
            *state = next;
        }
    }
}

fn stash_ack(slot: &mut Option<ReconnectAck>, ack: ReconnectAck) {
    if let Some(previous) = slot.replace(ack) {
        let _ = previous.send(Err(ConnectionError::ReconnectInFlight));
    }
}

#[async_trait]
impl StreamConnection for StreamClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        StreamClient::send(self, message)
            .await
            .map_err(StreamClientError::into)
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        if self.reconnecting.load(Ordering::SeqCst) {
            return Err(ConnectionError::ReconnectInFlight);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(ReconnectRequest { done: done_tx })
            .await
            .map_err(|_| ConnectionError::Transport("stream client stopped".to_string()))?;
        done_rx
            .await
            .map_err(|_| ConnectionError::Transport("stream client stopped".to_string()))?
    }

    fn state(&self) -> ConnectionState {
        self.connection_state()
    }
}
