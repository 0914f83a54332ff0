//! # WebSocket Transport
//!
//! WebSocket client with automatic reconnection and backoff.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    WebSocket Connection States                          │
//! │                                                                         │
//! │  ┌────────────┐  connect (auth headers)  ┌────────────┐                │
//! │  │Disconnected│ ───────────────────────► │ Connected  │                │
//! │  └────────────┘                          └─────┬──────┘                │
//! │        ▲                                       │                        │
//! │        │                               disconnect/error                 │
//! │        │         backoff timer                 │                        │
//! │        └───────────────────────────────────────┘                        │
//! │                                                                         │
//! │  Only the two states are published; subscribers see Connected only     │
//! │  after the handshake completes.                                        │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential with Jitter)                            │
//! │  ───────────────────────────────────────────                           │
//! │  Attempt 1: 1s                                                          │
//! │  Attempt 2: 2s                                                          │
//! │  Attempt 3: 4s                                                          │
//! │  ...                                                                    │
//! │  Max: 30s                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Emission
//!
//! Each emitted event carries a oneshot ack. The transport task completes it
//! after the frame is written to the socket, or fails it if the connection
//! drops first. Events queued while disconnected are rejected immediately.
//!
//! Connect failures are retried with backoff unless they are configuration
//! errors, which stop the transport.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use farmlink_core::ConnectionState;

use crate::error::{SyncError, SyncResult};
use crate::protocol::UplinkEvent;
use crate::uplink::Uplink;

/// Header naming the kind of client connecting.
pub const DEVICE_TYPE_HEADER: &str = "X-Device-Type";

/// Header carrying this bridge's identity.
pub const DEVICE_ID_HEADER: &str = "X-Device-Id";

type Ack = oneshot::Sender<SyncResult<()>>;
type Outgoing = (UplinkEvent, Ack);
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,

    /// Sent as `Authorization: Bearer <api_key>`.
    pub api_key: String,

    /// Sent as `X-Device-Type`.
    pub device_type: String,

    /// Sent as `X-Device-Id` when non-empty.
    pub device_id: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Upper bound on waiting for a frame write.
    pub emit_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: String::new(),
            api_key: String::new(),
            device_type: "pi".to_string(),
            device_id: String::new(),
            connect_timeout: Duration::from_secs(10),
            emit_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            ping_interval: Duration::from_secs(25),
        }
    }
}

impl TransportConfig {
    /// Checks the URL scheme and credentials.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(SyncError::MissingApiKey);
        }

        let url = url::Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SyncError::InvalidUrl(format!(
                "{} (expected ws:// or wss://)",
                self.url
            )));
        }
        self.request().map(|_| ())
    }

    /// Builds the handshake request with auth headers.
    fn request(&self) -> SyncResult<Request<()>> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();

        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.api_key))?);
        headers.insert(DEVICE_TYPE_HEADER, header_value(&self.device_type)?);
        if !self.device_id.is_empty() {
            headers.insert(DEVICE_ID_HEADER, header_value(&self.device_id)?);
        }
        Ok(request)
    }
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SyncError::InvalidConfig(format!("invalid header value: {e}")))
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle for interacting with the transport from other components.
#[derive(Clone)]
pub struct TransportHandle {
    /// Sender for outgoing events.
    outgoing_tx: mpsc::Sender<Outgoing>,

    /// Current connection state.
    state_rx: watch::Receiver<ConnectionState>,

    /// Shutdown signal.
    shutdown_tx: mpsc::Sender<()>,

    emit_timeout: Duration,
}

impl TransportHandle {
    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Failed to send shutdown signal".into()))
    }
}

#[async_trait]
impl Uplink for TransportHandle {
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    async fn emit(&self, event: UplinkEvent) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::Disconnected);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.outgoing_tx
            .send((event, ack_tx))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;

        match timeout(self.emit_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            // Transport dropped the ack without answering
            Ok(Err(_)) => Err(SyncError::Disconnected),
            Err(_) => Err(SyncError::Timeout(self.emit_timeout.as_secs())),
        }
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

// =============================================================================
// WebSocket Transport
// =============================================================================

/// WebSocket transport with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let config = TransportConfig {
///     url: "wss://farm.example.com/ws".into(),
///     api_key: key,
///     ..Default::default()
/// };
///
/// let (handle, task) = Transport::spawn(config)?;
/// handle.emit(UplinkEvent::live_scan("4006381333931")).await?;
/// ```
pub struct Transport {
    config: TransportConfig,
    state_tx: watch::Sender<ConnectionState>,
    outgoing_rx: mpsc::Receiver<Outgoing>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Why the connection loop returned.
enum LoopExit {
    Shutdown,
    Lost,
}

impl Transport {
    /// Validates the config and spawns the background task.
    pub fn spawn(config: TransportConfig) -> SyncResult<(TransportHandle, JoinHandle<()>)> {
        config.validate()?;

        let (transport, handle) = Transport::new(config);
        let task = tokio::spawn(transport.run());

        Ok((handle, task))
    }

    fn new(config: TransportConfig) -> (Transport, TransportHandle) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outgoing>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let emit_timeout = config.emit_timeout;

        let transport = Transport {
            config,
            state_tx,
            outgoing_rx,
            shutdown_rx,
        };

        let handle = TransportHandle {
            outgoing_tx,
            state_rx,
            shutdown_tx,
            emit_timeout,
        };

        (transport, handle)
    }

    /// Main transport loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Transport starting");

        let mut backoff = self.create_backoff();

        loop {
            // Check for shutdown
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Transport received shutdown signal");
                break;
            }

            let connected = tokio::select! {
                result = Self::connect_with_timeout(&self.config) => result,
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during connect");
                    break;
                }
            };

            match connected {
                Ok(ws_stream) => {
                    info!("WebSocket connected");
                    self.set_state(ConnectionState::Connected);

                    // Reset backoff on successful connection
                    backoff.reset();

                    let exit = self.connection_loop(ws_stream).await;
                    self.set_state(ConnectionState::Disconnected);

                    match exit {
                        Ok(LoopExit::Shutdown) => break,
                        Ok(LoopExit::Lost) => warn!("Connection closed by server"),
                        Err(e) => warn!(error = %e, "Connection loop ended"),
                    }
                }
                Err(e) if e.is_config_error() => {
                    error!(error = %e, "Uplink misconfigured, transport stopping");
                    break;
                }
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Failed to connect");
                }
            }

            let duration = backoff.next_backoff().unwrap_or(self.config.max_backoff);
            debug!(?duration, "Waiting before reconnect");

            if self.wait_backoff(duration).await {
                info!("Shutdown during backoff");
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        self.reject_queued();
        info!("Transport stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Sleeps for `duration`, failing any events emitted meanwhile.
    ///
    /// Returns true on shutdown.
    async fn wait_backoff(&mut self, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                _ = self.shutdown_rx.recv() => return true,
                Some((event, ack)) = self.outgoing_rx.recv() => {
                    debug!(event = event.name(), "Rejecting event while disconnected");
                    let _ = ack.send(Err(SyncError::Disconnected));
                }
            }
        }
    }

    fn reject_queued(&mut self) {
        while let Ok((_, ack)) = self.outgoing_rx.try_recv() {
            let _ = ack.send(Err(SyncError::Disconnected));
        }
    }

    /// Connects with timeout.
    async fn connect_with_timeout(config: &TransportConfig) -> SyncResult<WsStream> {
        let request = config.request()?;
        let connect_future = connect_async(request);

        match timeout(config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(config.connect_timeout.as_secs())),
        }
    }

    /// Main connection loop - handles sending and receiving.
    async fn connection_loop(&mut self, ws_stream: WsStream) -> SyncResult<LoopExit> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ping_interval.tick().await;

        loop {
            tokio::select! {
                // Handle outgoing events
                Some((event, ack)) = self.outgoing_rx.recv() => {
                    let json = match event.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            let _ = ack.send(Err(e.into()));
                            continue;
                        }
                    };

                    debug!(event = event.name(), "Sending event");
                    match write.send(WsMessage::Text(json.into())).await {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = ack.send(Err(SyncError::Disconnected));
                            return Err(e.into());
                        }
                    }
                }

                // Handle incoming frames
                result = read.next() => {
                    match result {
                        Some(Ok(WsMessage::Text(text))) => {
                            debug!(len = text.len(), "Ignoring server text frame");
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Received close frame");
                            return Ok(LoopExit::Lost);
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            warn!("Received unexpected binary message");
                        }
                        Some(Ok(WsMessage::Frame(_))) => {
                            // Raw frame, ignore
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            return Err(SyncError::from(e));
                        }
                        None => return Ok(LoopExit::Lost),
                    }
                }

                // Send periodic pings
                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(vec![].into())).await?;
                    debug!("Sent ping");
                }

                // Check for shutdown
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(LoopExit::Shutdown);
                }
            }
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // No limit on total time
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response,
    };
    use tokio_tungstenite::tungstenite::http::HeaderMap;

    fn config(url: &str) -> TransportConfig {
        TransportConfig {
            url: url.to_string(),
            api_key: "secret-key".to_string(),
            device_id: "pi-01".to_string(),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(25));
        assert_eq!(config.device_type, "pi");
    }

    #[test]
    fn test_validate() {
        assert!(config("ws://localhost:3000/ws").validate().is_ok());
        assert!(config("wss://farm.example.com/ws").validate().is_ok());

        let err = config("http://localhost:3000").validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidUrl(_)));

        let err = config("not a url").validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidUrl(_)));

        let mut missing = config("ws://localhost:3000/ws");
        missing.api_key = "  ".to_string();
        assert!(matches!(missing.validate().unwrap_err(), SyncError::MissingApiKey));
    }

    #[test]
    fn test_validate_rejects_bad_header() {
        let mut bad = config("ws://localhost:3000/ws");
        bad.device_id = "pi\n01".to_string();

        let err = bad.validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(!err.is_retryable());
        assert!(Transport::spawn(bad).is_err());
    }

    #[tokio::test]
    async fn test_misconfigured_transport_stops_instead_of_retrying() {
        let mut bad = config("ws://127.0.0.1:9/ws");
        bad.api_key = "key\r\nX-Injected: 1".to_string();
        let (transport, handle) = Transport::new(bad);

        tokio::time::timeout(Duration::from_secs(2), transport.run())
            .await
            .expect("transport should stop on a config error");

        assert_eq!(handle.state(), ConnectionState::Disconnected);
        let err = handle.emit(UplinkEvent::scale_status(true)).await.unwrap_err();
        assert!(matches!(err, SyncError::Disconnected));
    }

    #[test]
    fn test_request_headers() {
        let request = config("ws://localhost:3000/ws").request().unwrap();
        let headers = request.headers();
        assert_eq!(headers[AUTHORIZATION], "Bearer secret-key");
        assert_eq!(headers[DEVICE_TYPE_HEADER], "pi");
        assert_eq!(headers[DEVICE_ID_HEADER], "pi-01");
    }

    #[tokio::test]
    async fn test_emit_reaches_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut captured = HeaderMap::new();
            let mut ws = accept_hdr_async(
                stream,
                |req: &ServerRequest, resp: Response| -> Result<Response, ErrorResponse> {
                    captured = req.headers().clone();
                    Ok(resp)
                },
            )
            .await
            .unwrap();

            loop {
                match ws.next().await.unwrap().unwrap() {
                    WsMessage::Text(text) => {
                        return (captured, UplinkEvent::from_json(&text).unwrap());
                    }
                    _ => continue,
                }
            }
        });

        let (handle, task) = Transport::spawn(config(&url)).unwrap();
        let mut state = handle.subscribe();
        state.wait_for(|s| s.is_connected()).await.unwrap();

        handle.emit(UplinkEvent::live_scan("4006381333931")).await.unwrap();

        let (headers, event) = server.await.unwrap();
        assert_eq!(headers["authorization"], "Bearer secret-key");
        assert_eq!(headers["x-device-type"], "pi");
        assert_eq!(event, UplinkEvent::live_scan("4006381333931"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_fails_fast() {
        // Nothing listens here, so the transport never connects
        let (handle, task) = Transport::spawn(config("ws://127.0.0.1:9/ws")).unwrap();

        let err = handle.emit(UplinkEvent::scale_status(true)).await.unwrap_err();
        assert!(matches!(err, SyncError::Disconnected));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
