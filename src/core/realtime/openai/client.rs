//! OpenAI Realtime connection manager.
//!
//! Owns the WebSocket for one session at a time:
//! - `connect` opens the transport, sends the `session.update` handshake and
//!   spawns the receive loop
//! - `send` serializes one client event under the send permit so frames from
//!   concurrent callers never interleave
//! - `close` cancels the receive loop and closes the transport, swallowing
//!   errors
//!
//! Each successful `connect` creates a fresh cancellation token and a new
//! session generation. The token is cancelled when the session ends for any
//! reason, so every task tied to the session can select on it. Only the
//! receive loop of the current generation may mark the connection down or
//! report a disconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::messages::{ClientEvent, decode_server_event, encode_client_event};
use crate::core::realtime::base::{
    ConnectionState, InboundHandler, RealtimeError, RealtimeResult, SessionSettings,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Install the ring crypto provider for TLS connections exactly once.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Fails only when another provider is already installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// =============================================================================
// Realtime Connection
// =============================================================================

/// Persistent connection to the Realtime endpoint.
///
/// # Thread Safety
///
/// The write half lives behind an async mutex that doubles as the send
/// permit. The `connected` flag is shared with the receive task for
/// lock-free status checks.
pub struct RealtimeConnection {
    /// Write half of the WebSocket; the lock is the send permit
    sink: Arc<Mutex<Option<WsSink>>>,
    /// Connected flag (shared with the receive task)
    connected: Arc<AtomicBool>,
    /// Connection state
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    /// Cancellation token of the current session
    cancel: parking_lot::Mutex<CancellationToken>,
    /// Generation of the current session, bumped on every connect
    generation: Arc<parking_lot::Mutex<u64>>,
    /// Receive task handle
    receive_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Default for RealtimeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeConnection {
    pub fn new() -> Self {
        let cancel = CancellationToken::new();
        // No session yet: anything waiting on the token must not block.
        cancel.cancel();
        Self {
            sink: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            state: Arc::new(parking_lot::RwLock::new(ConnectionState::Disconnected)),
            cancel: parking_lot::Mutex::new(cancel),
            generation: Arc::new(parking_lot::Mutex::new(0)),
            receive_handle: parking_lot::Mutex::new(None),
        }
    }

    /// Whether the transport is open and the receive loop is running.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Cancellation token of the current session.
    ///
    /// Already cancelled when no session is open.
    pub fn session_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Open the transport, send the handshake and start the receive loop.
    ///
    /// The connection only reports itself connected once the handshake is on
    /// the wire. Connecting while already connected is a no-op.
    pub async fn connect(
        &self,
        settings: &SessionSettings,
        handler: Arc<dyn InboundHandler>,
    ) -> RealtimeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        if settings.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        install_crypto_provider();
        *self.state.write() = ConnectionState::Connecting;

        let ws_stream = match self.open_transport(settings).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        tracing::info!(model = %settings.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, ws_source) = ws_stream.split();

        // The handshake is always the first outbound message of a session.
        if let Err(e) = write_event(&mut ws_sink, &ClientEvent::session_update(settings)).await {
            tracing::error!("Failed to send session configuration: {}", e);
            if let Err(close_err) = ws_sink.close().await {
                tracing::debug!("Error closing WebSocket: {}", close_err);
            }
            *self.state.write() = ConnectionState::Disconnected;
            return Err(e);
        }
        *self.sink.lock().await = Some(ws_sink);

        let token = CancellationToken::new();
        let session = {
            let mut generation = self.generation.lock();
            *generation += 1;
            *self.cancel.lock() = token.clone();
            *self.state.write() = ConnectionState::Connected;
            self.connected.store(true, Ordering::SeqCst);
            *generation
        };

        let handle = tokio::spawn(receive_loop(
            ws_source,
            ReceiveContext {
                handler,
                sink: self.sink.clone(),
                connected: self.connected.clone(),
                state: self.state.clone(),
                generation: self.generation.clone(),
                session,
                cancel: token,
            },
        ));
        *self.receive_handle.lock() = Some(handle);

        Ok(())
    }

    async fn open_transport(&self, settings: &SessionSettings) -> RealtimeResult<WsStream> {
        let url = settings.ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = tokio::time::timeout(
            settings.connect_timeout(),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| RealtimeError::Timeout(format!("connecting to {}", settings.endpoint)))?
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        Ok(ws_stream)
    }

    /// Serialize and write one client event.
    pub async fn send(&self, event: &ClientEvent) -> RealtimeResult<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) if self.is_connected() => write_event(sink, event).await,
            _ => Err(RealtimeError::NotConnected),
        }
    }

    /// Cancel the session and close the transport. Errors are swallowed.
    pub async fn close(&self) {
        self.cancel.lock().cancel();
        self.connected.store(false, Ordering::SeqCst);

        let handle = self.receive_handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::debug!("Receive task ended abnormally: {}", e);
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink
            && let Err(e) = sink.close().await
        {
            tracing::debug!("Error closing WebSocket: {}", e);
        }

        *self.state.write() = ConnectionState::Disconnected;
        tracing::info!("Realtime connection closed");
    }
}

async fn write_event(sink: &mut WsSink, event: &ClientEvent) -> RealtimeResult<()> {
    let json = encode_client_event(event)
        .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;

    tracing::trace!(event_type = event.event_type(), "-> {}", json);

    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
}

/// What one receive loop shares with the connection that spawned it.
struct ReceiveContext {
    handler: Arc<dyn InboundHandler>,
    sink: Arc<Mutex<Option<WsSink>>>,
    connected: Arc<AtomicBool>,
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    generation: Arc<parking_lot::Mutex<u64>>,
    /// Generation this loop belongs to
    session: u64,
    cancel: CancellationToken,
}

/// Read complete messages until the session ends, forwarding decoded events.
async fn receive_loop(mut ws_source: WsSource, ctx: ReceiveContext) {
    let ReceiveContext {
        handler,
        sink,
        connected,
        state,
        generation,
        session,
        cancel,
    } = ctx;

    let error = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,

            msg = ws_source.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_server_event(text.as_str()) {
                    Ok(Some(event)) => handler.on_event(event),
                    Ok(None) => tracing::trace!("Ignoring server event: {}", text.as_str()),
                    Err(e) => {
                        tracing::warn!("Failed to parse server event: {} - {}", e, text.as_str())
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Some(sink) = sink.lock().await.as_mut()
                        && let Err(e) = sink.send(Message::Pong(payload)).await
                    {
                        tracing::warn!("Failed to answer ping: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    tracing::info!("WebSocket closed by server: {}", reason);
                    break Some(RealtimeError::ConnectionClosed(reason));
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!("Ignoring {} byte binary frame", data.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("WebSocket receive error: {}", e);
                    break Some(RealtimeError::WebSocketError(e.to_string()));
                }
                None => break Some(RealtimeError::ConnectionClosed("stream ended".to_string())),
            },
        }
    };

    // Releases everything waiting on this session, including the pump.
    cancel.cancel();

    // Held while reporting so a newer session cannot start in between.
    let current = generation.lock();
    if *current != session {
        tracing::debug!(session, current = *current, "Stale receive loop ended");
        return;
    }
    connected.store(false, Ordering::SeqCst);
    *state.write() = if error.is_some() {
        ConnectionState::Failed
    } else {
        ConnectionState::Disconnected
    };
    handler.on_disconnect(error);
}
