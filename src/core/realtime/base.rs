//! Base types shared by the realtime connection and the engine.
//!
//! This module defines the error type for connection-level failures, the
//! connection state machine, the immutable session configuration record and
//! the handler seam through which decoded inbound events leave the receive
//! loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::openai::InboundEvent;
use super::openai::config::{
    DEFAULT_INSTRUCTIONS, DEFAULT_MODEL, DEFAULT_TRANSCRIPTION_MODEL, DEFAULT_VOICE,
    OPENAI_REALTIME_URL, OPENAI_REALTIME_SAMPLE_RATE,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the endpoint failed
    #[error("Connection error: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket send or receive error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Error event reported by the upstream service
    #[error("{0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// The connection was closed by the remote side
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The operation was cancelled by shutdown or hard reset
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state for the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Transport open in progress or handshake not yet sent
    Connecting,
    /// Handshake sent, receive loop running
    Connected,
    /// Receive loop ended with an error
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Immutable per-connection session configuration.
///
/// Sent once as the first outbound message after the transport opens and
/// rebuilt on every hard reset.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// WebSocket endpoint without the model query parameter
    pub endpoint: String,

    /// API key sent as a bearer token
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Model identifier, e.g. "gpt-realtime-mini"
    pub model: String,

    /// Voice identifier for audio output
    pub voice: String,

    /// Base system instruction text
    pub instructions: String,

    /// Sample rate of PCM16 audio sent as input (Hz)
    pub input_sample_rate: u32,

    /// Sample rate of PCM16 audio streamed back by the model (Hz)
    pub output_sample_rate: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Whether to request transcription of input audio
    pub transcription_enabled: bool,

    /// Transcription model used when transcription is enabled
    pub transcription_model: String,

    /// Upper bound on opening the transport (milliseconds)
    pub connect_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            endpoint: OPENAI_REALTIME_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            input_sample_rate: 16000,
            output_sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
            temperature: 0.6,
            transcription_enabled: true,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .field("temperature", &self.temperature)
            .field("transcription_enabled", &self.transcription_enabled)
            .field("transcription_model", &self.transcription_model)
            .finish_non_exhaustive()
    }
}

impl SessionSettings {
    /// Build the WebSocket URL with the model parameter.
    pub fn ws_url(&self) -> String {
        format!("{}?model={}", self.endpoint, self.model)
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// =============================================================================
// Inbound Handler
// =============================================================================

/// Receiver of decoded inbound events.
///
/// Called from the connection's receive task. Implementations must not block:
/// anything that has to reach host code goes through the dispatch queue.
pub trait InboundHandler: Send + Sync + 'static {
    /// Handle one fully decoded inbound event.
    fn on_event(&self, event: InboundEvent);

    /// The receive loop ended. `error` is set when it ended abnormally.
    fn on_disconnect(&self, error: Option<RealtimeError>);
}
