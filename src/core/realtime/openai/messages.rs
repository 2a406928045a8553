//! OpenAI Realtime API WebSocket message types.
//!
//! This module is the protocol codec: pure, stateless, no I/O.
//! All events are JSON-encoded and tagged by their `type` field.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Configure the session (handshake)
//! - input_audio_buffer.clear - Clear the input audio buffer
//! - input_audio_buffer.append - Append base64 PCM16 audio
//! - input_audio_buffer.commit - Commit the buffered audio as a user turn
//! - conversation.item.create - Add a role-tagged text item
//! - response.create - Ask the model for a response
//!
//! Server events (received from server), matched case-insensitively and under
//! both the legacy and the current naming scheme:
//! - response.text.delta / response.output_text.delta - Text chunk
//! - response.text.done / response.output_text.done - Text complete
//! - response.audio.delta / response.output_audio.delta - Audio chunk
//! - response.audio.done / response.output_audio.done - Audio complete
//! - response.done - Response complete
//! - error - Error occurred
//! - conversation.item.input_audio_transcription.{delta,completed,failed}
//!
//! Every other event type is ignored.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{PCM16_FORMAT, response_modalities};
use crate::core::realtime::base::SessionSettings;

/// Message used when an error event carries no description.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message is not valid JSON or does not match the expected shape
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// An audio payload is not valid base64
    #[error("Invalid audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration payload for `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    pub modalities: Vec<String>,

    /// System instructions for the assistant
    pub instructions: String,

    /// Voice for audio output
    pub voice: String,

    /// Input audio format
    pub input_audio_format: String,

    /// Output audio format
    pub output_audio_format: String,

    /// Temperature for response generation
    pub temperature: f32,

    /// Always serialized as null: turns are created explicitly by the client
    pub turn_detection: Option<serde_json::Value>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
}

impl SessionConfig {
    /// Build the handshake payload from the session settings.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            modalities: response_modalities(),
            instructions: settings.instructions.clone(),
            voice: settings.voice.clone(),
            input_audio_format: PCM16_FORMAT.to_string(),
            output_audio_format: PCM16_FORMAT.to_string(),
            temperature: settings.temperature,
            turn_detection: None,
            input_audio_transcription: settings.transcription_enabled.then(|| {
                InputAudioTranscription {
                    model: settings.transcription_model.clone(),
                }
            }),
        }
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item for `conversation.item.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A user message carrying a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart::input_text(text)],
        }
    }
}

/// Content part of a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self {
            part_type: "input_text".to_string(),
            text: text.into(),
        }
    }
}

/// Per-response overrides for `response.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// =============================================================================
// Client Events
// =============================================================================

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseConfig },
}

impl ClientEvent {
    /// Create the session handshake.
    pub fn session_update(settings: &SessionSettings) -> Self {
        ClientEvent::SessionUpdate {
            session: SessionConfig::from_settings(settings),
        }
    }

    /// Create an audio append event from raw PCM16 bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Create a user text item.
    pub fn user_text(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text(text),
        }
    }

    /// Request a text+audio response with optional per-response instructions.
    pub fn response_create(instructions: Option<String>) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseConfig {
                modalities: response_modalities(),
                instructions,
            },
        }
    }

    /// Wire name of the event, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
        }
    }
}

/// Serialize a client event to its JSON text frame.
pub fn encode_client_event(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

// =============================================================================
// Server Events
// =============================================================================

/// Decoded inbound event. Closed set; everything else is dropped by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Incremental response text
    TextDelta(String),
    /// Response text finished; carries the full text when the server sends it
    TextDone { text: Option<String> },
    /// Incremental response audio, raw PCM16 LE bytes
    AudioDelta(Bytes),
    /// Response audio finished
    AudioDone,
    /// The whole response finished, successfully or not
    ResponseDone {
        response_id: Option<String>,
        status: Option<String>,
    },
    /// Upstream error
    Error {
        message: String,
        error_type: Option<String>,
    },
    /// Incremental transcription of the input audio
    InputTranscriptionDelta(String),
    /// Final transcription of the input audio
    InputTranscriptionCompleted(String),
    /// Transcription of the input audio failed
    InputTranscriptionFailed(String),
}

/// Loose shape shared by every server event we care about.
#[derive(Debug, Deserialize)]
struct RawServerEvent {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<RawApiError>,
    #[serde(default)]
    response: Option<RawResponse>,
}

#[derive(Debug, Deserialize)]
struct RawApiError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RawServerEvent {
    fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string())
    }
}

/// Decode one complete inbound text message.
///
/// Returns `Ok(None)` for event types outside the handled set.
pub fn decode_server_event(text: &str) -> Result<Option<InboundEvent>, CodecError> {
    let raw: RawServerEvent = serde_json::from_str(text)?;

    let Some(event_type) = raw.event_type.as_deref() else {
        return Ok(None);
    };

    let event = match event_type.to_ascii_lowercase().as_str() {
        "response.text.delta" | "response.output_text.delta" => {
            InboundEvent::TextDelta(raw.delta.unwrap_or_default())
        }
        "response.text.done" | "response.output_text.done" => {
            InboundEvent::TextDone { text: raw.text }
        }
        "response.audio.delta" | "response.output_audio.delta" => {
            let audio = match raw.delta.as_deref() {
                Some(delta) if !delta.is_empty() => BASE64_STANDARD.decode(delta)?,
                _ => Vec::new(),
            };
            InboundEvent::AudioDelta(Bytes::from(audio))
        }
        "response.audio.done" | "response.output_audio.done" => InboundEvent::AudioDone,
        "response.done" => {
            let (response_id, status) = raw
                .response
                .map(|r| (r.id, r.status))
                .unwrap_or((None, None));
            InboundEvent::ResponseDone {
                response_id,
                status,
            }
        }
        "error" => InboundEvent::Error {
            message: raw.error_message(),
            error_type: raw.error.as_ref().and_then(|e| e.error_type.clone()),
        },
        "conversation.item.input_audio_transcription.delta" => {
            InboundEvent::InputTranscriptionDelta(raw.delta.unwrap_or_default())
        }
        "conversation.item.input_audio_transcription.completed" => {
            InboundEvent::InputTranscriptionCompleted(raw.transcript.unwrap_or_default())
        }
        "conversation.item.input_audio_transcription.failed" => {
            InboundEvent::InputTranscriptionFailed(raw.error_message())
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}
