//! OpenAI Realtime API module.
//!
//! One persistent WebSocket connection per engine, configured by a single
//! `session.update` handshake and driven by manual turns: every request is an
//! explicit `response.create`, there is no server-side voice activity
//! detection.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse, marin, cedar
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian mono.

mod client;
pub mod config;
mod messages;

pub use client::RealtimeConnection;
pub use config::{OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeVoice};
pub use messages::{
    ClientEvent, CodecError, ContentPart, ConversationItem, InboundEvent,
    InputAudioTranscription, ResponseConfig, SessionConfig, decode_server_event,
    encode_client_event,
};
