//! Realtime protocol connection module.
//!
//! This module owns everything that touches the upstream Realtime endpoint:
//! - the session configuration record sent as the connection handshake
//! - the JSON codec for outbound commands and inbound streamed events
//! - the connection manager holding the WebSocket, its send permit and the
//!   receive loop
//!
//! # Audio Format
//!
//! Audio travels as PCM 16-bit signed little-endian mono, base64 encoded
//! inside JSON events. The output rate is 24kHz unless configured otherwise.

mod base;
pub mod openai;

pub use base::{
    ConnectionState, InboundHandler, RealtimeError, RealtimeResult, SessionSettings,
};
pub use openai::{
    ClientEvent, CodecError, InboundEvent, RealtimeConnection, decode_server_event,
    encode_client_event,
};
