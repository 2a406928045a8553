//! OpenAI Realtime API configuration constants and enums.

use serde::{Deserialize, Serialize};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default audio sample rate for OpenAI Realtime API output.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Default realtime model.
pub const DEFAULT_MODEL: &str = "gpt-realtime-mini";

/// Default voice.
pub const DEFAULT_VOICE: &str = "ash";

/// Default transcription model for input audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Wire name of the only audio encoding the engine speaks.
pub const PCM16_FORMAT: &str = "pcm16";

/// Default base system instruction for the in-car driving instructor.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are an in-car VR driving instructor in a training simulator.

Goals:
- Keep the driver safe and calm.
- Explain mistakes clearly but briefly.
- Adapt feedback to their current context.
- Prioritize safety-critical issues over minor optimizations.
- Sound like a real instructor sitting next to the driver, natural and unforced.
- When the conversation shows a pattern in the driver's mistakes, mention it briefly.

Rules:
- Respond in short 1-2 sentence bursts unless explicitly asked for a detailed explanation.
- Speak in the first person to the driver and address them as 'you'.
- Never mention that you are an AI or a language model.
- If the situation indicates imminent danger, be firm and immediate.

Input format:
You will receive messages that contain:
- GAME_EVENT: <eventName>
- PLAYER_UTTERANCE: <optional last thing the player said or asked (may be empty)>

You may also receive raw audio input from the player: treat it as what they just said.
";

// =============================================================================
// Voices
// =============================================================================

/// Available voices for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    Alloy,
    #[default]
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
    Marin,
    Cedar,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
            Self::Marin => "marin",
            Self::Cedar => "cedar",
        }
    }

    /// Parse from string, `None` for voices the API does not know.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "alloy" => Some(Self::Alloy),
            "ash" => Some(Self::Ash),
            "ballad" => Some(Self::Ballad),
            "coral" => Some(Self::Coral),
            "echo" => Some(Self::Echo),
            "sage" => Some(Self::Sage),
            "shimmer" => Some(Self::Shimmer),
            "verse" => Some(Self::Verse),
            "marin" => Some(Self::Marin),
            "cedar" => Some(Self::Cedar),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Modalities
// =============================================================================

/// Response modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

impl Modality {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

/// Modalities requested for every response: streamed text plus speech.
pub fn response_modalities() -> Vec<String> {
    [Modality::Text, Modality::Audio]
        .iter()
        .map(|m| m.as_str().to_string())
        .collect()
}
