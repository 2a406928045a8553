use std::time::Instant;

use bytes::Bytes;
use uuid::Uuid;

use crate::core::realtime::ClientEvent;

/// Kind used for requests carrying only the player's recorded question.
pub const VOICE_QUESTION_KIND: &str = "PlayerVoiceQuestion";

/// Instruction used for voice-only requests when the caller gives none.
pub const DEFAULT_VOICE_INSTRUCTION: &str = "Answer the player's question in 1–3 sentences.";

/// One admitted collaborator request waiting for its turn on the wire.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Correlation id for logs
    pub id: Uuid,
    /// Opaque event tag, e.g. "LaneWarning"
    pub kind: String,
    /// Extra instruction for this response only
    pub instruction: Option<String>,
    /// Last thing the player said, if any
    pub utterance: Option<String>,
    /// Raw PCM16 LE mono input audio at the session input rate
    pub audio: Option<Bytes>,
    /// Skip the text item and answer the audio alone
    pub voice_only: bool,
    /// When the request was admitted
    pub enqueued_at: Instant,
}

impl PendingRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            instruction: None,
            utterance: None,
            audio: None,
            voice_only: false,
            enqueued_at: Instant::now(),
        }
    }

    /// A voice-only question. Falls back to the default short-answer instruction.
    pub fn voice_question(audio: Bytes, instruction: Option<String>) -> Self {
        let mut request = Self::new(VOICE_QUESTION_KIND).with_audio(audio);
        request.instruction =
            Some(instruction.unwrap_or_else(|| DEFAULT_VOICE_INSTRUCTION.to_string()));
        request.voice_only = true;
        request
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_utterance(mut self, utterance: impl Into<String>) -> Self {
        self.utterance = Some(utterance.into());
        self
    }

    pub fn with_audio(mut self, audio: Bytes) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Copy of this request with a new id and enqueue time.
    pub fn refreshed(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Instant::now(),
            ..self.clone()
        }
    }

    /// Text of the user conversation item.
    pub fn payload_text(&self) -> String {
        let utterance = self
            .utterance
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or("<none>");
        format!("GAME_EVENT: {}\nPLAYER_UTTERANCE: {}\n", self.kind, utterance)
    }

    /// Per-response instructions: the base prompt followed by this request's
    /// instruction. `None` when there is no extra instruction, so the session
    /// instructions apply unchanged.
    pub fn combined_instructions(&self, base: &str) -> Option<String> {
        let extra = self.instruction.as_deref().map(str::trim).filter(|i| !i.is_empty())?;
        let base = base.trim();
        if base.is_empty() {
            Some(extra.to_string())
        } else {
            Some(format!("{base}\n\n{extra}"))
        }
    }

    /// Outbound messages for this request, in wire order.
    pub fn to_client_events(&self, base_instructions: &str) -> Vec<ClientEvent> {
        let mut events = Vec::with_capacity(5);

        if let Some(audio) = self.audio.as_ref().filter(|a| !a.is_empty()) {
            events.push(ClientEvent::InputAudioBufferClear);
            events.push(ClientEvent::audio_append(audio));
            events.push(ClientEvent::InputAudioBufferCommit);
        }

        if !self.voice_only {
            events.push(ClientEvent::user_text(self.payload_text()));
        }

        events.push(ClientEvent::response_create(
            self.combined_instructions(base_instructions),
        ));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text() {
        let request = PendingRequest::new("RedLight");
        assert_eq!(
            request.payload_text(),
            "GAME_EVENT: RedLight\nPLAYER_UTTERANCE: <none>\n"
        );

        let request = PendingRequest::new("Crash").with_utterance("what happened?");
        assert_eq!(
            request.payload_text(),
            "GAME_EVENT: Crash\nPLAYER_UTTERANCE: what happened?\n"
        );
    }

    #[test]
    fn test_combined_instructions() {
        let request = PendingRequest::new("Crash");
        assert_eq!(request.combined_instructions("Base."), None);

        let request = request.with_instruction("Be firm.");
        assert_eq!(
            request.combined_instructions("Base."),
            Some("Base.\n\nBe firm.".to_string())
        );
        assert_eq!(
            request.combined_instructions("  "),
            Some("Be firm.".to_string())
        );
    }

    #[test]
    fn test_text_request_events() {
        let events = PendingRequest::new("Crash").to_client_events("Base.");
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["conversation.item.create", "response.create"]);
    }

    #[test]
    fn test_audio_request_events() {
        let request = PendingRequest::new("Crash")
            .with_audio(Bytes::from_static(&[1, 0, 2, 0]));
        let types: Vec<_> = request
            .to_client_events("")
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                "input_audio_buffer.clear",
                "input_audio_buffer.append",
                "input_audio_buffer.commit",
                "conversation.item.create",
                "response.create",
            ]
        );
    }

    #[test]
    fn test_voice_question_skips_text_item() {
        let request = PendingRequest::voice_question(Bytes::from_static(&[0, 0]), None);
        assert_eq!(request.kind, VOICE_QUESTION_KIND);
        assert!(request.voice_only);
        assert_eq!(request.instruction.as_deref(), Some(DEFAULT_VOICE_INSTRUCTION));

        let types: Vec<_> = request
            .to_client_events("")
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                "input_audio_buffer.clear",
                "input_audio_buffer.append",
                "input_audio_buffer.commit",
                "response.create",
            ]
        );
    }
}
