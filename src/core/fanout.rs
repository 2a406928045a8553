//! Response fan-out.
//!
//! Receives decoded inbound events on the network task and routes them:
//! text to the accumulator and the host, audio to the sink and the host,
//! `response.done` to the pump's in-flight signal. Host delivery always goes
//! through the dispatch queue.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::audio::AudioSink;
use crate::core::dispatch::{DispatchQueue, InstructorEvent, Observers, publish};
use crate::core::queue::{InFlight, PendingRequest, PumpObserver};
use crate::core::realtime::{InboundEvent, InboundHandler, RealtimeError};

pub struct ResponseFanout {
    accumulator: Mutex<String>,
    in_flight: Arc<InFlight>,
    sink: Arc<AudioSink>,
    dispatch: Arc<DispatchQueue>,
    observers: Arc<Observers>,
}

impl ResponseFanout {
    pub fn new(
        in_flight: Arc<InFlight>,
        sink: Arc<AudioSink>,
        dispatch: Arc<DispatchQueue>,
        observers: Arc<Observers>,
    ) -> Self {
        Self {
            accumulator: Mutex::new(String::new()),
            in_flight,
            sink,
            dispatch,
            observers,
        }
    }

    /// Text accumulated for the response in progress.
    pub fn accumulated_text(&self) -> String {
        self.accumulator.lock().clone()
    }

    /// Forget the response in progress.
    pub fn reset(&self) {
        self.accumulator.lock().clear();
    }

    /// Queue an error message for the host.
    pub fn report_error(&self, message: impl Into<String>) {
        self.publish(InstructorEvent::Error(message.into()));
    }

    fn publish(&self, event: InstructorEvent) {
        publish(&self.dispatch, &self.observers, event);
    }
}

impl InboundHandler for ResponseFanout {
    fn on_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::TextDelta(delta) => {
                if delta.is_empty() {
                    return;
                }
                self.accumulator.lock().push_str(&delta);
                self.publish(InstructorEvent::TextDelta(delta));
            }

            InboundEvent::TextDone { text } => {
                let accumulated = self.accumulated_text();
                let full = if accumulated.is_empty() {
                    text.unwrap_or_default()
                } else {
                    accumulated
                };
                tracing::debug!("Instructor text: {}", full);
                self.publish(InstructorEvent::TextComplete(full));
            }

            InboundEvent::AudioDelta(chunk) => {
                if chunk.is_empty() {
                    return;
                }
                self.sink.push_pcm16(&chunk);
                self.publish(InstructorEvent::AudioChunk(chunk));
            }

            InboundEvent::AudioDone => self.publish(InstructorEvent::AudioComplete),

            InboundEvent::ResponseDone {
                response_id,
                status,
            } => {
                tracing::debug!(
                    response_id = response_id.as_deref().unwrap_or("-"),
                    status = status.as_deref().unwrap_or("-"),
                    "Response done"
                );
                if !self.in_flight.resolve() {
                    tracing::debug!("response.done with no request in flight");
                }
            }

            // The in-flight signal stays pending: only response.done releases it.
            InboundEvent::Error {
                message,
                error_type,
            } => {
                tracing::warn!(
                    error_type = error_type.as_deref().unwrap_or("-"),
                    "Realtime API error: {}",
                    message
                );
                self.publish(InstructorEvent::Error(message));
            }

            InboundEvent::InputTranscriptionDelta(delta) => {
                tracing::trace!("Player transcript delta: {}", delta);
            }
            InboundEvent::InputTranscriptionCompleted(transcript) => {
                tracing::info!("Player said: {}", transcript);
            }
            InboundEvent::InputTranscriptionFailed(message) => {
                tracing::warn!("Player transcription failed: {}", message);
            }
        }
    }

    fn on_disconnect(&self, error: Option<RealtimeError>) {
        self.in_flight.abandon();
        if let Some(error) = error {
            tracing::warn!("Realtime session ended: {}", error);
            self.publish(InstructorEvent::Error(format!("Receive error: {error}")));
        }
    }
}

impl PumpObserver for ResponseFanout {
    fn on_request_started(&self, _request: &PendingRequest) {
        self.reset();
    }

    fn on_pump_error(&self, error: &RealtimeError) {
        self.publish(InstructorEvent::Error(format!("Queue pump error: {error}")));
    }
}
