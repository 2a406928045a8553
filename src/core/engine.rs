//! Engine facade.
//!
//! [`InstructorEngine`] is the explicit handle collaborators hold. It wires the
//! rate limiter, request queue, pump, connection, fan-out, audio sink and
//! dispatch queue together for one upstream session at a time.
//!
//! The host is expected to:
//! - call [`InstructorEngine::connect`] once from inside a tokio runtime,
//! - call [`InstructorEngine::tick`] once per frame on its main thread,
//! - call [`InstructorEngine::render`] (or render through
//!   [`InstructorEngine::audio_sink`]) from its audio callback.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::config::{ConfigError, EngineConfig};
use crate::core::admission::RateLimiter;
use crate::core::audio::AudioSink;
use crate::core::dispatch::{DispatchQueue, Observers};
use crate::core::fanout::ResponseFanout;
use crate::core::queue::{
    EnqueueOutcome, InFlight, PendingRequest, PumpTask, RequestPump, RequestQueue,
};
use crate::core::realtime::{
    ConnectionState, InboundHandler, RealtimeConnection, RealtimeResult,
};

/// Point-in-time view of the engine for host diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub connection_state: ConnectionState,
    pub queued_requests: usize,
    pub in_flight: bool,
    pub pump_running: bool,
    pub dropped_requests: u64,
    pub buffered_audio_samples: usize,
    pub overflowed_audio_samples: u64,
    pub pending_dispatch: usize,
}

/// Realtime session engine.
pub struct InstructorEngine {
    config: EngineConfig,
    connection: Arc<RealtimeConnection>,
    limiter: RateLimiter,
    queue: Arc<RequestQueue>,
    in_flight: Arc<InFlight>,
    pump: RequestPump,
    sink: Arc<AudioSink>,
    dispatch: Arc<DispatchQueue>,
    observers: Arc<Observers>,
    fanout: Arc<ResponseFanout>,
    sticky: Mutex<Option<PendingRequest>>,
    runtime: Mutex<Option<Handle>>,
    // Serializes connect, hard reset and shutdown.
    lifecycle: tokio::sync::Mutex<()>,
}

impl InstructorEngine {
    /// Build an engine from a validated configuration. Nothing connects yet.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let in_flight = Arc::new(InFlight::new());
        let sink = Arc::new(AudioSink::new(
            config.session.output_sample_rate,
            config.audio.output_sample_rate,
            config.audio.buffer_seconds,
        ));
        let dispatch = Arc::new(DispatchQueue::new());
        let observers = Arc::new(Observers::new());
        let fanout = Arc::new(ResponseFanout::new(
            in_flight.clone(),
            sink.clone(),
            dispatch.clone(),
            observers.clone(),
        ));

        Ok(Self {
            connection: Arc::new(RealtimeConnection::new()),
            limiter: RateLimiter::new(&config.rate_limit),
            queue: Arc::new(RequestQueue::new(&config.queue)),
            in_flight,
            pump: RequestPump::new(),
            sink,
            dispatch,
            observers,
            fanout,
            sticky: Mutex::new(None),
            runtime: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observer registry. Callbacks only run inside [`tick`](Self::tick).
    pub fn observers(&self) -> &Arc<Observers> {
        &self.observers
    }

    /// Audio sink for the host's audio callback.
    pub fn audio_sink(&self) -> Arc<AudioSink> {
        self.sink.clone()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the session and start the pump.
    ///
    /// A failure is reported once to the error observers and returned; there
    /// is no retry.
    pub async fn connect(&self) -> RealtimeResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> RealtimeResult<()> {
        *self.runtime.lock() = Some(Handle::current());

        if !self.connection.is_connected() {
            // A pump left over from a previous session is bound to a dead token.
            // Nothing can start another until the new session is up.
            self.pump.stop();
        }

        let handler: Arc<dyn InboundHandler> = self.fanout.clone();
        if let Err(e) = self.connection.connect(&self.config.session, handler).await {
            tracing::error!("Failed to connect to realtime session: {}", e);
            self.fanout.report_error(e.to_string());
            return Err(e);
        }

        self.start_pump();
        Ok(())
    }

    /// Tear the session down, clear every piece of request state and connect
    /// again. With `resend_sticky`, the remembered sticky request is queued
    /// once more on the new session without passing admission.
    pub async fn hard_reset(&self, resend_sticky: bool) -> RealtimeResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        tracing::info!(resend_sticky, "Hard reset");

        self.pump.stop();
        self.connection.close().await;
        self.clear_state();

        self.connect_locked().await?;

        if resend_sticky {
            let sticky = self.sticky.lock().clone();
            if let Some(sticky) = sticky {
                tracing::info!(kind = %sticky.kind, "Re-sending sticky context");
                self.enqueue(sticky.refreshed());
                self.start_pump();
            }
        }
        Ok(())
    }

    /// Close the session and drop queued work. Observers stay registered.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.pump.stop();
        self.connection.close().await;
        self.queue.clear();
        self.in_flight.abandon();
        self.fanout.reset();
    }

    fn clear_state(&self) {
        let dropped = self.queue.clear();
        self.limiter.reset();
        self.in_flight.abandon();
        self.fanout.reset();
        self.sink.clear();
        // Callbacks already posted still run on the next tick.
        tracing::debug!(
            dropped,
            pending_dispatch = self.dispatch.len(),
            "Cleared engine state"
        );
    }

    // =========================================================================
    // Collaborator entry points
    // =========================================================================

    /// Submit a request. Fire-and-forget: returns whether it was admitted,
    /// but rejection is otherwise silent.
    pub fn notify(&self, request: PendingRequest) -> bool {
        if !self.connection.is_connected() {
            tracing::debug!(kind = %request.kind, "Not connected, dropping request");
            return false;
        }

        let verdict = self.limiter.check(&request.kind, Instant::now());
        if !verdict.is_admitted() {
            tracing::debug!(kind = %request.kind, ?verdict, "Request not admitted");
            return false;
        }

        if self.is_sticky_kind(&request.kind) {
            *self.sticky.lock() = Some(request.clone());
        }

        self.enqueue(request);
        self.start_pump();
        true
    }

    /// Submit a game event with optional context.
    pub fn notify_event(
        &self,
        kind: impl Into<String>,
        instruction: Option<String>,
        utterance: Option<String>,
        audio: Option<Bytes>,
    ) -> bool {
        let mut request = PendingRequest::new(kind);
        request.instruction = instruction;
        request.utterance = utterance;
        request.audio = audio;
        self.notify(request)
    }

    /// Submit a recorded player question, answered from the audio alone.
    pub fn notify_voice_only(&self, audio: Bytes, instruction: Option<String>) -> bool {
        self.notify(PendingRequest::voice_question(audio, instruction))
    }

    /// Remember `request` as the context re-sent after a hard reset.
    pub fn set_sticky_context(&self, request: PendingRequest) {
        *self.sticky.lock() = Some(request);
    }

    pub fn clear_sticky_context(&self) -> Option<PendingRequest> {
        self.sticky.lock().take()
    }

    pub fn sticky_context(&self) -> Option<PendingRequest> {
        self.sticky.lock().clone()
    }

    fn is_sticky_kind(&self, kind: &str) -> bool {
        self.config.sticky_kinds.iter().any(|k| k == kind)
    }

    fn enqueue(&self, request: PendingRequest) {
        let id = request.id;
        let kind = request.kind.clone();
        match self.queue.enqueue(request) {
            EnqueueOutcome::Queued => {
                tracing::debug!(
                    request_id = %id,
                    kind = %kind,
                    queued = self.queue.len(),
                    "Request queued"
                );
            }
            EnqueueOutcome::DroppedOldest(dropped) => {
                tracing::debug!(
                    request_id = %id,
                    kind = %kind,
                    dropped = %dropped.kind,
                    waiting = ?self.queue.kinds(),
                    "Request queued, oldest dropped"
                );
            }
            EnqueueOutcome::Rejected(_) => {
                tracing::debug!(
                    request_id = %id,
                    kind = %kind,
                    waiting = ?self.queue.kinds(),
                    "Request rejected, queue full"
                );
            }
        }
    }

    fn start_pump(&self) -> bool {
        if !self.connection.is_connected() {
            return false;
        }
        let Some(runtime) = self.runtime.lock().clone() else {
            return false;
        };

        self.pump.ensure_running(&runtime, || PumpTask {
            queue: self.queue.clone(),
            in_flight: self.in_flight.clone(),
            connection: self.connection.clone(),
            observer: self.fanout.clone(),
            base_instructions: self.config.session.instructions.clone(),
            response_timeout: self.config.queue.response_timeout(),
            cancel: self.connection.session_token(),
        })
    }

    // =========================================================================
    // Host hooks
    // =========================================================================

    /// Drain the dispatch queue, running observers on the calling thread.
    /// Returns how many callbacks ran.
    pub fn tick(&self) -> usize {
        self.dispatch.drain()
    }

    /// Fill an interleaved output buffer from the audio sink.
    pub fn render(&self, output: &mut [f32], channels: usize) -> usize {
        self.sink.render(output, channels)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            connection_state: self.connection.state(),
            queued_requests: self.queue.len(),
            in_flight: self.in_flight.is_active(),
            pump_running: self.pump.is_running(),
            dropped_requests: self.queue.dropped(),
            buffered_audio_samples: self.sink.buffered_samples(),
            overflowed_audio_samples: self.sink.overflowed_samples(),
            pending_dispatch: self.dispatch.len(),
        }
    }
}

impl Drop for InstructorEngine {
    fn drop(&mut self) {
        self.pump.stop();
        self.connection.session_token().cancel();
    }
}
