//! The request pump and the in-flight marker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{PendingRequest, RequestQueue};
use crate::core::realtime::{RealtimeConnection, RealtimeError, RealtimeResult};

// =============================================================================
// In-Flight Marker
// =============================================================================

/// Marker for the single request currently on the wire.
///
/// Holds the sending half of a one-shot completion signal. Resolving sends on
/// it; abandoning drops it, which the waiting pump observes as a closed
/// channel.
#[derive(Default)]
pub struct InFlight {
    slot: Mutex<Option<(Uuid, oneshot::Sender<()>)>>,
    active: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request is awaiting its response.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark `id` as in flight and return its completion signal.
    pub fn begin(&self, id: Uuid) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock() = Some((id, tx));
        self.active.store(true, Ordering::SeqCst);
        rx
    }

    /// Resolve the in-flight signal. Returns false when nothing was in flight.
    pub fn resolve(&self) -> bool {
        let taken = self.slot.lock().take();
        self.active.store(false, Ordering::SeqCst);
        match taken {
            Some((id, tx)) => {
                tracing::debug!(request_id = %id, "Response complete");
                // The pump may already have given up on this request.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Clear the marker without resolving it.
    pub fn abandon(&self) {
        if let Some((id, _tx)) = self.slot.lock().take() {
            tracing::debug!(request_id = %id, "Abandoned in-flight request");
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Pump
// =============================================================================

/// Hooks the pump calls around each exchange.
pub trait PumpObserver: Send + Sync + 'static {
    /// A request is about to be written; the previous response is over.
    fn on_request_started(&self, request: &PendingRequest);

    /// The pump failed to deliver or complete a request.
    fn on_pump_error(&self, error: &RealtimeError);
}

enum Completion {
    Completed,
    Abandoned,
    TimedOut,
}

/// Everything one pump task needs, bound to one session.
pub struct PumpTask {
    pub queue: Arc<RequestQueue>,
    pub in_flight: Arc<InFlight>,
    pub connection: Arc<RealtimeConnection>,
    pub observer: Arc<dyn PumpObserver>,
    pub base_instructions: String,
    pub response_timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl PumpTask {
    /// Drain the queue one exchange at a time until the session ends.
    pub async fn run(self) {
        tracing::debug!("Request pump started");

        loop {
            let request = tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = self.queue.next() => request,
            };

            let completion = self.in_flight.begin(request.id);
            self.observer.on_request_started(&request);

            tracing::info!(
                request_id = %request.id,
                kind = %request.kind,
                waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
                "Sending request"
            );

            let sent = tokio::select! {
                _ = self.cancel.cancelled() => Err(RealtimeError::Cancelled),
                result = self.send_request(&request) => result,
            };

            match sent {
                Ok(()) => {}
                Err(RealtimeError::Cancelled) => {
                    self.in_flight.abandon();
                    break;
                }
                Err(e) => {
                    tracing::error!(request_id = %request.id, "Queue pump error: {}", e);
                    self.in_flight.abandon();
                    self.observer.on_pump_error(&e);
                    break;
                }
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => Completion::Abandoned,
                outcome = await_completion(completion, self.response_timeout) => outcome,
            };

            match outcome {
                Completion::Completed => {}
                Completion::Abandoned => {
                    self.in_flight.abandon();
                    break;
                }
                Completion::TimedOut => {
                    self.in_flight.abandon();
                    let error = RealtimeError::Timeout(format!(
                        "no response to {} request",
                        request.kind
                    ));
                    tracing::warn!(request_id = %request.id, "{}", error);
                    self.observer.on_pump_error(&error);
                }
            }
        }

        tracing::debug!("Request pump stopped");
    }

    async fn send_request(&self, request: &PendingRequest) -> RealtimeResult<()> {
        for event in request.to_client_events(&self.base_instructions) {
            self.connection.send(&event).await?;
        }
        Ok(())
    }
}

async fn await_completion(
    completion: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> Completion {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, completion).await {
            Ok(result) => result,
            Err(_) => return Completion::TimedOut,
        },
        None => completion.await,
    };
    match result {
        Ok(()) => Completion::Completed,
        Err(_) => Completion::Abandoned,
    }
}

/// Owner of the pump task handle.
#[derive(Default)]
pub struct RequestPump {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RequestPump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pump task is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn a pump task on `runtime` unless one is already alive.
    pub fn ensure_running(&self, runtime: &Handle, task: impl FnOnce() -> PumpTask) -> bool {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *handle = Some(runtime.spawn(task().run()));
        true
    }

    /// Abort the pump task, if any.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}
