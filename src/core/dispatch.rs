//! Main-loop dispatch queue and host observers.
//!
//! Background tasks never call host code directly. They post closures here and
//! the host drains the queue once per tick on its own thread, so every
//! observer runs on the host thread, in posting order, never concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

/// Deferred unit of work for the host thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO of callbacks drained on the host tick.
#[derive(Default)]
pub struct DispatchQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Callable from any thread.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        self.jobs.lock().push_back(Box::new(job));
    }

    /// Callbacks waiting for the next drain.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Run every queued callback in order, including ones posted while
    /// draining. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            // Run outside the lock so callbacks may post.
            let batch = std::mem::take(&mut *self.jobs.lock());
            if batch.is_empty() {
                return ran;
            }
            for job in batch {
                job();
                ran += 1;
            }
        }
    }
}

// =============================================================================
// Events and Observers
// =============================================================================

/// Event delivered to host observers.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructorEvent {
    /// Incremental response text
    TextDelta(String),
    /// Full response text
    TextComplete(String),
    /// Raw PCM16 LE chunk at the model output rate
    AudioChunk(Bytes),
    /// The response audio finished
    AudioComplete,
    /// Human-readable error
    Error(String),
}

pub type TextObserver = Arc<dyn Fn(&str) + Send + Sync>;
pub type AudioChunkObserver = Arc<dyn Fn(&[u8]) + Send + Sync>;
pub type CompletionObserver = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by observer registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Registry<F> = RwLock<Vec<(ObserverId, F)>>;

/// Observer registry for the five host-facing streams.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    text_delta: Registry<TextObserver>,
    text_complete: Registry<TextObserver>,
    audio_chunk: Registry<AudioChunkObserver>,
    audio_complete: Registry<CompletionObserver>,
    error: Registry<TextObserver>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_text_delta(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id();
        let f: TextObserver = Arc::new(f);
        self.text_delta.write().push((id, f));
        id
    }

    pub fn on_text_complete(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id();
        let f: TextObserver = Arc::new(f);
        self.text_complete.write().push((id, f));
        id
    }

    pub fn on_audio_chunk(&self, f: impl Fn(&[u8]) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id();
        let f: AudioChunkObserver = Arc::new(f);
        self.audio_chunk.write().push((id, f));
        id
    }

    pub fn on_audio_complete(&self, f: impl Fn() + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id();
        let f: CompletionObserver = Arc::new(f);
        self.audio_complete.write().push((id, f));
        id
    }

    pub fn on_error(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id();
        let f: TextObserver = Arc::new(f);
        self.error.write().push((id, f));
        id
    }

    /// Remove an observer from whichever stream it was registered on.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        fn remove<F>(registry: &Registry<F>, id: ObserverId) -> bool {
            let mut entries = registry.write();
            let before = entries.len();
            entries.retain(|(entry, _)| *entry != id);
            entries.len() != before
        }

        remove(&self.text_delta, id)
            || remove(&self.text_complete, id)
            || remove(&self.audio_chunk, id)
            || remove(&self.audio_complete, id)
            || remove(&self.error, id)
    }

    /// Invoke every observer of the event's stream. Only called from a drain.
    pub(crate) fn emit(&self, event: &InstructorEvent) {
        // Snapshot so observers can (un)subscribe from inside a callback.
        fn snapshot<F: Clone>(registry: &Registry<F>) -> Vec<F> {
            registry.read().iter().map(|(_, f)| f.clone()).collect()
        }

        match event {
            InstructorEvent::TextDelta(text) => {
                snapshot(&self.text_delta).iter().for_each(|f| f(text.as_str()))
            }
            InstructorEvent::TextComplete(text) => {
                snapshot(&self.text_complete).iter().for_each(|f| f(text.as_str()))
            }
            InstructorEvent::AudioChunk(chunk) => {
                snapshot(&self.audio_chunk).iter().for_each(|f| f(chunk.as_ref()))
            }
            InstructorEvent::AudioComplete => {
                snapshot(&self.audio_complete).iter().for_each(|f| f())
            }
            InstructorEvent::Error(message) => {
                snapshot(&self.error).iter().for_each(|f| f(message.as_str()))
            }
        }
    }
}

/// Post `event` so the observers see it on the next drain.
pub fn publish(dispatch: &DispatchQueue, observers: &Arc<Observers>, event: InstructorEvent) {
    let observers = observers.clone();
    dispatch.post(move || observers.emit(&event));
}
