//! Fixed-capacity sample ring buffer.
//!
//! One producer (the network receive task) and one consumer (the audio render
//! callback) share a single mutex. The lock is taken per sample so neither
//! side ever holds it for long. A full buffer drops its oldest sample: the
//! producer never blocks and playback stays close to real time.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

struct RingState {
    samples: Box<[f32]>,
    /// Next slot to write
    write: usize,
    /// Next slot to read
    read: usize,
    /// Unread samples; `(write - read) mod capacity == count`
    count: usize,
}

/// Mutex-guarded ring of output-rate samples.
pub struct RingBuffer {
    state: Mutex<RingState>,
    capacity: usize,
    sample_rate: u32,
    overflowed: AtomicU64,
}

impl RingBuffer {
    /// Create a buffer holding `capacity` samples (at least one).
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                samples: vec![0.0; capacity].into_boxed_slice(),
                write: 0,
                read: 0,
                count: 0,
            }),
            capacity,
            sample_rate,
            overflowed: AtomicU64::new(0),
        }
    }

    /// Create a buffer holding `seconds` of audio, never less than one second.
    pub fn with_duration(seconds: f32, sample_rate: u32) -> Self {
        let requested = (sample_rate as f64 * seconds.max(0.0) as f64) as usize;
        Self::new(requested.max(sample_rate as usize), sample_rate)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Unread samples.
    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples discarded because the buffer was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Write one sample. Returns false when the oldest sample was dropped.
    pub fn push(&self, sample: f32) -> bool {
        let mut state = self.state.lock();
        let write = state.write;
        state.samples[write] = sample;
        state.write = (write + 1) % self.capacity;

        if state.count == self.capacity {
            state.read = (state.read + 1) % self.capacity;
            drop(state);
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            false
        } else {
            state.count += 1;
            true
        }
    }

    /// Write samples one at a time. Returns how many older samples were dropped.
    pub fn push_slice(&self, samples: &[f32]) -> usize {
        samples.iter().filter(|&&s| !self.push(s)).count()
    }

    /// Read the oldest unread sample.
    pub fn pop(&self) -> Option<f32> {
        let mut state = self.state.lock();
        if state.count == 0 {
            return None;
        }
        let sample = state.samples[state.read];
        state.read = (state.read + 1) % self.capacity;
        state.count -= 1;
        Some(sample)
    }

    /// Drop every unread sample.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.read = 0;
        state.write = 0;
        state.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let buffer = RingBuffer::new(4, 48000);
        assert!(buffer.push(0.1));
        assert!(buffer.push(0.2));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(), Some(0.1));
        assert_eq!(buffer.pop(), Some(0.2));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = RingBuffer::new(3, 48000);
        let dropped = buffer.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(dropped, 2);
        assert_eq!(buffer.overflowed(), 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop(), Some(3.0));
        assert_eq!(buffer.pop(), Some(4.0));
        assert_eq!(buffer.pop(), Some(5.0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let buffer = RingBuffer::new(3, 48000);
        for round in 0..10 {
            let base = round as f32 * 10.0;
            buffer.push_slice(&[base, base + 1.0]);
            assert_eq!(buffer.pop(), Some(base));
            assert_eq!(buffer.pop(), Some(base + 1.0));
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_producer_never_blocks_when_full() {
        let buffer = RingBuffer::new(1000, 48000);
        let samples = vec![0.5f32; 100_000];
        let dropped = buffer.push_slice(&samples);
        assert_eq!(dropped, 99_000);
        assert_eq!(buffer.len(), 1000);
    }

    #[test]
    fn test_clear() {
        let buffer = RingBuffer::new(8, 48000);
        buffer.push_slice(&[1.0, 2.0, 3.0]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_with_duration() {
        let buffer = RingBuffer::with_duration(10.0, 48000);
        assert_eq!(buffer.capacity(), 480_000);
        assert_eq!(buffer.sample_rate(), 48000);

        // Never shorter than one second.
        let buffer = RingBuffer::with_duration(0.1, 48000);
        assert_eq!(buffer.capacity(), 48000);
    }
}
