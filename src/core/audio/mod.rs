//! Audio streaming pipeline.
//!
//! - `pcm`: PCM16 little-endian conversion
//! - `resample`: per-chunk linear resampling
//! - `ring_buffer`: fixed-capacity sample ring with drop-oldest overflow
//! - `sink`: decode, resample, buffer and render streamed model audio
//! - `capture`: helpers that turn microphone audio into request payloads

pub mod capture;
pub mod pcm;
pub mod resample;
mod ring_buffer;
mod sink;

use serde::{Deserialize, Serialize};

pub use ring_buffer::RingBuffer;
pub use sink::AudioSink;

/// Output side audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the host's output device (Hz).
    /// Default: 48000
    pub output_sample_rate: u32,

    /// Seconds of output audio the ring buffer can hold (at least one).
    /// Default: 10.0
    pub buffer_seconds: f32,

    /// RMS level under which captured voice clips are treated as silence.
    /// Default: 0.01
    pub silence_rms: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 48000,
            buffer_seconds: 10.0,
            silence_rms: capture::DEFAULT_SILENCE_RMS,
        }
    }
}
