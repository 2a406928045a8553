//! Voice capture helpers for player questions.
//!
//! Turns a span of captured microphone audio into the PCM16 payload expected
//! by [`InstructorEngine::notify_voice_only`](crate::InstructorEngine::notify_voice_only).

use bytes::Bytes;
use thiserror::Error;

use super::pcm::encode_pcm16_le;
use super::resample::resample_linear;

/// Default RMS level under which a clip counts as silence.
pub const DEFAULT_SILENCE_RMS: f32 = 0.01;

/// Why a captured clip was not turned into a payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipRejected {
    #[error("clip too short: {samples} samples, need {min}")]
    TooShort { samples: usize, min: usize },

    #[error("silence (rms={rms:.4})")]
    Silent { rms: f32 },
}

/// Average interleaved frames into one mono channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Root mean square level of a clip. Zero for an empty clip.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Gate, resample and encode a mono clip.
///
/// Clips shorter than a tenth of a second at `target_rate`, or quieter than
/// `silence_rms`, are rejected.
pub fn prepare_voice_clip(
    mono: &[f32],
    source_rate: u32,
    target_rate: u32,
    silence_rms: f32,
) -> Result<Bytes, ClipRejected> {
    let min = (target_rate / 10) as usize;
    if mono.len() < min || mono.is_empty() {
        return Err(ClipRejected::TooShort {
            samples: mono.len(),
            min,
        });
    }

    let level = rms(mono);
    if level < silence_rms {
        return Err(ClipRejected::Silent { rms: level });
    }

    let resampled;
    let samples: &[f32] = if source_rate == target_rate {
        mono
    } else {
        resampled = resample_linear(mono, source_rate, target_rate);
        &resampled
    };

    Ok(Bytes::from(encode_pcm16_le(samples)))
}
