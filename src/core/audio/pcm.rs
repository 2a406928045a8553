//! PCM16 little-endian conversion.

/// Scale for decoding PCM16 into [-1.0, 1.0).
const PCM16_DECODE_SCALE: f32 = 32768.0;

/// Scale for encoding floats into PCM16.
const PCM16_ENCODE_SCALE: f32 = 32767.0;

/// Convert one PCM16 sample to float.
#[inline]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM16_DECODE_SCALE
}

/// Convert one float sample to PCM16, clamping out-of-range input.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_ENCODE_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Decode PCM16 LE bytes into float samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Encode float samples as PCM16 LE bytes.
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_pcm16(sample).to_le_bytes());
    }
    bytes
}
