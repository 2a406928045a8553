//! Linear interpolation resampler.
//!
//! Each chunk is resampled on its own: interpolation never reads past the
//! chunk's last sample and no fractional position is carried into the next
//! chunk. At chunk boundaries the final output samples repeat the last input
//! sample instead of blending into the following chunk.

/// Number of output samples produced for `input_len` source samples.
///
/// `ceil(input_len * to_rate / from_rate)`, computed exactly.
#[inline]
pub fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 || to_rate == 0 {
        return 0;
    }
    let numerator = input_len as u64 * to_rate as u64;
    numerator.div_ceil(from_rate as u64) as usize
}

/// Resample one chunk of mono float audio from `from_rate` to `to_rate`.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return input.to_vec();
    }

    let last = input.len() - 1;
    let step = from_rate as f64 / to_rate as f64;
    let count = output_len(input.len(), from_rate, to_rate);

    (0..count)
        .map(|t| {
            let pos = t as f64 * step;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = (pos - i0 as f64).clamp(0.0, 1.0) as f32;
            input[i0] + (input[i1] - input[i0]) * frac
        })
        .collect()
}
