//! Streamed audio sink.
//!
//! Model audio arrives as PCM16 chunks at the source rate, is resampled to the
//! output device rate and lands in the ring buffer. The host's audio callback
//! pulls it back out through [`AudioSink::render`].

use super::pcm::decode_pcm16_le;
use super::resample::resample_linear;
use super::ring_buffer::RingBuffer;

/// Ring-buffered sink between the receive task and the audio callback.
pub struct AudioSink {
    buffer: RingBuffer,
    source_rate: u32,
    output_rate: u32,
}

impl AudioSink {
    /// Create a sink converting `source_rate` audio to `output_rate`, holding
    /// `buffer_seconds` of output audio.
    pub fn new(source_rate: u32, output_rate: u32, buffer_seconds: f32) -> Self {
        Self {
            buffer: RingBuffer::with_duration(buffer_seconds, output_rate),
            source_rate,
            output_rate,
        }
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Samples waiting to be rendered.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Samples dropped because playback fell behind.
    pub fn overflowed_samples(&self) -> u64 {
        self.buffer.overflowed()
    }

    /// Decode, resample and buffer one PCM16 LE chunk.
    ///
    /// Returns the number of output-rate samples written.
    pub fn push_pcm16(&self, chunk: &[u8]) -> usize {
        let samples = decode_pcm16_le(chunk);
        if samples.is_empty() {
            return 0;
        }
        let resampled = resample_linear(&samples, self.source_rate, self.output_rate);
        let dropped = self.buffer.push_slice(&resampled);
        if dropped > 0 {
            tracing::trace!(dropped, "Audio buffer full, dropped oldest samples");
        }
        resampled.len()
    }

    /// Fill an interleaved output buffer of `channels` channels.
    ///
    /// Pops one sample per frame and copies it to every channel; frames past
    /// the buffered audio are silent, as is a trailing partial frame. Never
    /// allocates. Returns the number of frames that carried buffered audio.
    pub fn render(&self, output: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let mut rendered = 0;
        let mut frames = output.chunks_exact_mut(channels);
        for frame in &mut frames {
            let sample = match self.buffer.pop() {
                Some(sample) => {
                    rendered += 1;
                    sample
                }
                None => 0.0,
            };
            frame.fill(sample);
        }
        frames.into_remainder().fill(0.0);
        rendered
    }

    /// Drop all buffered audio.
    pub fn clear(&self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::pcm::encode_pcm16_le;

    #[test]
    fn test_render_underrun_is_silence() {
        let sink = AudioSink::new(24000, 48000, 1.0);
        let mut output = vec![1.0f32; 256];
        let rendered = sink.render(&mut output, 2);
        assert_eq!(rendered, 0);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_push_resamples_to_output_rate() {
        let sink = AudioSink::new(24000, 48000, 1.0);
        let chunk = encode_pcm16_le(&[0.0, 0.5]);
        assert_eq!(sink.push_pcm16(&chunk), 4);
        assert_eq!(sink.buffered_samples(), 4);
    }

    #[test]
    fn test_render_replicates_across_channels() {
        let sink = AudioSink::new(48000, 48000, 1.0);
        sink.push_pcm16(&encode_pcm16_le(&[0.5, -0.5]));

        let mut output = vec![9.0f32; 8];
        let rendered = sink.render(&mut output, 2);

        assert_eq!(rendered, 2);
        let expected_second = -16383.0 / 32768.0;
        assert_eq!(&output[0..2], &[16383.0 / 32768.0, 16383.0 / 32768.0]);
        assert_eq!(&output[2..4], &[expected_second, expected_second]);
        assert_eq!(&output[4..8], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_render_partial_frame_is_silent() {
        let sink = AudioSink::new(48000, 48000, 1.0);
        sink.push_pcm16(&encode_pcm16_le(&[0.5, 0.5, 0.5]));

        let mut output = vec![9.0f32; 5];
        assert_eq!(sink.render(&mut output, 2), 2);
        assert_eq!(output[4], 0.0);
        // The partial frame did not consume the third sample.
        assert_eq!(sink.buffered_samples(), 1);
    }

    #[test]
    fn test_clear_drops_audio() {
        let sink = AudioSink::new(24000, 24000, 1.0);
        sink.push_pcm16(&encode_pcm16_le(&[0.1; 100]));
        sink.clear();
        assert_eq!(sink.buffered_samples(), 0);
    }

    #[test]
    fn test_empty_chunk_is_ignored() {
        let sink = AudioSink::new(24000, 48000, 1.0);
        assert_eq!(sink.push_pcm16(&[]), 0);
        assert_eq!(sink.push_pcm16(&[0x01]), 0);
    }
}
