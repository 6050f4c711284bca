//! Streaming sample rate conversion using rubato
//!
//! Converts decoded audio from the source rate to the output device rate in
//! fixed-size chunks as packets arrive. Playback speed is not handled here;
//! the output stage steps through the converted frames at the current rate.

use crate::audio::CHANNELS;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per rubato call
const CHUNK_FRAMES: usize = 1024;

/// Stereo resampler fed with interleaved packets of any length
pub struct StreamResampler {
    /// `None` when source and device rates match
    inner: Option<FastFixedIn<f32>>,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(Self {
                inner: None,
                pending: vec![Vec::new(); CHANNELS],
            });
        }

        debug!("Resampling from {}Hz to {}Hz", input_rate, output_rate);
        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            CHANNELS,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            inner: Some(resampler),
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); CHANNELS],
        })
    }

    /// Feed interleaved stereo samples, returning whatever is ready
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        append_planar(&mut self.pending, interleaved);

        let mut output = Vec::new();
        while self.pending[0].len() >= resampler.input_frames_next() {
            let take = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..take).collect())
                .collect();
            let converted = resampler
                .process(&chunk, None)
                .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;
            output.extend(interleave(converted));
        }
        Ok(output)
    }

    /// Convert whatever is still pending at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let rest: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let converted = resampler
            .process_partial(Some(rest.as_slice()), None)
            .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;
        Ok(interleave(converted))
    }

    /// Forget buffered input, e.g. after a seek
    pub fn reset(&mut self) {
        for channel in &mut self.pending {
            channel.clear();
        }
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
    }
}

/// Append interleaved stereo to planar channel buffers
///
/// Input:  [L, R, L, R, ...]
/// Output: [[.., L, L], [.., R, R]]
fn append_planar(planar: &mut [Vec<f32>], interleaved: &[f32]) {
    for frame in interleaved.chunks_exact(CHANNELS) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
}

/// Planar channel buffers to interleaved samples
fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(frames) = planar.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame_idx in 0..frames {
        for channel in &planar {
            interleaved.push(channel[frame_idx]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_planar_round_trip() {
        let mut planar = vec![Vec::new(), Vec::new()];
        append_planar(&mut planar, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
        assert_eq!(interleave(planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(interleave(Vec::new()).is_empty());
    }

    #[test]
    fn test_same_rate_passes_through() {
        let mut resampler = StreamResampler::new(44100, 44100).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.process(&input).unwrap(), input);
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_chunked_conversion_length() {
        let mut resampler = StreamResampler::new(48000, 44100).unwrap();
        let input = sine(10_000, 48000);

        let mut output = Vec::new();
        // Uneven packet sizes, like a real decoder
        for packet in input.chunks(1152 * 2) {
            output.extend(resampler.process(packet).unwrap());
        }
        output.extend(resampler.flush().unwrap());

        let frames = output.len() / CHANNELS;
        let expected = (10_000.0 * 44100.0 / 48000.0) as usize;
        assert!(
            frames + 200 >= expected && frames <= expected + 1200,
            "Expected ~{} frames, got {}",
            expected,
            frames
        );
    }
}
