//! Audio resampling.

use citrinet_core::{AsrError, AsrResult, AudioBuffer};
use rubato::{FftFixedInOut, Resampler as RubatoResampler};

const CHUNK_SIZE: usize = 1024;

/// Resampler converting audio to the model sample rate.
pub struct Resampler {
    target_sample_rate: usize,
}

impl Resampler {
    /// Create a resampler with the given target sample rate.
    pub fn new(target_sample_rate: usize) -> Self {
        Self { target_sample_rate }
    }

    /// Resample a mono buffer to the target sample rate.
    ///
    /// Buffers already at the target rate are returned unchanged.
    pub fn resample(&self, buffer: &AudioBuffer) -> AsrResult<AudioBuffer> {
        if buffer.sample_rate == self.target_sample_rate {
            return Ok(buffer.clone());
        }
        if buffer.channels != 1 {
            return Err(AsrError::Audio(
                "Resampling requires mono audio, call to_mono() first".to_string(),
            ));
        }

        let mut resampler = FftFixedInOut::<f32>::new(
            buffer.sample_rate,
            self.target_sample_rate,
            CHUNK_SIZE,
            1,
        )
        .map_err(|e| AsrError::Audio(format!("Failed to create resampler: {e}")))?;

        let ratio = self.target_sample_rate as f64 / buffer.sample_rate as f64;
        let mut output = Vec::with_capacity((buffer.samples.len() as f64 * ratio) as usize + 1);

        for chunk in buffer.samples.chunks(CHUNK_SIZE) {
            // rubato wants fixed-size input; the tail chunk is zero-padded
            // and the surplus output trimmed below.
            let mut input = chunk.to_vec();
            let valid = input.len();
            input.resize(CHUNK_SIZE, 0.0);

            let processed = resampler
                .process(&[input], None)
                .map_err(|e| AsrError::Audio(format!("Resampling failed: {e}")))?;

            let produced = &processed[0];
            let keep = if valid == CHUNK_SIZE {
                produced.len()
            } else {
                ((produced.len() as f64 * valid as f64 / CHUNK_SIZE as f64) as usize)
                    .min(produced.len())
            };
            output.extend_from_slice(&produced[..keep]);
        }

        Ok(AudioBuffer::new(output, self.target_sample_rate, 1))
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(16000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_no_change() {
        let buffer = AudioBuffer::new(vec![0.0; 2048], 16000, 1);
        let result = Resampler::new(16000).resample(&buffer).unwrap();

        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.samples.len(), buffer.samples.len());
    }

    #[test]
    fn test_resampler_rejects_stereo() {
        let buffer = AudioBuffer::new(vec![0.0; 2048], 8000, 2);
        let err = Resampler::new(16000).resample(&buffer).unwrap_err();
        assert!(matches!(err, AsrError::Audio(_)));
    }

    #[test]
    fn test_resampler_halves_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 4096], 32000, 1);
        let result = Resampler::new(16000).resample(&buffer).unwrap();

        assert_eq!(result.sample_rate, 16000);
        // Downsampling 2:1 should roughly halve the sample count.
        let expected = buffer.samples.len() / 2;
        let diff = result.samples.len().abs_diff(expected);
        assert!(diff <= CHUNK_SIZE, "got {} samples", result.samples.len());
    }
}
