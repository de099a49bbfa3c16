//! Shared data types.

/// Buffer of raw decoded audio.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Audio samples, normalized to [-1.0, 1.0], channels interleaved.
    pub samples: Vec<f32>,

    /// Sample rate in Hz.
    pub sample_rate: usize,

    /// Number of channels.
    pub channels: usize,
}

impl AudioBuffer {
    /// Create a new audio buffer.
    pub fn new(samples: Vec<f32>, sample_rate: usize, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate * self.channels) as f32
    }

    /// Number of samples per channel.
    pub fn num_samples(&self) -> usize {
        self.samples.len() / self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 32000], 16000, 2);
        assert!((buffer.duration() - 1.0).abs() < 1e-6);
        assert_eq!(buffer.num_samples(), 16000);
    }
}
