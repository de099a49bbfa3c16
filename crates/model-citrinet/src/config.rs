//! Configuration structures for the Citrinet encoder and its feature
//! front-end.

use serde::{Deserialize, Serialize};

/// Configuration of the encoder body.
///
/// The three lists run in parallel: entry `i` describes the `i`-th body
/// block. The stem and the final block are fixed and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Output channels of each body block.
    pub filters: Vec<usize>,

    /// Convolution kernel size of each body block.
    pub kernel_sizes: Vec<usize>,

    /// Stride of each body block (applied by the last repetition).
    pub strides: Vec<usize>,

    /// Number of input features (mel bins), 80 by default.
    #[serde(default = "default_feat_in")]
    pub feat_in: usize,
}

fn default_feat_in() -> usize {
    80
}

impl EncoderConfig {
    /// Create an encoder config with the default input feature count.
    pub fn new(filters: Vec<usize>, kernel_sizes: Vec<usize>, strides: Vec<usize>) -> Self {
        Self {
            filters,
            kernel_sizes,
            strides,
            feat_in: default_feat_in(),
        }
    }
}

/// Configuration of the filterbank feature pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterbankConfig {
    /// Sample rate of the input signal in Hz.
    pub sample_rate: usize,

    /// STFT window size in samples.
    pub n_window_size: usize,

    /// STFT window stride in samples.
    pub n_window_stride: usize,

    /// Number of FFT bins.
    pub n_fft: usize,

    /// Preemphasis filtering control factor.
    pub preemph: f64,

    /// Number of output mel filters.
    pub nfilt: usize,

    /// Amount of dither added during training.
    pub dither: f64,
}

impl Default for FilterbankConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_window_size: 320,
            n_window_stride: 160,
            n_fft: 512,
            preemph: 0.97,
            nfilt: 64,
            dither: 1e-5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filterbank_defaults() {
        let config = FilterbankConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.n_window_size, 320);
        assert_eq!(config.n_window_stride, 160);
        assert_eq!(config.n_fft, 512);
        assert_eq!(config.nfilt, 64);
        assert!((config.preemph - 0.97).abs() < 1e-9);
        assert!((config.dither - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn test_encoder_config_feat_in_default() {
        let config = EncoderConfig::new(vec![256, 256], vec![11, 13], vec![1, 2]);
        assert_eq!(config.feat_in, 80);

        // feat_in may be omitted when deserializing.
        let json = r#"{"filters":[256],"kernel_sizes":[11],"strides":[1]}"#;
        let parsed: EncoderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.feat_in, 80);
        assert_eq!(parsed.filters, vec![256]);
    }
}
