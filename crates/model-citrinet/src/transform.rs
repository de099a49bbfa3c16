//! Filterbank feature extraction.
//!
//! Linear pipeline mapping raw waveforms to normalized log-mel features:
//! dither → preemphasis → power spectrum → mel projection → per-example
//! normalization. The STFT runs on the CPU via rustfft and the result is
//! lifted back onto the input tensor's device; everything else stays in
//! candle ops.

use std::f32::consts::PI;

use candle_core::{DType, Device, Result, Tensor};
use citrinet_core::{AsrError, AsrResult};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::FilterbankConfig;

/// Guard added before the log so zero energies never produce -inf (2^-24).
const LOG_GUARD: f64 = 5.960_464_477_539_063e-8;

// ---------------------------------------------------------------------------
// Dither
// ---------------------------------------------------------------------------

/// Adds a small amount of noise to the waveform during training to
/// randomize quantization error.
#[derive(Debug, Clone)]
pub struct DitherAudio {
    dither: f64,
}

impl DitherAudio {
    /// Create a dither stage with the given noise amount.
    pub fn new(dither: f64) -> Self {
        Self { dither }
    }

    /// Apply dither to a `(batch, time)` waveform.
    ///
    /// Identity in eval mode or when the dither amount is zero, so the
    /// pipeline stays deterministic outside of training.
    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        if !train || self.dither == 0.0 {
            return Ok(x.clone());
        }
        // Only strictly-positive samples are dithered.
        let mask = x.gt(&x.zeros_like()?)?.to_dtype(x.dtype())?;
        let noise = (x.randn_like(0.0, 1.0)? * self.dither)?;
        x + (noise * mask)?
    }
}

// ---------------------------------------------------------------------------
// Preemphasis
// ---------------------------------------------------------------------------

/// First-order FIR filter `y[n] = x[n] - preemph * x[n-1]` emphasising the
/// high-frequency content of the signal.
#[derive(Debug, Clone)]
pub struct PreEmphasisFilter {
    preemph: f64,
}

impl PreEmphasisFilter {
    /// Create a preemphasis stage with the given filter factor.
    pub fn new(preemph: f64) -> Self {
        Self { preemph }
    }

    /// Apply the filter along the time axis of a `(batch, time)` tensor.
    /// The first sample passes through unchanged.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let time = x.dim(1)?;
        if time < 2 {
            return Ok(x.clone());
        }
        let first = x.narrow(1, 0, 1)?;
        let rest = (x.narrow(1, 1, time - 1)? - (x.narrow(1, 0, time - 1)? * self.preemph)?)?;
        Tensor::cat(&[&first, &rest], 1)
    }
}

// ---------------------------------------------------------------------------
// Power spectrum
// ---------------------------------------------------------------------------

/// Power spectrum over a centered short-time Fourier transform.
pub struct PowerSpectrum {
    win_length: usize,
    hop_length: usize,
    n_fft: usize,
    /// Symmetric Hann window of `win_length`.
    window: Vec<f32>,
}

impl PowerSpectrum {
    /// Create a power-spectrum stage.
    ///
    /// `n_fft` defaults to the next power of two of the window size.
    /// Window size and stride must be positive, and the FFT size must cover
    /// the window.
    pub fn new(
        n_window_size: usize,
        n_window_stride: usize,
        n_fft: Option<usize>,
    ) -> AsrResult<Self> {
        if n_window_size == 0 || n_window_stride == 0 {
            return Err(AsrError::Config(format!(
                "n_window_size ({n_window_size}) and n_window_stride ({n_window_stride}) \
                 must both be positive"
            )));
        }
        let n_fft = n_fft.unwrap_or_else(|| n_window_size.next_power_of_two());
        if n_fft < n_window_size {
            return Err(AsrError::Config(format!(
                "n_fft ({n_fft}) must not be smaller than n_window_size ({n_window_size})"
            )));
        }

        Ok(Self {
            win_length: n_window_size,
            hop_length: n_window_stride,
            n_fft,
            window: hann_window(n_window_size),
        })
    }

    /// FFT size in use.
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Number of frames produced for a signal of `num_samples`.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.hop_length + 1
    }

    /// Compute the power spectrum of a `(batch, time)` waveform.
    ///
    /// Returns a `(batch, n_fft/2 + 1, frames)` tensor on the input device.
    /// Frames are centered, with reflect padding at the signal borders.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, time) = x.dims2()?;
        let rows = x.to_dtype(DType::F32)?.to_vec2::<f32>()?;

        let n_freqs = self.n_fft / 2 + 1;
        let num_frames = self.num_frames(time);
        // The window is shorter than n_fft and sits centered inside it.
        let offset = (self.n_fft - self.win_length) / 2;
        let pad = (self.n_fft / 2) as isize;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let mut flat = Vec::with_capacity(batch * n_freqs * num_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for samples in &rows {
            let n = samples.len() as isize;
            let mut power = vec![0f32; n_freqs * num_frames];

            for frame_idx in 0..num_frames {
                let start = frame_idx as isize * self.hop_length as isize - pad;

                for (i, slot) in buffer.iter_mut().enumerate() {
                    let windowed = if i >= offset && i < offset + self.win_length {
                        let mut idx = start + i as isize;
                        // Reflect indices that fall outside the signal.
                        if idx < 0 {
                            idx = -idx;
                        }
                        if idx >= n {
                            idx = 2 * n - idx - 2;
                        }
                        if idx >= 0 && idx < n {
                            samples[idx as usize] * self.window[i - offset]
                        } else {
                            0.0
                        }
                    } else {
                        0.0
                    };
                    *slot = Complex::new(windowed, 0.0);
                }

                fft.process(&mut buffer);

                for (k, c) in buffer.iter().take(n_freqs).enumerate() {
                    power[k * num_frames + frame_idx] = c.re * c.re + c.im * c.im;
                }
            }

            flat.extend_from_slice(&power);
        }

        Tensor::from_vec(flat, (batch, n_freqs, num_frames), x.device())
    }
}

// ---------------------------------------------------------------------------
// Mel projection
// ---------------------------------------------------------------------------

/// Projects a power spectrum onto the mel scale, with optional guarded log
/// compression.
pub struct MelScale {
    /// Filterbank matrix, shape `(1, nfilt, n_fft/2 + 1)`.
    fb: Tensor,
    log_scale: bool,
}

impl MelScale {
    /// Create a mel projection for the given signal parameters.
    ///
    /// The filterbank uses the slaney scale and slaney area normalization,
    /// spanning 0 Hz to the Nyquist frequency.
    pub fn new(
        sample_rate: usize,
        n_fft: usize,
        nfilt: usize,
        log_scale: bool,
        device: &Device,
    ) -> Result<Self> {
        let n_freqs = n_fft / 2 + 1;
        let filterbank = slaney_filterbank(
            nfilt,
            n_fft,
            sample_rate as f32,
            0.0,
            sample_rate as f32 / 2.0,
        );
        let flat: Vec<f32> = filterbank.into_iter().flatten().collect();
        let fb = Tensor::from_vec(flat, (1, nfilt, n_freqs), device)?;
        Ok(Self { fb, log_scale })
    }

    /// Project a `(batch, n_fft/2 + 1, time)` power spectrum to
    /// `(batch, nfilt, time)` mel energies.
    ///
    /// With log scaling enabled, energies go through `ln(x + 2^-24)` and
    /// bins with zero energy stay exactly zero instead of `ln(eps)`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mel = self.fb.broadcast_matmul(x)?;
        if !self.log_scale {
            return Ok(mel);
        }
        let mask = mel.abs()?.gt(&mel.zeros_like()?)?;
        let log = (mel + LOG_GUARD)?.log()?;
        mask.where_cond(&log, &log.zeros_like()?)
    }
}

// ---------------------------------------------------------------------------
// Per-example normalization
// ---------------------------------------------------------------------------

/// Normalizes each example per feature over the time axis, counting only
/// non-zero timesteps.
#[derive(Debug, Clone)]
pub struct FeatureBatchNormalizer {
    div_guard: f64,
}

impl Default for FeatureBatchNormalizer {
    fn default() -> Self {
        Self { div_guard: 1e-5 }
    }
}

impl FeatureBatchNormalizer {
    /// Normalize a `(batch, features, time)` tensor.
    ///
    /// Zero timesteps (padding) do not contribute to the statistics and
    /// remain zero in the output. The standard deviation is floored by
    /// `div_guard`, and the non-zero count is clamped to one, so an
    /// all-zero row comes out all-zero without any NaN along the way.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mask = x.abs()?.gt(&x.zeros_like()?)?;
        let counts = mask.to_dtype(x.dtype())?.sum_keepdim(2)?;
        let counts = counts.maximum(&counts.ones_like()?)?;

        let mean = x.sum_keepdim(2)?.broadcast_div(&counts)?;
        let centered = x.broadcast_sub(&mean)?;
        let variance = centered.sqr()?.sum_keepdim(2)?.broadcast_div(&counts)?;
        let std = (variance.sqrt()? + self.div_guard)?;

        let normalized = centered.broadcast_div(&std)?;
        mask.where_cond(&normalized, &normalized.zeros_like()?)
    }
}

// ---------------------------------------------------------------------------
// Composite pipeline
// ---------------------------------------------------------------------------

/// The full filterbank feature pipeline used in front of the encoder.
pub struct FilterbankFeatures {
    dither: DitherAudio,
    preemph: PreEmphasisFilter,
    power: PowerSpectrum,
    mel: MelScale,
    norm: FeatureBatchNormalizer,
}

impl FilterbankFeatures {
    /// Build the pipeline from a [`FilterbankConfig`].
    pub fn new(config: &FilterbankConfig, device: &Device) -> AsrResult<Self> {
        let power = PowerSpectrum::new(
            config.n_window_size,
            config.n_window_stride,
            Some(config.n_fft),
        )?;
        let mel = MelScale::new(config.sample_rate, power.n_fft(), config.nfilt, true, device)?;

        Ok(Self {
            dither: DitherAudio::new(config.dither),
            preemph: PreEmphasisFilter::new(config.preemph),
            power,
            mel,
            norm: FeatureBatchNormalizer::default(),
        })
    }

    /// Map a `(batch, time)` waveform to `(batch, nfilt, frames)` features.
    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.dither.forward(x, train)?;
        let x = self.preemph.forward(&x)?;
        let x = self.power.forward(&x)?;
        let x = self.mel.forward(&x)?;
        self.norm.forward(&x)
    }

    /// Number of feature frames produced for `num_samples` of audio.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.power.num_frames(num_samples)
    }
}

// ---------------------------------------------------------------------------
// Window and filterbank construction
// ---------------------------------------------------------------------------

/// Symmetric Hann window.
fn hann_window(length: usize) -> Vec<f32> {
    if length == 1 {
        return vec![1.0];
    }
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f32 / (length - 1) as f32).cos()))
        .collect()
}

/// Convert frequency to the slaney mel scale (linear below 1 kHz, log
/// above).
fn hz_to_mel_slaney(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

/// Convert the slaney mel scale back to frequency.
fn mel_to_hz_slaney(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Slaney-normalized triangular mel filterbank, shape `(n_mels, n_fft/2+1)`.
fn slaney_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f32,
    f_min: f32,
    f_max: f32,
) -> Vec<Vec<f32>> {
    let n_freqs = n_fft / 2 + 1;

    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| i as f32 * sample_rate / n_fft as f32)
        .collect();

    // n_mels + 2 equally spaced points in mel space, converted back to Hz.
    let mel_min = hz_to_mel_slaney(f_min);
    let mel_max = hz_to_mel_slaney(f_max);
    let hz_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_min + i as f32 * (mel_max - mel_min) / (n_mels + 1) as f32)
        .map(mel_to_hz_slaney)
        .collect();

    let mut filterbank = vec![vec![0.0f32; n_freqs]; n_mels];

    for m in 0..n_mels {
        let f_left = hz_points[m];
        let f_center = hz_points[m + 1];
        let f_right = hz_points[m + 2];

        // Slaney normalization keeps each filter's area constant.
        let enorm = 2.0 / (f_right - f_left);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            if freq >= f_left && freq < f_center {
                filterbank[m][k] = enorm * (freq - f_left) / (f_center - f_left);
            } else if freq >= f_center && freq <= f_right {
                filterbank[m][k] = enorm * (f_right - freq) / (f_right - f_center);
            }
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> Device {
        Device::Cpu
    }

    #[test]
    fn test_hann_window_symmetric() {
        let window = hann_window(320);
        assert_eq!(window.len(), 320);
        assert!(window[0].abs() < 1e-6);
        // Symmetric window starts and ends at zero.
        assert!(window[319].abs() < 1e-6);
        assert!((window[1] - window[318]).abs() < 1e-6);
    }

    #[test]
    fn test_slaney_mel_roundtrip() {
        for hz in [250.0, 1000.0, 4000.0] {
            let back = mel_to_hz_slaney(hz_to_mel_slaney(hz));
            assert!((hz - back).abs() < 1e-2, "hz={hz} back={back}");
        }
    }

    #[test]
    fn test_slaney_filterbank_shape() {
        let fb = slaney_filterbank(64, 512, 16000.0, 0.0, 8000.0);
        assert_eq!(fb.len(), 64);
        assert_eq!(fb[0].len(), 257);
        for filter in &fb {
            assert!(filter.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_dither_eval_is_identity() {
        let x = Tensor::new(&[[0.5f32, -0.25, 0.0, 1.0]], &cpu()).unwrap();
        let dither = DitherAudio::new(1e-5);

        let eval = dither.forward(&x, false).unwrap();
        assert_eq!(
            eval.to_vec2::<f32>().unwrap(),
            x.to_vec2::<f32>().unwrap()
        );

        // Zero dither amount is an identity even in train mode.
        let zero = DitherAudio::new(0.0).forward(&x, true).unwrap();
        assert_eq!(
            zero.to_vec2::<f32>().unwrap(),
            x.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_preemphasis_values() {
        let x = Tensor::new(&[[1.0f32, 2.0, 3.0]], &cpu()).unwrap();
        let out = PreEmphasisFilter::new(0.97).forward(&x).unwrap();
        let values = out.to_vec2::<f32>().unwrap();

        assert!((values[0][0] - 1.0).abs() < 1e-6);
        assert!((values[0][1] - (2.0 - 0.97)).abs() < 1e-6);
        assert!((values[0][2] - (3.0 - 0.97 * 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_power_spectrum_rejects_bad_params() {
        assert!(PowerSpectrum::new(0, 160, None).is_err());
        assert!(PowerSpectrum::new(320, 0, None).is_err());
        assert!(PowerSpectrum::new(320, 160, Some(256)).is_err());
    }

    #[test]
    fn test_power_spectrum_shape() {
        let power = PowerSpectrum::new(320, 160, Some(512)).unwrap();
        assert_eq!(power.n_fft(), 512);

        let x = Tensor::zeros((2, 1600), DType::F32, &cpu()).unwrap();
        let out = power.forward(&x).unwrap();
        // 1600 / 160 + 1 frames, 512 / 2 + 1 bins.
        assert_eq!(out.dims(), &[2, 257, 11]);
    }

    #[test]
    fn test_power_spectrum_default_n_fft() {
        let power = PowerSpectrum::new(320, 160, None).unwrap();
        assert_eq!(power.n_fft(), 512);
    }

    #[test]
    fn test_log_mel_zero_input_is_exactly_zero() {
        let mel = MelScale::new(16000, 512, 64, true, &cpu()).unwrap();
        let x = Tensor::zeros((1, 257, 9), DType::F32, &cpu()).unwrap();
        let out = mel.forward(&x).unwrap();

        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalizer_zero_row_stays_zero() {
        // Feature 0 carries data, feature 1 is all padding.
        let x = Tensor::new(&[[[1.0f32, 3.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]]], &cpu()).unwrap();
        let out = FeatureBatchNormalizer::default().forward(&x).unwrap();
        let values = out.to_vec3::<f32>().unwrap();

        assert!(values[0][1].iter().all(|&v| v == 0.0));
        assert!(values[0][0].iter().all(|v| v.is_finite()));

        // Non-zero timesteps: mean over the two valid samples is 2, and the
        // squared deviations of the padded zeros still enter the variance.
        let std = (10.0f32 / 2.0).sqrt() + 1e-5;
        assert!((values[0][0][0] - (-1.0 / std)).abs() < 1e-5);
        assert!((values[0][0][1] - (1.0 / std)).abs() < 1e-5);
        // Padding positions are masked back to zero.
        assert_eq!(values[0][0][2], 0.0);
        assert_eq!(values[0][0][3], 0.0);
    }

    #[test]
    fn test_filterbank_pipeline_shape_and_determinism() {
        let config = FilterbankConfig::default();
        let features = FilterbankFeatures::new(&config, &cpu()).unwrap();

        let samples: Vec<f32> = (0..3200)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin())
            .collect();
        let x = Tensor::from_vec(samples, (1, 3200), &cpu()).unwrap();

        let first = features.forward(&x, false).unwrap();
        assert_eq!(first.dims(), &[1, 64, features.num_frames(3200)]);

        // Eval mode with default dither must be bit-deterministic.
        let second = features.forward(&x, false).unwrap();
        assert_eq!(
            first.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            second.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }
}
