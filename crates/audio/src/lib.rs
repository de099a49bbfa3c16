//! # audio
//!
//! Waveform front door for rust-citrinet:
//! - WAV file loading and duration probing
//! - Mono downmix
//! - Resampling to the model sample rate (16 kHz)

pub mod loader;
pub mod resample;

pub use loader::{audio_len, load_wav, to_mono};
pub use resample::Resampler;
