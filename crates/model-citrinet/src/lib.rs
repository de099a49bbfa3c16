//! # model-citrinet
//!
//! Citrinet encoder building blocks on candle:
//!
//! - [`FilterbankFeatures`]: waveform → normalized log-mel features
//! - [`SqueezeExcite`]: channel-attention gate
//! - [`CitrinetBlock`]: residual separable-convolution block
//! - [`CitrinetEncoder`]: stem + body assembly
//!
//! Layers are built from a `VarBuilder`, so the same code path serves
//! freshly initialized models (`VarMap`) and checkpoint weights
//! (safetensors).

pub mod blocks;
pub mod config;
pub mod encoder;
pub mod transform;

pub use blocks::{same_padding, BlockConfig, CitrinetBlock, SqueezeExcite};
pub use config::{EncoderConfig, FilterbankConfig};
pub use encoder::{CitrinetEncoder, FINAL_FILTERS, STEM_FILTERS};
pub use transform::{
    DitherAudio, FeatureBatchNormalizer, FilterbankFeatures, MelScale, PowerSpectrum,
    PreEmphasisFilter,
};
