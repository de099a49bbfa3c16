//! Citrinet encoder assembly.
//!
//! A fixed stem block, a configurable list of residual body blocks and a
//! fixed final block, all depthwise-separable. The body topology comes
//! from the parallel filter/kernel/stride lists in [`EncoderConfig`].

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use tracing::info;

use crate::blocks::{BlockConfig, CitrinetBlock};
use crate::config::EncoderConfig;

/// Output channels of the stem block.
pub const STEM_FILTERS: usize = 256;
/// Output channels of the final block (the encoder output dimension).
pub const FINAL_FILTERS: usize = 640;

const STEM_KERNEL: usize = 5;
const FINAL_KERNEL: usize = 41;

/// The stem: first block of the encoder, processing the features directly.
/// Single repetition, no residual branch.
pub fn stem(feat_in: usize, vb: VarBuilder) -> Result<CitrinetBlock> {
    CitrinetBlock::load(
        feat_in,
        STEM_FILTERS,
        &BlockConfig {
            repeat: 1,
            kernel_size: STEM_KERNEL,
            residual: false,
            separable: true,
            ..Default::default()
        },
        vb,
    )
}

/// The body: one residual block per filter/kernel/stride triple, channels
/// chained from the stem, terminated by the fixed final block.
pub fn body(
    filters: &[usize],
    kernel_sizes: &[usize],
    strides: &[usize],
    vb: VarBuilder,
) -> Result<Vec<CitrinetBlock>> {
    let mut blocks = Vec::with_capacity(filters.len() + 1);
    let mut in_channels = STEM_FILTERS;

    for (i, ((&f, &k), &s)) in filters
        .iter()
        .zip(kernel_sizes.iter())
        .zip(strides.iter())
        .enumerate()
    {
        blocks.push(CitrinetBlock::load(
            in_channels,
            f,
            &BlockConfig {
                kernel_size: k,
                stride: s,
                separable: true,
                ..Default::default()
            },
            vb.pp(format!("{i}")),
        )?);
        in_channels = f;
    }

    blocks.push(CitrinetBlock::load(
        in_channels,
        FINAL_FILTERS,
        &BlockConfig {
            repeat: 1,
            kernel_size: FINAL_KERNEL,
            residual: false,
            separable: true,
            ..Default::default()
        },
        vb.pp(format!("{}", filters.len())),
    )?);

    Ok(blocks)
}

/// The full Citrinet encoder: stem followed by the body blocks.
pub struct CitrinetEncoder {
    stem: CitrinetBlock,
    body: Vec<CitrinetBlock>,
}

impl CitrinetEncoder {
    /// Assemble the encoder from its configuration.
    ///
    /// The filter, kernel-size and stride lists must have equal lengths.
    pub fn load(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        if config.filters.len() != config.kernel_sizes.len()
            || config.filters.len() != config.strides.len()
        {
            candle_core::bail!(
                "filters ({}), kernel_sizes ({}) and strides ({}) must have the same length",
                config.filters.len(),
                config.kernel_sizes.len(),
                config.strides.len()
            );
        }

        let stem = stem(config.feat_in, vb.pp("stem"))?;
        let body = body(
            &config.filters,
            &config.kernel_sizes,
            &config.strides,
            vb.pp("body"),
        )?;

        info!(
            "Citrinet encoder assembled: {} blocks, feat_in={}, output dim {}",
            body.len() + 1,
            config.feat_in,
            FINAL_FILTERS
        );

        Ok(Self { stem, body })
    }

    /// features: `(batch, feat_in, time)` → `(batch, 640, time')`.
    pub fn forward(&self, features: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = self.stem.forward(features, train)?;
        for block in &self.body {
            h = block.forward(&h, train)?;
        }
        Ok(h)
    }

    /// Output length after all strided blocks, via ceiling division.
    pub fn output_length(&self, input_length: usize) -> usize {
        let mut length = self.stem.output_length(input_length);
        for block in &self.body {
            length = block.output_length(length);
        }
        length
    }

    /// Encoder output dimension.
    pub fn output_dim(&self) -> usize {
        FINAL_FILTERS
    }
}
