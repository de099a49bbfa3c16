//! Citrinet building blocks: squeeze-excitation gate and the residual
//! convolutional block.

use candle_core::{Result, Tensor, D};
use candle_nn::{
    batch_norm, conv1d_no_bias, linear_no_bias, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig,
    Dropout, Linear, Module, ModuleT, VarBuilder,
};

/// Reduction ratio of the squeeze-excitation bottleneck.
pub const SE_REDUCTION_RATIO: usize = 8;

/// Padding that keeps the unstrided output length equal to the input
/// length.
///
/// Stride and dilation cannot both exceed one: the "same" padding formula
/// only holds for one of them at a time.
pub fn same_padding(kernel_size: usize, stride: usize, dilation: usize) -> Result<usize> {
    if stride > 1 && dilation > 1 {
        candle_core::bail!(
            "only stride OR dilation may be greater than 1 (got stride={stride}, dilation={dilation})"
        );
    }
    Ok(dilation * (kernel_size - 1) / 2)
}

// ---------------------------------------------------------------------------
// Squeeze-and-Excitation
// ---------------------------------------------------------------------------

/// Squeeze-and-Excitation gate.
///
/// Pools the time axis down to one value per channel, squeezes through a
/// bias-free bottleneck and expands back, then scales the input by the
/// sigmoid of the result. Input and output shapes are identical.
pub struct SqueezeExcite {
    fc1: Linear,
    fc2: Linear,
}

impl SqueezeExcite {
    /// Build the gate for `channels` with the given reduction ratio.
    ///
    /// The channel count must divide evenly by the reduction ratio.
    pub fn load(channels: usize, reduction_ratio: usize, vb: VarBuilder) -> Result<Self> {
        if reduction_ratio == 0 || channels % reduction_ratio != 0 {
            candle_core::bail!(
                "squeeze-excite channels ({channels}) must be divisible by the reduction ratio ({reduction_ratio})"
            );
        }
        let hidden = channels / reduction_ratio;
        let fc1 = linear_no_bias(channels, hidden, vb.pp("fc.0"))?;
        let fc2 = linear_no_bias(hidden, channels, vb.pp("fc.2"))?;
        Ok(Self { fc1, fc2 })
    }
}

impl Module for SqueezeExcite {
    /// x: `(batch, channels, time)` → `(batch, channels, time)`
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = x.mean_keepdim(D::Minus1)?; // (batch, channels, 1)
        let y = y.transpose(1, 2)?; // (batch, 1, channels)
        let y = self.fc1.forward(&y)?.relu()?;
        let y = self.fc2.forward(&y)?;
        let gate = candle_nn::ops::sigmoid(&y.transpose(1, 2)?)?; // (batch, channels, 1)
        x.broadcast_mul(&gate)
    }
}

// ---------------------------------------------------------------------------
// Convolution + batch norm unit
// ---------------------------------------------------------------------------

/// One convolution (optionally depthwise-separable) followed by batch
/// normalization. All convolutions are bias-free; the norm carries the
/// bias.
struct ConvBn {
    depthwise: Option<Conv1d>,
    conv: Conv1d,
    bn: BatchNorm,
}

impl ConvBn {
    #[allow(clippy::too_many_arguments)]
    fn load(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        dilation: usize,
        padding: usize,
        separable: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let (depthwise, conv) = if separable {
            let dw_cfg = Conv1dConfig {
                padding,
                stride,
                dilation,
                groups: in_channels,
            };
            let depthwise =
                conv1d_no_bias(in_channels, in_channels, kernel_size, dw_cfg, vb.pp("depthwise"))?;

            let pw_cfg = Conv1dConfig {
                padding: 0,
                stride: 1,
                dilation: 1,
                groups: 1,
            };
            let pointwise = conv1d_no_bias(in_channels, out_channels, 1, pw_cfg, vb.pp("pointwise"))?;
            (Some(depthwise), pointwise)
        } else {
            let cfg = Conv1dConfig {
                padding,
                stride,
                dilation,
                groups: 1,
            };
            let conv = conv1d_no_bias(in_channels, out_channels, kernel_size, cfg, vb.pp("conv"))?;
            (None, conv)
        };

        let bn = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self {
            depthwise,
            conv,
            bn,
        })
    }

    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = match &self.depthwise {
            Some(depthwise) => self.conv.forward(&depthwise.forward(x)?)?,
            None => self.conv.forward(x)?,
        };
        self.bn.forward_t(&h, train)
    }
}

// ---------------------------------------------------------------------------
// Citrinet block
// ---------------------------------------------------------------------------

/// Parameters of a [`CitrinetBlock`].
#[derive(Debug, Clone)]
pub struct BlockConfig {
    /// Number of convolution repetitions inside the block.
    pub repeat: usize,
    /// Convolution kernel size.
    pub kernel_size: usize,
    /// Stride, applied by the last repetition only.
    pub stride: usize,
    /// Dilation of every repetition.
    pub dilation: usize,
    /// Dropout probability used before each activation.
    pub dropout: f32,
    /// Whether the block carries a residual projection branch.
    pub residual: bool,
    /// Whether convolutions are depthwise-separable.
    pub separable: bool,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            repeat: 5,
            kernel_size: 11,
            stride: 1,
            dilation: 1,
            dropout: 0.0,
            residual: true,
            separable: false,
        }
    }
}

/// Residual convolutional block.
///
/// `repeat - 1` unit-stride conv/norm/activation/dropout groups, one final
/// conv/norm carrying the stride, a squeeze-excitation gate, an optional
/// 1×1 projection branch matching channels and stride for the residual
/// sum, and a trailing activation + dropout.
pub struct CitrinetBlock {
    convs: Vec<ConvBn>,
    se: SqueezeExcite,
    res: Option<ConvBn>,
    dropout: Dropout,
    stride: usize,
}

impl CitrinetBlock {
    pub fn load(
        in_channels: usize,
        out_channels: usize,
        config: &BlockConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        if config.repeat == 0 {
            candle_core::bail!("block repeat must be at least 1");
        }

        let mut convs = Vec::with_capacity(config.repeat);
        let mut channels = in_channels;

        // Only the last repetition strides.
        let inner_padding = same_padding(config.kernel_size, 1, config.dilation)?;
        for i in 0..config.repeat - 1 {
            convs.push(ConvBn::load(
                channels,
                out_channels,
                config.kernel_size,
                1,
                config.dilation,
                inner_padding,
                config.separable,
                vb.pp(format!("conv.{i}")),
            )?);
            channels = out_channels;
        }

        let strided_padding = same_padding(config.kernel_size, config.stride, config.dilation)?;
        convs.push(ConvBn::load(
            channels,
            out_channels,
            config.kernel_size,
            config.stride,
            config.dilation,
            strided_padding,
            config.separable,
            vb.pp(format!("conv.{}", config.repeat - 1)),
        )?);

        let se = SqueezeExcite::load(out_channels, SE_REDUCTION_RATIO, vb.pp("se"))?;

        let res = if config.residual {
            Some(ConvBn::load(
                in_channels,
                out_channels,
                1,
                config.stride,
                1,
                0,
                false,
                vb.pp("res"),
            )?)
        } else {
            None
        };

        Ok(Self {
            convs,
            se,
            res,
            dropout: Dropout::new(config.dropout),
            stride: config.stride,
        })
    }

    /// x: `(batch, in_channels, time)` → `(batch, out_channels, time')`
    /// where `time' = ceil(time / stride)`.
    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut out = x.clone();
        let last = self.convs.len() - 1;
        for (i, conv) in self.convs.iter().enumerate() {
            out = conv.forward(&out, train)?;
            if i < last {
                out = self.dropout.forward(&out.relu()?, train)?;
            }
        }

        out = self.se.forward(&out)?;

        if let Some(res) = &self.res {
            out = (out + res.forward(x, train)?)?;
        }

        self.dropout.forward(&out.relu()?, train)
    }

    /// Stride of the block.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Output length for a given input length.
    pub fn output_length(&self, input_length: usize) -> usize {
        input_length.div_ceil(self.stride)
    }
}
