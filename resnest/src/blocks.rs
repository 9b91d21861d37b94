//! Residual building blocks and the stage builder for the ResNeSt encoder.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::{
    error::{ResNeStError, ResNeStResult},
    split_attention::{SplitAttention, SplitAttentionConfig},
};

/// Closed set of residual block kinds the stage builder can instantiate.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Bottleneck block carrying a split-attention convolution.
    Bottleneck,
}

/// A single residual block of an encoder stage.
#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A split-attention bottleneck block.
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

/// Split-attention bottleneck residual block.
///
/// 1x1 reduce to the group width, 3x3 split-attention convolution (the
/// stride, if any, is applied here), then 1x1 expand by [`Self::EXPANSION`].
/// A projection shortcut is used whenever the block changes resolution or
/// channel count; otherwise the input is added back as-is.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: SplitAttention<B>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    /// Factor by which the output channel count exceeds the group width.
    pub const EXPANSION: usize = 4;

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        // Conv block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        // Activation
        self.relu.forward(out)
    }

    /// Create a new Bottleneck.
    ///
    /// `out_channels` is the base width of the block; the output carries
    /// `out_channels * EXPANSION` channels.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        radix: usize,
        cardinality: usize,
        stride: usize,
        device: &Device<B>,
    ) -> ResNeStResult<Self> {
        let group_width = out_channels * cardinality;
        let expanded = out_channels * Self::EXPANSION;

        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // conv1x1 reduce
        let conv1 = Conv2dConfig::new([in_channels, group_width], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn1 = BatchNormConfig::new(group_width).init(device);

        // conv3x3 split attention
        let conv2 = SplitAttentionConfig::new(group_width, group_width, 3)
            .with_stride(stride)
            .with_padding(1)
            .with_radix(radix)
            .with_cardinality(cardinality)
            .with_bias(false)
            .init(device)?;

        // conv1x1 expand
        let conv3 = Conv2dConfig::new([group_width, expanded], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);
        let bn3 = BatchNormConfig::new(expanded).init(device);

        let downsample = (stride != 1 || in_channels != expanded)
            .then(|| Downsample::new(in_channels, expanded, stride, device));

        Ok(Self {
            conv1,
            bn1,
            conv2,
            conv3,
            bn3,
            relu: Relu::new(),
            downsample,
        })
    }
}

/// Downsample layer applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // conv1x1
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

/// Configuration for one encoder stage.
#[derive(Config, Debug)]
pub struct StageConfig {
    /// Channel width entering the stage (the encoder's running width).
    pub input_channels: usize,
    /// Base output width of each block, before expansion.
    pub output_channels: usize,
    /// Residual block kind used throughout the stage.
    #[config(default = "BlockKind::Bottleneck")]
    pub block: BlockKind,
    /// Number of feature-map splits within each cardinal group.
    #[config(default = "2")]
    pub radix: usize,
    /// Number of cardinal groups.
    #[config(default = "1")]
    pub cardinality: usize,
    /// Stride of the first block of the stage.
    #[config(default = "1")]
    pub stride: usize,
    /// Number of residual blocks in the stage.
    #[config(default = "1")]
    pub block_count: usize,
}

impl StageConfig {
    /// Initializes the stage, returning it together with the updated running
    /// channel width to feed into the next stage.
    ///
    /// The first block applies the configured stride and projects the
    /// shortcut if the shape changes; the remaining `block_count - 1` blocks
    /// run at stride 1 with identity shortcuts.
    ///
    /// # Errors
    ///
    /// Returns `ResNeStError::InvalidConfiguration` for an empty stage or
    /// when the underlying split-attention configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResNeStResult<(StageBlock<B>, usize)> {
        if self.block_count == 0 {
            return Err(ResNeStError::InvalidConfiguration {
                reason: "a stage needs at least one block".to_string(),
            });
        }

        let width_out = self.output_channels * Bottleneck::<B>::EXPANSION;

        let mut blocks = Vec::with_capacity(self.block_count);
        for index in 0..self.block_count {
            let (in_channels, stride) = if index == 0 {
                (self.input_channels, self.stride)
            } else {
                (width_out, 1)
            };
            let block = match self.block {
                BlockKind::Bottleneck => ResidualBlock::Bottleneck(Bottleneck::new(
                    in_channels,
                    self.output_channels,
                    self.radix,
                    self.cardinality,
                    stride,
                    device,
                )?),
            };
            blocks.push(block);
        }

        Ok((StageBlock { blocks }, width_out))
    }
}

/// Sequence of residual blocks sharing one output width.
#[derive(Module, Debug)]
pub struct StageBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> StageBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }

    /// Number of residual blocks in the stage.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the stage holds no blocks. Never true for built stages.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
