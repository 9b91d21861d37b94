//! ResNeSt split-attention encoder implemented with Burn.
//!
//! ResNeSt replaces the 3x3 convolution of a ResNet bottleneck with a
//! split-attention convolution: features are computed in `radix` parallel
//! splits per cardinal group and recombined by learned, radix-normalized
//! channel weights. The encoder exposes the four stage outputs as skip
//! features for dense-prediction decoders.

use core::f64::consts::SQRT_2;

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, PaddingConfig2d, Relu,
};
use burn::prelude::*;

mod blocks;
mod error;
mod split_attention;

pub use blocks::*;
pub use error::*;
pub use split_attention::*;

// ResNeSt residual stage block counts
const RESNEST50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNEST101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNEST200_BLOCKS: [usize; 4] = [3, 24, 36, 3];

// Base (pre-expansion) stage widths and first-block strides.
const STAGE_WIDTHS: [usize; 4] = [32, 64, 128, 256];
const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

// Channel width produced by the stem, and the split-attention factors
// shared by every stage.
const STEM_WIDTH: usize = 64;
const RADIX: usize = 2;
const CARDINALITY: usize = 1;

/// ResNeSt encoder emitting four skip feature maps.
///
/// The stem downsamples by 4 and stages 2-4 halve the resolution again, so
/// the four outputs sit at 1/4, 1/8, 1/16, and 1/32 of the input resolution
/// with channel widths {128, 256, 512, 1024}.
#[derive(Module, Debug)]
pub struct ResNeSt<B: Backend> {
    stem: StemBlock<B>,
    layer1: StageBlock<B>,
    layer2: StageBlock<B>,
    layer3: StageBlock<B>,
    layer4: StageBlock<B>,
    skip_channels: [usize; 4],
}

impl<B: Backend> ResNeSt<B> {
    /// Forward pass returning the four stage outputs, shallow to deep.
    pub fn forward(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        let x = self.stem.forward(input);

        let skip1 = self.layer1.forward(x);
        let skip2 = self.layer2.forward(skip1.clone());
        let skip3 = self.layer3.forward(skip2.clone());
        let skip4 = self.layer4.forward(skip3.clone());

        [skip1, skip2, skip3, skip4]
    }

    /// Channel widths of the four skip outputs, shallow to deep.
    pub fn output_channels(&self) -> [usize; 4] {
        self.skip_channels
    }

    /// Create a ResNeSt-50 encoder.
    pub fn resnest50(
        img_channels: usize,
        dropout: f64,
        device: &Device<B>,
    ) -> ResNeStResult<Self> {
        Self::new(RESNEST50_BLOCKS, img_channels, dropout, device)
    }

    /// Create a ResNeSt-101 encoder.
    pub fn resnest101(
        img_channels: usize,
        dropout: f64,
        device: &Device<B>,
    ) -> ResNeStResult<Self> {
        Self::new(RESNEST101_BLOCKS, img_channels, dropout, device)
    }

    /// Create a ResNeSt-200 encoder.
    pub fn resnest200(
        img_channels: usize,
        dropout: f64,
        device: &Device<B>,
    ) -> ResNeStResult<Self> {
        Self::new(RESNEST200_BLOCKS, img_channels, dropout, device)
    }

    /// Create an encoder with the given per-stage block counts.
    ///
    /// The running channel width is threaded explicitly from stage to stage;
    /// each `StageConfig::init` call consumes the previous width and returns
    /// the next one.
    pub fn new(
        blocks: [usize; 4],
        img_channels: usize,
        dropout: f64,
        device: &Device<B>,
    ) -> ResNeStResult<Self> {
        let stem = StemBlock::new(img_channels, STEM_WIDTH, dropout, device);

        let (layer1, width1) = StageConfig::new(STEM_WIDTH, STAGE_WIDTHS[0])
            .with_block_count(blocks[0])
            .with_stride(STAGE_STRIDES[0])
            .with_radix(RADIX)
            .with_cardinality(CARDINALITY)
            .init(device)?;
        let (layer2, width2) = StageConfig::new(width1, STAGE_WIDTHS[1])
            .with_block_count(blocks[1])
            .with_stride(STAGE_STRIDES[1])
            .with_radix(RADIX)
            .with_cardinality(CARDINALITY)
            .init(device)?;
        let (layer3, width3) = StageConfig::new(width2, STAGE_WIDTHS[2])
            .with_block_count(blocks[2])
            .with_stride(STAGE_STRIDES[2])
            .with_radix(RADIX)
            .with_cardinality(CARDINALITY)
            .init(device)?;
        let (layer4, width4) = StageConfig::new(width3, STAGE_WIDTHS[3])
            .with_block_count(blocks[3])
            .with_stride(STAGE_STRIDES[3])
            .with_radix(RADIX)
            .with_cardinality(CARDINALITY)
            .init(device)?;

        Ok(Self {
            stem,
            layer1,
            layer2,
            layer3,
            layer4,
            skip_channels: [width1, width2, width3, width4],
        })
    }
}

/// Stem block: 7x7 stride-2 conv + bn + relu + dropout + 3x3 stride-2 maxpool.
#[derive(Module, Debug)]
pub struct StemBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    dropout: Dropout,
    maxpool: MaxPool2d,
}

impl<B: Backend> StemBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        let out = self.bn.forward(out);
        let out = self.relu.forward(out);
        let out = self.dropout.forward(out);
        self.maxpool.forward(out)
    }

    /// Create a new StemBlock.
    pub fn new(in_channels: usize, out_channels: usize, dropout: f64, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // 7x7 conv, stride=2, padding=3
        let conv = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        // 3x3 maxpool, stride=2, padding=1
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            dropout: DropoutConfig::new(dropout).init(),
            maxpool,
        }
    }
}
