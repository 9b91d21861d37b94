//! Convolutional building blocks shared by the decoder.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Configuration for the [`DoubleConv`] fusion block.
#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    in_channels: usize,
    out_channels: usize,
    /// Dropout rate applied after the second convolution.
    #[config(default = "0.5")]
    dropout: f64,
}

impl DoubleConvConfig {
    /// Initializes a `DoubleConv` block.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DoubleConv<B> {
        let conv1 = Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(self.out_channels).init(device);

        let conv2 = Conv2dConfig::new([self.out_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn2 = BatchNormConfig::new(self.out_channels).init(device);

        DoubleConv {
            conv1,
            bn1,
            conv2,
            bn2,
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Two conv+norm+relu passes followed by dropout.
///
/// Used to fuse concatenated decoder and skip features back down to a target
/// channel count. The first convolution maps `in_channels` to `out_channels`,
/// the second keeps the width.
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    relu: Relu,
    dropout: Dropout,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.relu.forward(x);
        self.dropout.forward(x)
    }
}
