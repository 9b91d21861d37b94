//! Split-attention convolution.
//!
//! The split-attention block computes its feature maps in `radix` parallel
//! splits per cardinal group and recombines them by learned channel weights,
//! normalized across the radix axis. This is the piece that distinguishes
//! ResNeSt from a plain ResNeXt bottleneck.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::softmax,
};

use crate::error::{ResNeStError, ResNeStResult};

/// Normalizes attention logits across the radix splits of each cardinal group.
///
/// The input is laid out as `(batch, radix * cardinality * channels, 1, 1)`.
/// Logits are regrouped as `(batch, cardinality, radix, channels)`, softmaxed
/// along the radix axis, and flattened back radix-major so that chunking the
/// result by radix yields one weight block per feature split. Carries no
/// learnable parameters.
#[derive(Module, Clone, Debug)]
pub struct RadixSoftmax {
    radix: usize,
    cardinality: usize,
}

impl RadixSoftmax {
    /// Create a new RadixSoftmax.
    pub const fn new(radix: usize, cardinality: usize) -> Self {
        Self { radix, cardinality }
    }

    /// Applies the radix-wise normalization.
    ///
    /// With `radix == 1` the softmax runs over a singleton axis and every
    /// weight comes out as exactly 1.
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, _, _] = x.dims();
        let per_group = channels / (self.cardinality * self.radix);

        let x = x.reshape([batch, self.cardinality, self.radix, per_group]);
        let x = x.swap_dims(1, 2);
        let x = softmax(x, 1);
        x.reshape([batch, channels, 1, 1])
    }
}

/// Configuration for the [`SplitAttention`] block.
#[derive(Config, Debug)]
pub struct SplitAttentionConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels.
    pub out_channels: usize,
    /// Size of the square convolution kernel.
    pub kernel_size: usize,
    /// Stride of the convolution.
    #[config(default = "1")]
    pub stride: usize,
    /// Zero padding added to both sides of the input.
    #[config(default = "0")]
    pub padding: usize,
    /// Number of feature-map splits within each cardinal group.
    #[config(default = "2")]
    pub radix: usize,
    /// Number of cardinal groups.
    #[config(default = "1")]
    pub cardinality: usize,
    /// Whether the grouped convolution carries a bias term.
    #[config(default = "false")]
    pub bias: bool,
}

impl SplitAttentionConfig {
    /// Initializes a [`SplitAttention`] block.
    ///
    /// # Errors
    ///
    /// Returns `ResNeStError::InvalidConfiguration` when radix or cardinality
    /// is zero, or when the channel counts cannot be partitioned into the
    /// requested groups.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResNeStResult<SplitAttention<B>> {
        self.validate()?;

        let groups = self.cardinality * self.radix;
        let split_channels = self.out_channels * self.radix;

        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        let conv = Conv2dConfig::new(
            [self.in_channels, split_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_groups(groups)
        .with_bias(self.bias)
        .with_initializer(initializer.clone())
        .init(device);
        let bn1 = BatchNormConfig::new(split_channels).init(device);

        // Excitation path over the pooled 1x1 descriptor.
        let fc1 = Conv2dConfig::new([self.out_channels, split_channels], [1, 1])
            .with_groups(self.cardinality)
            .with_initializer(initializer.clone())
            .init(device);
        let bn2 = BatchNormConfig::new(split_channels).init(device);
        let fc2 = Conv2dConfig::new([split_channels, split_channels], [1, 1])
            .with_groups(self.cardinality)
            .with_initializer(initializer)
            .init(device);

        Ok(SplitAttention {
            conv,
            bn1,
            relu: Relu::new(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1,
            bn2,
            fc2,
            rsoftmax: RadixSoftmax::new(self.radix, self.cardinality),
            radix: self.radix,
        })
    }

    fn validate(&self) -> ResNeStResult<()> {
        if self.radix == 0 {
            return Err(ResNeStError::InvalidConfiguration {
                reason: "radix must be at least 1".to_string(),
            });
        }
        if self.cardinality == 0 {
            return Err(ResNeStError::InvalidConfiguration {
                reason: "cardinality must be at least 1".to_string(),
            });
        }

        let groups = self.cardinality * self.radix;
        if self.in_channels % groups != 0 {
            return Err(ResNeStError::InvalidConfiguration {
                reason: format!(
                    "input channels ({}) must be divisible by cardinality * radix ({groups})",
                    self.in_channels
                ),
            });
        }
        if self.out_channels % self.cardinality != 0 {
            return Err(ResNeStError::InvalidConfiguration {
                reason: format!(
                    "output channels ({}) must be divisible by cardinality ({})",
                    self.out_channels, self.cardinality
                ),
            });
        }

        Ok(())
    }
}

/// Split-attention convolution block.
///
/// A grouped convolution produces `radix` feature splits. Their sum is pooled
/// to a 1x1 descriptor, passed through a small grouped excitation network, and
/// normalized by [`RadixSoftmax`]; the splits are then recombined as a
/// weighted sum. The output always has `out_channels` channels, independent of
/// radix and cardinality.
#[derive(Module, Debug)]
pub struct SplitAttention<B: Backend> {
    conv: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    pool: AdaptiveAvgPool2d,
    fc1: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    fc2: Conv2d<B>,
    rsoftmax: RadixSoftmax,
    radix: usize,
}

impl<B: Backend> SplitAttention<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);

        // radix >= 1 is guaranteed at construction, so there is always at
        // least one split to seed the folds below.
        let splits = x.chunk(self.radix, 1);
        let mut pooled = splits[0].clone();
        for split in &splits[1..] {
            pooled = pooled + split.clone();
        }
        let pooled = self.pool.forward(pooled);

        let gap = self.fc1.forward(pooled);
        let gap = self.bn2.forward(gap);
        let gap = self.relu.forward(gap);
        let attention = self.rsoftmax.forward(self.fc2.forward(gap));

        // One weight block per split, broadcast over the spatial dims.
        let weights = attention.chunk(self.radix, 1);
        let mut out = weights[0].clone() * splits[0].clone();
        for (weight, split) in weights[1..].iter().zip(&splits[1..]) {
            out = out + weight.clone() * split.clone();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn radix_softmax_sums_to_one_along_radix_axis() {
        let device = Default::default();
        // radix=2, cardinality=4, 8 channels per group
        let logits = Tensor::<TestBackend, 4>::random(
            [2, 64, 1, 1],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let weights = RadixSoftmax::new(2, 4).forward(logits);
        assert_eq!(weights.dims(), [2, 64, 1, 1]);

        // The flattened layout is radix-major, so the radix axis is recovered
        // by splitting the channel dim in two.
        let sums = weights.reshape([2, 2, 32]).sum_dim(1);
        let diff = (sums.clone() - sums.ones_like()).abs().max().into_scalar();
        assert!(diff < 1e-6, "radix weights should sum to 1, off by {diff}");
    }

    #[test]
    fn radix_one_yields_unit_weights() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::random(
            [1, 16, 1, 1],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let weights = RadixSoftmax::new(1, 2).forward(logits);
        let diff = (weights.clone() - weights.ones_like())
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-6, "singleton softmax should produce 1s");
    }

    #[test]
    fn output_channels_independent_of_radix_and_cardinality() {
        let device = Default::default();
        for (radix, cardinality) in [(1, 1), (2, 1), (2, 2), (4, 2)] {
            let block = SplitAttentionConfig::new(64, 64, 3)
                .with_padding(1)
                .with_radix(radix)
                .with_cardinality(cardinality)
                .init::<TestBackend>(&device)
                .unwrap();

            let input = Tensor::<TestBackend, 4>::random(
                [1, 64, 16, 16],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let output = block.forward(input);
            assert_eq!(
                output.dims(),
                [1, 64, 16, 16],
                "radix={radix} cardinality={cardinality}"
            );
        }
    }

    #[test]
    fn strided_block_halves_resolution() {
        let device = Default::default();
        let block = SplitAttentionConfig::new(64, 32, 3)
            .with_padding(1)
            .with_stride(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [2, 64, 32, 32],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 32, 16, 16]);
    }

    #[test]
    fn zero_radix_is_rejected() {
        let device = Default::default();
        let result = SplitAttentionConfig::new(64, 64, 3)
            .with_radix(0)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(ResNeStError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn indivisible_channel_grouping_is_rejected() {
        let device = Default::default();
        // 30 input channels cannot be split into cardinality * radix = 4 groups.
        let result = SplitAttentionConfig::new(30, 32, 3)
            .with_radix(2)
            .with_cardinality(2)
            .init::<TestBackend>(&device);

        match result {
            Err(ResNeStError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("divisible"), "unexpected reason: {reason}");
            }
            Ok(_) => panic!("expected an invalid configuration error"),
        }
    }
}
