//! U-Net style decoder over ResNeSt skip features.
//!
//! The decoder holds exactly four stages, one per encoder skip. Each stage
//! doubles the resolution with a 2x2 stride-2 transposed convolution and, for
//! all but the last stage, fuses the matching skip through a [`DoubleConv`]
//! block. A final upsample and a 1x1 projection produce one sigmoid
//! probability map per class, back at the input resolution.

use burn::{
    nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::modules::{DoubleConv, DoubleConvConfig};
use crate::error::{UResNetError, UResNetResult};

/// Configuration for the `Decoder` module.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Channel widths of the encoder skip features, shallow to deep.
    channels: [usize; 4],
    /// Number of output classes (mask channels).
    n_classes: usize,
    /// Dropout rate of the fusion blocks.
    #[config(default = "0.5")]
    dropout: f64,
}

impl DecoderConfig {
    /// Initializes a `Decoder`.
    ///
    /// # Errors
    ///
    /// Returns `UResNetError::InvalidConfiguration` when the skip widths do
    /// not double stage over stage, which would break the upsample/concat
    /// arithmetic.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UResNetResult<Decoder<B>> {
        self.validate()?;

        let [c1, c2, c3, c4] = self.channels;
        let head_channels = c1 / 2;

        // Deepest stage first; the last stage has no skip left to fuse.
        let stages = [
            DecoderStage::new(c4, Some(c3), self.dropout, device),
            DecoderStage::new(c3, Some(c2), self.dropout, device),
            DecoderStage::new(c2, Some(c1), self.dropout, device),
            DecoderStage::new(c1, None, self.dropout, device),
        ];

        let final_up = ConvTranspose2dConfig::new([head_channels, head_channels], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let head = Conv2dConfig::new([head_channels, self.n_classes], [1, 1]).init(device);

        Ok(Decoder {
            stages,
            final_up,
            head,
        })
    }

    fn validate(&self) -> UResNetResult<()> {
        if self.n_classes == 0 {
            return Err(UResNetError::InvalidConfiguration {
                reason: "n_classes must be at least 1".to_string(),
            });
        }
        if self.channels[0] % 2 != 0 {
            return Err(UResNetError::InvalidConfiguration {
                reason: format!(
                    "shallowest skip width ({}) must be even to derive the head width",
                    self.channels[0]
                ),
            });
        }
        for window in self.channels.windows(2) {
            if window[1] != window[0] * 2 {
                return Err(UResNetError::InvalidConfiguration {
                    reason: format!(
                        "skip widths must double stage over stage, got {:?}",
                        self.channels
                    ),
                });
            }
        }

        Ok(())
    }
}

/// One decoder stage: a transposed-convolution upsample halving the channel
/// count, plus a fusion block for the matching skip on all but the deepest
/// stage chain's tail.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    upsample: ConvTranspose2d<B>,
    fuse: Option<DoubleConv<B>>,
}

impl<B: Backend> DecoderStage<B> {
    /// Create a new DecoderStage.
    ///
    /// `skip_channels` is the width of the skip this stage fuses with, or
    /// `None` for the final, fusion-less stage.
    fn new(
        in_channels: usize,
        skip_channels: Option<usize>,
        dropout: f64,
        device: &Device<B>,
    ) -> Self {
        let up_channels = in_channels / 2;
        let upsample = ConvTranspose2dConfig::new([in_channels, up_channels], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let fuse = skip_channels.map(|skip| {
            DoubleConvConfig::new(skip + up_channels, skip)
                .with_dropout(dropout)
                .init(device)
        });

        Self { upsample, fuse }
    }

    fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> UResNetResult<Tensor<B, 4>> {
        let x = self.upsample.forward(x);

        match (&self.fuse, skip) {
            (Some(fuse), Some(skip)) => {
                let [_, skip_c, skip_h, skip_w] = skip.dims();
                let [_, x_c, x_h, x_w] = x.dims();
                if skip_c != x_c || skip_h != x_h || skip_w != x_w {
                    return Err(UResNetError::ShapeMismatch {
                        operation: "skip fusion".to_string(),
                        expected: format!("upsampled features of {skip_c}x{skip_h}x{skip_w}"),
                        actual: format!("{x_c}x{x_h}x{x_w}"),
                    });
                }
                Ok(fuse.forward(Tensor::cat(vec![skip, x], 1)))
            }
            _ => Ok(x),
        }
    }
}

/// U-Net style decoder producing a per-pixel, per-class probability mask.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    stages: [DecoderStage<B>; 4],
    final_up: ConvTranspose2d<B>,
    head: Conv2d<B>,
}

impl<B: Backend> Decoder<B> {
    /// Forward pass over the four encoder skips, ordered shallow to deep.
    ///
    /// # Errors
    ///
    /// Returns `UResNetError::ShapeMismatch` when a skip disagrees with the
    /// upsampled features it is fused with.
    pub fn forward(&self, skips: [Tensor<B, 4>; 4]) -> UResNetResult<Tensor<B, 4>> {
        let [skip1, skip2, skip3, skip4] = skips;

        // The deepest skip seeds the chain; the remaining skips are consumed
        // in reverse and the last stage upsamples without fusion.
        let mut x = skip4;
        let stage_skips = [Some(skip3), Some(skip2), Some(skip1), None];
        for (stage, skip) in self.stages.iter().zip(stage_skips) {
            x = stage.forward(x, skip)?;
        }

        let x = self.final_up.forward(x);
        let x = self.head.forward(x);
        Ok(sigmoid(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    // Skips as a ResNeSt encoder would emit them for a 64x64 input.
    fn encoder_skips(device: &<TestBackend as Backend>::Device) -> [Tensor<TestBackend, 4>; 4] {
        [
            Tensor::random([1, 128, 16, 16], Distribution::Normal(0.0, 1.0), device),
            Tensor::random([1, 256, 8, 8], Distribution::Normal(0.0, 1.0), device),
            Tensor::random([1, 512, 4, 4], Distribution::Normal(0.0, 1.0), device),
            Tensor::random([1, 1024, 2, 2], Distribution::Normal(0.0, 1.0), device),
        ]
    }

    #[test]
    fn decoder_restores_input_resolution() {
        let device = Default::default();
        let decoder = DecoderConfig::new([128, 256, 512, 1024], 10)
            .init::<TestBackend>(&device)
            .unwrap();

        let mask = decoder.forward(encoder_skips(&device)).unwrap();
        assert_eq!(mask.dims(), [1, 10, 64, 64]);
    }

    #[test]
    fn mask_values_are_probabilities() {
        let device = Default::default();
        let decoder = DecoderConfig::new([128, 256, 512, 1024], 3)
            .init::<TestBackend>(&device)
            .unwrap();

        let mask = decoder.forward(encoder_skips(&device)).unwrap();
        let min = mask.clone().min().into_scalar();
        let max = mask.max().into_scalar();
        assert!(min >= 0.0, "mask minimum {min} below 0");
        assert!(max <= 1.0, "mask maximum {max} above 1");
    }

    #[test]
    fn mismatched_skip_is_rejected() {
        let device = Default::default();
        let decoder = DecoderConfig::new([128, 256, 512, 1024], 10)
            .init::<TestBackend>(&device)
            .unwrap();

        // Third skip is spatially off by one against the upsampled 4x4 map.
        let skips = [
            Tensor::<TestBackend, 4>::zeros([1, 128, 16, 16], &device),
            Tensor::<TestBackend, 4>::zeros([1, 256, 8, 8], &device),
            Tensor::<TestBackend, 4>::zeros([1, 512, 5, 5], &device),
            Tensor::<TestBackend, 4>::zeros([1, 1024, 2, 2], &device),
        ];

        let result = decoder.forward(skips);
        assert!(matches!(result, Err(UResNetError::ShapeMismatch { .. })));
    }

    #[test]
    fn non_doubling_schedule_is_rejected() {
        let device = Default::default();
        let result = DecoderConfig::new([128, 256, 512, 512], 10).init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(UResNetError::InvalidConfiguration { .. })
        ));
    }
}
