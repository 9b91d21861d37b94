//! The URESNet segmentation model.
//!
//! Wires a [`ResNeSt`] split-attention encoder to the U-Net style [`Decoder`]:
//! the encoder emits four skip feature maps at 1/4 .. 1/32 of the input
//! resolution, the decoder fuses them back up to a full-resolution,
//! per-class probability mask.

use burn::{module::Ignored, prelude::*};
use resnest::ResNeSt;

use super::decoder::{Decoder, DecoderConfig};
use crate::{
    config::{EncoderDepth, ModelConfig},
    error::{UResNetError, UResNetResult},
};

/// Configuration for the `UResNet` model.
#[derive(Config, Debug)]
pub struct UResNetConfig {
    /// The detailed model configuration.
    config: ModelConfig,
}

impl UResNetConfig {
    /// Initializes a `UResNet` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or if encoder or
    /// decoder construction fails.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UResNetResult<UResNet<B>> {
        self.config.validate()?;

        let encoder = build_encoder(&self.config, device)?;
        let decoder = DecoderConfig::new(encoder.output_channels(), self.config.n_classes)
            .with_dropout(self.config.dropout)
            .init(device)?;

        Ok(UResNet {
            encoder,
            decoder,
            name: Ignored(self.config.encoder_depth.name()),
        })
    }
}

/// Constructs the ResNeSt encoder selected by the configuration.
fn build_encoder<B: Backend>(
    config: &ModelConfig,
    device: &Device<B>,
) -> UResNetResult<ResNeSt<B>> {
    let encoder = match config.encoder_depth {
        EncoderDepth::ResNeSt50 => {
            ResNeSt::resnest50(config.img_channels, config.dropout, device)?
        }
        EncoderDepth::ResNeSt101 => {
            ResNeSt::resnest101(config.img_channels, config.dropout, device)?
        }
        EncoderDepth::ResNeSt200 => {
            ResNeSt::resnest200(config.img_channels, config.dropout, device)?
        }
    };
    Ok(encoder)
}

/// ResNeSt-backed U-Net for multi-label segmentation.
///
/// `forward` maps an image tensor to a mask with one sigmoid probability map
/// per class, at the same spatial resolution as the input. Inputs must have
/// height and width divisible by 32, the encoder's total downsampling factor.
#[derive(Module, Debug)]
pub struct UResNet<B: Backend> {
    encoder: ResNeSt<B>,
    decoder: Decoder<B>,
    name: Ignored<&'static str>,
}

impl<B: Backend> UResNet<B> {
    /// Performs a full forward pass, image to class-probability mask.
    ///
    /// # Errors
    ///
    /// Returns `UResNetError::ShapeMismatch` when the input's spatial size is
    /// not divisible by 32.
    pub fn forward(&self, input: Tensor<B, 4>) -> UResNetResult<Tensor<B, 4>> {
        let [_, _, height, width] = input.dims();
        if height % 32 != 0 || width % 32 != 0 {
            return Err(UResNetError::ShapeMismatch {
                operation: "model input".to_string(),
                expected: "height and width divisible by 32".to_string(),
                actual: format!("{height}x{width}"),
            });
        }

        let skips = self.encoder.forward(input);
        self.decoder.forward(skips)
    }

    /// Name of the encoder variant backing this model.
    pub fn name(&self) -> &'static str {
        self.name.0
    }
}

/// Builds a `UResNet` from a layer-count identifier such as `"50"`.
///
/// This is the construction entry point: it resolves the variant, validates
/// the configuration, and assembles encoder and decoder. Every failure is a
/// configuration fault surfaced before any tensor operation runs.
///
/// # Errors
///
/// Returns `UResNetError::UnsupportedVariant` for an unknown identifier and
/// `UResNetError::InvalidConfiguration` for out-of-range parameters.
pub fn build_uresnet<B: Backend>(
    variant: &str,
    n_classes: usize,
    dropout: f64,
    img_channels: usize,
    device: &Device<B>,
) -> UResNetResult<UResNet<B>> {
    let config = ModelConfig::new()
        .with_encoder_depth(EncoderDepth::from_layers(variant)?)
        .with_n_classes(n_classes)
        .with_dropout(dropout)
        .with_img_channels(img_channels);

    UResNetConfig::new(config).init(device)
}
