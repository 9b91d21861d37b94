//! Configuration structures and enums for the URESNet model.

use burn::prelude::*;

use crate::error::{UResNetError, UResNetResult};

/// Encoder depth variants supported by the model factory.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum EncoderDepth {
    /// ResNeSt-50 encoder (stages of 3, 4, 6, 3 blocks).
    ResNeSt50,
    /// ResNeSt-101 encoder (stages of 3, 4, 23, 3 blocks).
    ResNeSt101,
    /// ResNeSt-200 encoder (stages of 3, 24, 36, 3 blocks).
    ResNeSt200,
}

impl EncoderDepth {
    /// Per-stage residual block counts of the variant.
    pub const fn block_counts(&self) -> [usize; 4] {
        match self {
            Self::ResNeSt50 => [3, 4, 6, 3],
            Self::ResNeSt101 => [3, 4, 23, 3],
            Self::ResNeSt200 => [3, 24, 36, 3],
        }
    }

    /// Human-readable variant name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ResNeSt50 => "resnest50",
            Self::ResNeSt101 => "resnest101",
            Self::ResNeSt200 => "resnest200",
        }
    }

    /// Resolves a layer-count identifier such as `"50"` into a variant.
    ///
    /// # Errors
    ///
    /// Returns `UResNetError::UnsupportedVariant` for anything other than
    /// `"50"`, `"101"`, or `"200"`.
    pub fn from_layers(layers: &str) -> UResNetResult<Self> {
        match layers {
            "50" => Ok(Self::ResNeSt50),
            "101" => Ok(Self::ResNeSt101),
            "200" => Ok(Self::ResNeSt200),
            other => Err(UResNetError::UnsupportedVariant {
                variant: other.to_string(),
            }),
        }
    }
}

/// Top-level model configuration.
///
/// Created once at construction time and never mutated afterwards.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Encoder depth variant.
    #[config(default = "EncoderDepth::ResNeSt50")]
    pub encoder_depth: EncoderDepth,
    /// Number of channels of the input image.
    #[config(default = "3")]
    pub img_channels: usize,
    /// Number of output classes (mask channels).
    #[config(default = "10")]
    pub n_classes: usize,
    /// Dropout rate used by the encoder stem and the decoder fusion blocks.
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl ModelConfig {
    /// Validates the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns `UResNetError::InvalidConfiguration` if any parameter is
    /// outside its valid range.
    pub fn validate(&self) -> UResNetResult<()> {
        // 1. The mask needs at least one class channel.
        if self.n_classes == 0 {
            return Err(UResNetError::InvalidConfiguration {
                reason: "n_classes must be at least 1".to_string(),
            });
        }

        // 2. The stem convolution needs at least one input channel.
        if self.img_channels == 0 {
            return Err(UResNetError::InvalidConfiguration {
                reason: "img_channels must be at least 1".to_string(),
            });
        }

        // 3. Dropout is a probability.
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(UResNetError::InvalidConfiguration {
                reason: format!("dropout must be within [0, 1], got {}", self.dropout),
            });
        }

        Ok(())
    }
}
