//! # uresnet-burn
//!
//! A ResNeSt-backed U-Net for multi-label image segmentation, implemented
//! with the [Burn](https://burn.dev) framework.
//!
//! The encoder is a ResNeSt split-attention network (from the companion
//! `resnest` crate) emitting four skip feature maps; the decoder reverses the
//! encoder's downsampling with transposed convolutions, fusing each skip back
//! in, and produces one sigmoid probability map per class at the input
//! resolution.
//!
//! Construction goes through [`build_uresnet`] or [`UResNetConfig`]; every
//! misconfiguration is rejected with a [`UResNetError`] before any tensor
//! operation runs.

mod config;
mod error;
mod models;

#[cfg(test)]
mod tests;

pub use config::*;
pub use error::*;
pub use models::decoder::{Decoder, DecoderConfig};
pub use models::modules::{DoubleConv, DoubleConvConfig};
pub use models::uresnet::{build_uresnet, UResNet, UResNetConfig, UResNetRecord};
