//! # Model Architecture
//!
//! This module aggregates the components of the URESNet architecture:
//!
//! - `uresnet`: The main `UResNet` model composing encoder and decoder.
//! - `decoder`: The U-Net style decoder over the encoder's skip features.
//! - `modules`: Shared convolutional building blocks.

pub mod decoder;
pub mod modules;
pub mod uresnet;
