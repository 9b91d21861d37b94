//! Configuration and factory validation tests.

use burn::backend::NdArray;

use crate::{build_uresnet, EncoderDepth, ModelConfig, UResNetConfig, UResNetError};

type TestBackend = NdArray<f32>;

#[test]
fn test_unsupported_variant_error() {
    match EncoderDepth::from_layers("75") {
        Err(UResNetError::UnsupportedVariant { variant }) => {
            assert_eq!(variant, "75");
        }
        _ => panic!("Expected UnsupportedVariant error"),
    }
}

#[test]
fn test_variant_resolution() {
    assert_eq!(
        EncoderDepth::from_layers("50").unwrap(),
        EncoderDepth::ResNeSt50
    );
    assert_eq!(
        EncoderDepth::from_layers("101").unwrap(),
        EncoderDepth::ResNeSt101
    );
    assert_eq!(
        EncoderDepth::from_layers("200").unwrap(),
        EncoderDepth::ResNeSt200
    );
}

#[test]
fn test_block_counts_per_variant() {
    assert_eq!(EncoderDepth::ResNeSt50.block_counts(), [3, 4, 6, 3]);
    assert_eq!(EncoderDepth::ResNeSt101.block_counts(), [3, 4, 23, 3]);
    assert_eq!(EncoderDepth::ResNeSt200.block_counts(), [3, 24, 36, 3]);
}

#[test]
fn test_zero_classes_rejected() {
    let config = ModelConfig::new().with_n_classes(0);

    match config.validate() {
        Err(UResNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("n_classes"), "unexpected reason: {reason}");
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_zero_image_channels_rejected() {
    let config = ModelConfig::new().with_img_channels(0);

    match config.validate() {
        Err(UResNetError::InvalidConfiguration { reason }) => {
            assert!(
                reason.contains("img_channels"),
                "unexpected reason: {reason}"
            );
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_out_of_range_dropout_rejected() {
    let config = ModelConfig::new().with_dropout(1.5);

    match config.validate() {
        Err(UResNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("dropout"), "unexpected reason: {reason}");
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_default_configuration_is_valid() {
    assert!(ModelConfig::new().validate().is_ok());
}

#[test]
fn test_factory_rejects_unknown_variant_before_construction() {
    let device = Default::default();
    let result = build_uresnet::<TestBackend>("75", 10, 0.5, 3, &device);

    assert!(matches!(
        result,
        Err(UResNetError::UnsupportedVariant { .. })
    ));
}

#[test]
fn test_model_init_rejects_invalid_config() {
    let device = Default::default();
    let config = ModelConfig::new().with_n_classes(0);
    let result = UResNetConfig::new(config).init::<TestBackend>(&device);

    assert!(matches!(
        result,
        Err(UResNetError::InvalidConfiguration { .. })
    ));
}
