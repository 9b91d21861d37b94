use resnest::ResNeStError;
use thiserror::Error;

/// The error type for `uresnet-burn` operations.
///
/// Every variant marks a construction or wiring fault. None of them is a
/// recoverable runtime condition; callers are expected to propagate.
#[derive(Error, Debug)]
pub enum UResNetError {
    /// Error for when an unsupported encoder depth is requested.
    #[error("Unsupported encoder variant: {variant}")]
    UnsupportedVariant {
        /// The requested variant identifier.
        variant: String,
    },

    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when tensors fed to an operation disagree in shape.
    #[error("Shape mismatch in {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The operation that received the mismatched operands.
        operation: String,
        /// The expected shape or constraint.
        expected: String,
        /// The shape actually encountered.
        actual: String,
    },

    /// Error raised while constructing the encoder.
    #[error("Encoder construction failed: {0}")]
    Encoder(#[from] ResNeStError),
}

/// A specialized `Result` type for `uresnet-burn` operations.
pub type UResNetResult<T> = Result<T, UResNetError>;
