use thiserror::Error;

/// The error type for encoder construction.
///
/// Every variant marks a configuration fault detected while assembling the
/// network; none of them is recoverable at runtime.
#[derive(Error, Debug)]
pub enum ResNeStError {
    /// Error for when a block, stage, or attention configuration cannot be built.
    #[error("Invalid encoder configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for encoder construction.
pub type ResNeStResult<T> = Result<T, ResNeStError>;
