use thiserror::Error;

/// Structural failures of a registration attempt.
///
/// Numeric non-convergence is not an error: it is reported through
/// [`TransformEstimate::failure`](crate::pipeline::TransformEstimate) with `success == false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Frames differ in shape after reconciliation: reference={reference:?}, target={target:?}")]
    InputShapeMismatch {
        reference: (usize, usize),
        target: (usize, usize),
    },

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("A registration attempt is already in flight")]
    Busy,

    #[error("Registration cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type RegistrationResult<T> = std::result::Result<T, RegistrationError>;
