//! Error taxonomy for the adapter.
//!
//! Every native status is translated once, at the call site, through
//! `From<ClStatus> for UrError`, so `?` works directly on [`NativeResult`].
//!
//! [`NativeResult`]: crate::native::NativeResult

use thiserror::Error;

use crate::native::ClStatus;

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, UrError>;

/// Errors reported by the adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrError {
    /// Context mismatch or an invalid native context.
    #[error("Invalid context")]
    InvalidContext,

    /// Program mismatch or an invalid native program.
    #[error("Invalid program")]
    InvalidProgram,

    /// Invalid native kernel or kernel name.
    #[error("Invalid kernel")]
    InvalidKernel,

    /// Device mismatch or an invalid native device.
    #[error("Invalid device")]
    InvalidDevice,

    /// Invalid native command queue.
    #[error("Invalid queue")]
    InvalidQueue,

    /// Unknown native platform.
    #[error("Invalid platform")]
    InvalidPlatform,

    /// Caller buffer size does not match the value size.
    #[error("Invalid size")]
    InvalidSize,

    /// Unrecognised query key.
    #[error("Invalid enumeration")]
    InvalidEnumeration,

    /// Query key or argument deliberately unsupported by this adapter.
    #[error("Invalid argument")]
    InvalidArgument,

    /// Argument value rejected.
    #[error("Invalid value")]
    InvalidValue,

    /// Handle used outside its lifetime contract.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Allocation failure while constructing a wrapper or native object.
    #[error("Out of resources")]
    OutOfResources,

    /// Host allocation failure reported by the native API.
    #[error("Out of host memory")]
    OutOfHostMemory,

    /// No device matched the request.
    #[error("Device not found")]
    DeviceNotFound,

    /// Operation not supported by the native API.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Any other native failure.
    #[error("Unknown native failure: {0}")]
    Unknown(ClStatus),
}

impl UrError {
    /// Create an invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether this error denotes an identity mismatch found by adoption.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Self::InvalidContext | Self::InvalidProgram | Self::InvalidDevice | Self::InvalidQueue
        )
    }
}

impl From<ClStatus> for UrError {
    fn from(status: ClStatus) -> Self {
        match status {
            ClStatus::DEVICE_NOT_FOUND => Self::DeviceNotFound,
            ClStatus::OUT_OF_RESOURCES => Self::OutOfResources,
            ClStatus::OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            ClStatus::INVALID_VALUE => Self::InvalidValue,
            ClStatus::INVALID_DEVICE_TYPE | ClStatus::INVALID_DEVICE => Self::InvalidDevice,
            ClStatus::INVALID_PLATFORM => Self::InvalidPlatform,
            ClStatus::INVALID_CONTEXT => Self::InvalidContext,
            ClStatus::INVALID_QUEUE_PROPERTIES => Self::InvalidValue,
            ClStatus::INVALID_COMMAND_QUEUE => Self::InvalidQueue,
            ClStatus::INVALID_PROGRAM => Self::InvalidProgram,
            ClStatus::INVALID_KERNEL_NAME | ClStatus::INVALID_KERNEL => Self::InvalidKernel,
            ClStatus::INVALID_OPERATION => {
                Self::Unsupported("operation rejected by native API".to_string())
            }
            other => Self::Unknown(other),
        }
    }
}
