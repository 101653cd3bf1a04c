//! Error type shared by the storage engines, the devices and the registry.
//!
//! Every variant maps to the errno a character driver would return, see
//! [`ScullError::errno`], and to an `embedded_io_async::ErrorKind` so that
//! [`crate::File`] can be driven through the `embedded_io_async` traits.

use embedded_io_async::ErrorKind;

use crate::io::CopyFault;
use crate::registry::DeviceId;

/// Error type for device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScullError {
    /// A lock acquisition or a blocking wait was cancelled; retry the call
    #[error("interrupted")]
    Interrupted,

    /// Non-blocking mode and the operation cannot proceed right now
    #[error("operation would block")]
    WouldBlock,

    /// Copy into or out of caller memory failed
    #[error("bad address")]
    Fault,

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid argument")]
    InvalidArgument,

    /// Privileged configuration command without the capability
    #[error("operation not permitted")]
    PermissionDenied,

    #[error("no such device: {0:?}")]
    NoDevice(DeviceId),

    /// Handle not opened for this kind of access
    #[error("bad file descriptor")]
    BadDescriptor,
}

pub type Result<T> = std::result::Result<T, ScullError>;

impl ScullError {
    /// The positive errno a driver would report for this error
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Interrupted => 512, // ERESTARTSYS
            Self::WouldBlock => 11,   // EAGAIN
            Self::Fault => 14,        // EFAULT
            Self::OutOfMemory => 12,  // ENOMEM
            Self::InvalidArgument => 22,
            Self::PermissionDenied => 1,
            Self::NoDevice(_) => 19,
            Self::BadDescriptor => 9,
        }
    }

    /// Whether the caller is expected to retry the whole operation
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::WouldBlock)
    }
}

impl From<CopyFault> for ScullError {
    fn from(_: CopyFault) -> Self {
        Self::Fault
    }
}

impl From<std::collections::TryReserveError> for ScullError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl embedded_io_async::Error for ScullError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted => ErrorKind::Interrupted,
            Self::WouldBlock => ErrorKind::Other,
            Self::Fault => ErrorKind::InvalidData,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::InvalidArgument | Self::BadDescriptor => ErrorKind::InvalidInput,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::NoDevice(_) => ErrorKind::NotFound,
        }
    }
}
