//! Error types for VirGL device operations

use core::fmt;

use syscall::error::{
    EBADF, EBUSY, EEXIST, EFAULT, EINVAL, EIO, ENODEV, ENOENT, ENOMEM, ENOTTY, EOVERFLOW, E2BIG,
};

use crate::manager::DeviceState;
use crate::protocol::ResourceId;

/// Result type for VirGL operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Failures reported by the lower-level GPU adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterError {
    /// Unspecified device error
    Unspecified,
    /// Host ran out of memory
    OutOfMemory,
    /// Scanout index rejected by the host
    InvalidScanoutId,
    /// Resource id rejected by the host
    InvalidResourceId,
    /// Context id rejected by the host
    InvalidContextId,
    /// Request parameter rejected by the host
    InvalidParameter,
    /// Transport failed to deliver the request
    Transport,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Unspecified => write!(f, "Unspecified device error"),
            AdapterError::OutOfMemory => write!(f, "Out of memory"),
            AdapterError::InvalidScanoutId => write!(f, "Invalid scanout id"),
            AdapterError::InvalidResourceId => write!(f, "Invalid resource id"),
            AdapterError::InvalidContextId => write!(f, "Invalid context id"),
            AdapterError::InvalidParameter => write!(f, "Invalid parameter"),
            AdapterError::Transport => write!(f, "Transport failure"),
        }
    }
}

/// VirGL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bounded encoder output is full
    BufferOverflow { capacity: usize },
    /// Command payload exceeds the 16-bit length field
    RecordTooLong,
    /// Word stream ends inside a record
    TruncatedRecord { offset: usize },
    /// Transfer does not fit inside the transfer region
    TransferOutOfBounds {
        offset: usize,
        length: usize,
        capacity: usize,
    },
    /// Transfer direction is not valid for this request
    InvalidDirection(u32),
    /// Command buffer does not fit the submission capacity
    CommandBufferTooLarge { words: usize, capacity: usize },
    /// Resource is not known to the device
    UnknownResource(ResourceId),
    /// Resource is already registered for scanout
    AlreadyRegistered(ResourceId),
    /// Resource is not registered for scanout
    NotRegistered(ResourceId),
    /// Resource specification is inconsistent
    InvalidResourceSpec,
    /// Configuration is inconsistent
    InvalidConfig,
    /// Operation is not allowed in the current device state
    InvalidState(DeviceState),
    /// No drawtarget has been set up
    NoDrawtarget,
    /// Control code is not recognised
    UnknownOperation(u32),
    /// Argument does not match the control code
    InvalidArgument,
    /// Caller buffer is shorter than the requested length
    BadAddress,
    /// Adapter refused the request
    Adapter(AdapterError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferOverflow { capacity } => {
                write!(f, "Command buffer overflow (capacity {} words)", capacity)
            }
            Error::RecordTooLong => write!(f, "Command record too long"),
            Error::TruncatedRecord { offset } => {
                write!(f, "Truncated command record at word {}", offset)
            }
            Error::TransferOutOfBounds {
                offset,
                length,
                capacity,
            } => write!(
                f,
                "Transfer of {} bytes at offset {} exceeds region of {} bytes",
                length, offset, capacity
            ),
            Error::InvalidDirection(raw) => write!(f, "Invalid transfer direction {}", raw),
            Error::CommandBufferTooLarge { words, capacity } => write!(
                f,
                "Command buffer of {} words exceeds capacity of {} words",
                words, capacity
            ),
            Error::UnknownResource(id) => write!(f, "Unknown resource {}", id.value()),
            Error::AlreadyRegistered(id) => {
                write!(f, "Resource {} already registered for scanout", id.value())
            }
            Error::NotRegistered(id) => {
                write!(f, "Resource {} not registered for scanout", id.value())
            }
            Error::InvalidResourceSpec => write!(f, "Invalid resource specification"),
            Error::InvalidConfig => write!(f, "Invalid configuration"),
            Error::InvalidState(state) => write!(f, "Operation not allowed in state {:?}", state),
            Error::NoDrawtarget => write!(f, "No drawtarget"),
            Error::UnknownOperation(code) => write!(f, "Unknown operation {:#x}", code),
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::BadAddress => write!(f, "Bad address"),
            Error::Adapter(err) => write!(f, "Adapter error: {}", err),
        }
    }
}

impl From<AdapterError> for Error {
    fn from(err: AdapterError) -> Self {
        Error::Adapter(err)
    }
}

impl Error {
    /// Errno reported through the control surface
    pub fn errno(&self) -> i32 {
        match self {
            Error::BufferOverflow { .. } | Error::TransferOutOfBounds { .. } => EOVERFLOW,
            Error::RecordTooLong | Error::CommandBufferTooLarge { .. } => E2BIG,
            Error::TruncatedRecord { .. }
            | Error::InvalidDirection(_)
            | Error::InvalidResourceSpec
            | Error::InvalidConfig
            | Error::InvalidArgument => EINVAL,
            Error::UnknownResource(_) => ENOENT,
            Error::AlreadyRegistered(_) => EEXIST,
            Error::NotRegistered(_) => ENOENT,
            Error::InvalidState(_) => EBUSY,
            Error::NoDrawtarget => ENODEV,
            Error::UnknownOperation(_) => ENOTTY,
            Error::BadAddress => EFAULT,
            Error::Adapter(AdapterError::OutOfMemory) => ENOMEM,
            Error::Adapter(AdapterError::InvalidResourceId)
            | Error::Adapter(AdapterError::InvalidContextId)
            | Error::Adapter(AdapterError::InvalidScanoutId) => EBADF,
            Error::Adapter(AdapterError::InvalidParameter) => EINVAL,
            Error::Adapter(_) => EIO,
        }
    }
}

impl From<Error> for syscall::Error {
    fn from(err: Error) -> Self {
        syscall::Error::new(err.errno())
    }
}
