use crate::store::StorageError;
use crate::types::BusStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Truncated input: expected {expected} bytes, transport supplied {available}")]
    TruncatedInput { expected: usize, available: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Peer name of {len} bytes exceeds capacity of {capacity}")]
    PeerNameTooLong { len: usize, capacity: usize },

    #[error("Debug frame of {needed} bytes exceeds remaining capacity of {remaining}")]
    CapacityExceeded { needed: usize, remaining: usize },

    #[error("Debugger busy")]
    Busy,

    #[error("Property is read-only or unknown")]
    UnsupportedProperty,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Bus error: {0}")]
    Bus(String),
}

impl ConsoleError {
    pub fn truncated(expected: usize, available: usize) -> Self {
        Self::TruncatedInput {
            expected,
            available,
        }
    }

    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus(message.into())
    }

    /// Status used when the error is reported back to the caller as a
    /// generic error reply rather than a console reply code.
    pub fn bus_status(&self) -> BusStatus {
        match self {
            ConsoleError::Storage(_)
            | ConsoleError::PeerNameTooLong { .. }
            | ConsoleError::CapacityExceeded { .. } => BusStatus::Resources,
            ConsoleError::Busy => BusStatus::Busy,
            ConsoleError::UnsupportedProperty => BusStatus::Unexpected,
            _ => BusStatus::Failure,
        }
    }
}
