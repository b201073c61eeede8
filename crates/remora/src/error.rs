use std::time::Duration;

use thiserror::Error;

use crate::memory::ChainBreak;
use crate::schedule::CallbackId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid process handle: {0}")]
    InvalidHandle(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to access {len} bytes at address {address:#x}")]
    OutOfBounds { address: u64, len: usize },

    #[error("Buffer access of {width} bytes at offset {offset} exceeds capacity {capacity}")]
    BufferOutOfBounds {
        offset: usize,
        width: usize,
        capacity: usize,
    },

    #[error("Pointer chain broken at step {step} (address {address:#x}): {cause}")]
    BrokenChain {
        step: usize,
        address: u64,
        cause: ChainBreak,
    },

    #[error("Invalid callback interval: {0:?}")]
    InvalidInterval(Duration),

    #[error("Callback {id} failed: {message}")]
    CallbackFault { id: CallbackId, message: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid address expression: {0}")]
    InvalidAddress(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a remote or local bounds failure
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            Error::OutOfBounds { .. } | Error::BufferOutOfBounds { .. }
        )
    }

    /// Check if the target process is gone or was never opened
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Error::InvalidHandle(_) | Error::ProcessNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = Error::BufferOutOfBounds {
            offset: 12,
            width: 8,
            capacity: 16,
        };
        assert!(err.is_out_of_bounds());
        assert!(!err.is_invalid_handle());

        let err = Error::OutOfBounds {
            address: 0x1000,
            len: 4,
        };
        assert!(err.is_out_of_bounds());

        let err = Error::ProcessNotFound("game.exe".to_string());
        assert!(err.is_invalid_handle());
        assert!(!err.is_out_of_bounds());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::OutOfBounds {
            address: 0xDEAD,
            len: 8,
        };
        assert_eq!(err.to_string(), "Failed to access 8 bytes at address 0xdead");

        let err = Error::BrokenChain {
            step: 1,
            address: 0x40,
            cause: ChainBreak::NullPointer,
        };
        assert!(err.to_string().contains("step 1"));
        assert!(err.to_string().contains("null pointer"));
    }
}
