//! Decoding errors for instruction streams and constant pools

use core_types::{Fault, VmError};
use thiserror::Error;

/// Failure while decoding bytecode or resolving a pool index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Read past the end of the code buffer
    #[error("unexpected end of code at {0}")]
    UnexpectedEnd(usize),
    /// Byte is not an AVM2 opcode
    #[error("unknown opcode 0x{byte:02x} at {position}")]
    UnknownOpcode {
        /// Offending byte
        byte: u8,
        /// Position of the byte
        position: usize,
    },
    /// u30 with more than five bytes or bits above 30
    #[error("malformed u30 at {0}")]
    MalformedU30(usize),
    /// Constant pool index out of range
    #[error("{pool} index {index} out of range")]
    BadIndex {
        /// Pool name
        pool: &'static str,
        /// Requested index
        index: u32,
    },
    /// Method has been detached from its container
    #[error("method is not attached to a loaded ABC file")]
    Detached,
}

impl From<DecodeError> for Fault {
    fn from(err: DecodeError) -> Self {
        Fault::Verify(err.to_string())
    }
}

impl From<DecodeError> for VmError {
    fn from(err: DecodeError) -> Self {
        VmError::Fault(err.into())
    }
}
