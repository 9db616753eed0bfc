//! Compilation errors

use bytecode_system::{DecodeError, Opcode};
use core_types::{Fault, VmError};
use thiserror::Error;

/// Reason a method body could not be compiled.
///
/// A failure is recorded on the method descriptor and never retried; the
/// method then runs in the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Native or abstract method
    #[error("method has no body")]
    NoBody,
    /// Bytes that do not decode, or a pool index out of range
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Recognized but unimplemented instruction
    #[error("unsupported instruction {opcode} at {position}")]
    Unsupported {
        /// Offending opcode
        opcode: Opcode,
        /// Its position
        position: usize,
    },
    /// More values popped than are on the stack
    #[error("operand stack underflow at {position}")]
    StackUnderflow {
        /// Instruction position
        position: usize,
    },
    /// Depth above the declared `max_stack`
    #[error("operand stack depth {depth} exceeds {max} at {position}")]
    StackOverflow {
        /// Instruction position
        position: usize,
        /// Depth reached
        depth: usize,
        /// Declared limit
        max: usize,
    },
    /// Scope depth above `max_scope_depth - init_scope_depth`
    #[error("scope stack overflow at {0}")]
    ScopeOverflow(usize),
    /// `POPSCOPE` on an empty scope stack
    #[error("scope stack underflow at {0}")]
    ScopeUnderflow(usize),
    /// Two paths reach an instruction with different depths
    #[error("inconsistent stack or scope depth at {0}")]
    InconsistentDepth(usize),
    /// Branch to a position that does not start an instruction
    #[error("branch at {position} targets {target}, which is not an instruction")]
    BadTarget {
        /// Branch position
        position: usize,
        /// Target position
        target: i64,
    },
    /// Control continues past the last instruction
    #[error("control falls off the end of the code after {0}")]
    FallsOffEnd(usize),
    /// Exception region outside the code or with a bad handler
    #[error("exception region {0} is out of range")]
    BadRegion(usize),
    /// Local index beyond the frame
    #[error("local {index} out of range at {position}")]
    BadLocal {
        /// Instruction position
        position: usize,
        /// Local index
        index: u32,
    },
    /// Scope stack entry beyond the static depth
    #[error("scope index {index} out of range at {position}")]
    BadScopeIndex {
        /// Instruction position
        position: usize,
        /// Requested index
        index: u8,
    },
}

impl From<CompileError> for Fault {
    fn from(err: CompileError) -> Self {
        Fault::Verify(err.to_string())
    }
}

impl From<CompileError> for VmError {
    fn from(err: CompileError) -> Self {
        VmError::Fault(err.into())
    }
}
