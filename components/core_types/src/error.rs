//! Error types and error handling.
//!
//! Two layers of failure exist inside the engine:
//!
//! - [`VmError::Throw`] carries a script-visible value. It is what `THROW`
//!   raises and what every classified failure turns into.
//! - [`VmError::Fault`] carries an engine-internal [`Fault`] that has not been
//!   classified yet. Faults are mapped to a script error of the right
//!   [`ErrorKind`] at the instruction that raised them.

use thiserror::Error;

use crate::Value;

/// Script-visible error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported bytecode
    VerifyError,
    /// Null dereference, call of a non-function, incompatible coercion
    TypeError,
    /// Reference to an undefined name, sealed or constant property writes
    ReferenceError,
    /// Value out of allowed range (recursion limit, radix)
    RangeError,
    /// Wrong number of arguments
    ArgumentError,
    /// Unclassified engine failure, surfaced as a plain `Error`
    InternalError,
}

impl ErrorKind {
    /// Name of the script class used for this kind.
    ///
    /// ```
    /// use core_types::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::TypeError.class_name(), "TypeError");
    /// assert_eq!(ErrorKind::InternalError.class_name(), "Error");
    /// ```
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::VerifyError => "VerifyError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::InternalError => "Error",
        }
    }
}

/// Error codes carried in the `errorID` of script error objects.
pub mod error_codes {
    /// Generic internal failure
    pub const INTERNAL_ERROR: u32 = 1000;
    /// Radix argument out of range
    pub const INVALID_RADIX: u32 = 1003;
    /// Value is not a function
    pub const CALL_OF_NON_FUNCTION: u32 = 1006;
    /// Instantiation attempted on a non-constructor
    pub const CONSTRUCT_OF_NON_FUNCTION: u32 = 1007;
    /// Null object reference
    pub const CONVERT_NULL: u32 = 1009;
    /// Undefined object reference
    pub const CONVERT_UNDEFINED: u32 = 1010;
    /// Method contained an illegal opcode
    pub const ILLEGAL_OPCODE: u32 = 1011;
    /// Class could not be found
    pub const CLASS_NOT_FOUND: u32 = 1014;
    /// Invalid base class
    pub const INVALID_BASE_CLASS: u32 = 1017;
    /// Recursion limit reached
    pub const STACK_OVERFLOW: u32 = 1023;
    /// Operand stack underflow
    pub const STACK_UNDERFLOW: u32 = 1024;
    /// Operand stack overflow inside a frame
    pub const FRAME_STACK_OVERFLOW: u32 = 1030;
    /// Type coercion failed
    pub const CHECK_TYPE_FAILED: u32 = 1034;
    /// Right-hand side of instanceof is not a class or function
    pub const CANT_USE_INSTANCEOF: u32 = 1040;
    /// Right-hand side of is/as is not a class
    pub const IS_TYPE_MUST_BE_CLASS: u32 = 1041;
    /// Cannot convert to primitive
    pub const CONVERT_TO_PRIMITIVE: u32 = 1050;
    /// Cannot create a property on a sealed object
    pub const WRITE_SEALED: u32 = 1056;
    /// Argument count mismatch
    pub const WRONG_ARGUMENT_COUNT: u32 = 1063;
    /// Variable is not defined
    pub const UNDEFINED_VAR: u32 = 1065;
    /// Property not found on a sealed object
    pub const READ_SEALED: u32 = 1069;
    /// Illegal write to a read-only property
    pub const CONST_WRITE: u32 = 1074;

    /// Message template for a code; `%1`, `%2`, ... stand for arguments.
    pub fn template(code: u32) -> &'static str {
        match code {
            INVALID_RADIX => "The radix argument must be between 2 and 36; got %1.",
            CALL_OF_NON_FUNCTION => "%1 is not a function.",
            CONSTRUCT_OF_NON_FUNCTION => "Instantiation attempted on a non-constructor.",
            CONVERT_NULL => "Cannot access a property or method of a null object reference.",
            CONVERT_UNDEFINED => "A term is undefined and has no properties.",
            ILLEGAL_OPCODE => "Method contained illegal code: %1.",
            CLASS_NOT_FOUND => "Class %1 could not be found.",
            INVALID_BASE_CLASS => "Illegal base class.",
            STACK_OVERFLOW => "Stack overflow occurred.",
            STACK_UNDERFLOW => "Stack underflow occurred.",
            FRAME_STACK_OVERFLOW => "Operand stack overflow occurred.",
            CHECK_TYPE_FAILED => "Type Coercion failed: cannot convert %1 to %2.",
            CANT_USE_INSTANCEOF => "The right-hand side of instanceof must be a class or function.",
            IS_TYPE_MUST_BE_CLASS => "The right-hand side of operator must be a class.",
            CONVERT_TO_PRIMITIVE => "Cannot convert %1 to primitive.",
            WRITE_SEALED => "Cannot create property %1 on %2.",
            WRONG_ARGUMENT_COUNT => "Argument count mismatch on %1. Expected %2, got %3.",
            UNDEFINED_VAR => "Variable %1 is not defined.",
            READ_SEALED => "Property %1 not found on %2 and there is no default value.",
            CONST_WRITE => "Illegal write to read-only property %1 on %2.",
            _ => "Internal error: %1",
        }
    }

    /// Render the message for a code with its arguments substituted.
    ///
    /// ```
    /// use core_types::error_codes;
    ///
    /// assert_eq!(
    ///     error_codes::format_message(error_codes::CALL_OF_NON_FUNCTION, &["draw".into()]),
    ///     "Error #1006: draw is not a function."
    /// );
    /// ```
    pub fn format_message(code: u32, args: &[String]) -> String {
        let mut message = template(code).to_string();
        for (i, arg) in args.iter().enumerate().rev() {
            message = message.replace(&format!("%{}", i + 1), arg);
        }
        format!("Error #{}: {}", code, message)
    }
}

/// Engine-internal failure awaiting classification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// Receiver was `null`
    #[error("cannot access a property or method of a null object reference")]
    NullReference,
    /// Receiver was `undefined`
    #[error("cannot access a property or method of an undefined object reference")]
    UndefinedReference,
    /// Call target is not callable
    #[error("value is not a function")]
    NotCallable,
    /// Construct target is not a constructor
    #[error("value is not a constructor")]
    NotConstructor,
    /// Lookup of an undefined property or variable
    #[error("property {0} not found")]
    PropertyNotFound(String),
    /// Property read on a sealed object
    #[error("property {name} not found on {class} and there is no default value")]
    ReadSealed {
        /// Property name
        name: String,
        /// Owning class name
        class: String,
    },
    /// Property creation on a sealed object
    #[error("cannot create property {name} on {class}")]
    WriteSealed {
        /// Property name
        name: String,
        /// Owning class name
        class: String,
    },
    /// Write to a constant property
    #[error("illegal write to read-only property {name} on {class}")]
    ConstWrite {
        /// Property name
        name: String,
        /// Owning class name
        class: String,
    },
    /// Type name did not resolve to a class
    #[error("class {0} could not be found")]
    ClassNotFound(String),
    /// A class was required but something else was supplied
    #[error("value is not a class")]
    NotAClass,
    /// `valueOf`/`toString` did not produce a primitive
    #[error("cannot convert object to primitive")]
    ToPrimitive,
    /// Call depth limit exceeded
    #[error("call depth limit exceeded")]
    RecursionLimit,
    /// Too few arguments supplied
    #[error("argument count mismatch on {method}: expected {expected}, got {got}")]
    ArgumentCount {
        /// Method path
        method: String,
        /// Minimum number of arguments
        expected: usize,
        /// Number supplied
        got: usize,
    },
    /// Radix outside 2..=36
    #[error("radix {0} out of range")]
    InvalidRadix(i32),
    /// Pop from an empty operand stack
    #[error("operand stack underflow")]
    OperandStackUnderflow,
    /// Push beyond the declared operand stack size
    #[error("operand stack overflow")]
    OperandStackOverflow,
    /// Malformed or unsupported bytecode
    #[error("verify error: {0}")]
    Verify(String),
    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure as seen by engine entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// A script value was thrown
    #[error("uncaught exception: {0:?}")]
    Throw(Value),
    /// An engine-internal failure not yet classified
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl VmError {
    /// The thrown script value, if this is a throw.
    pub fn thrown(&self) -> Option<&Value> {
        match self {
            VmError::Throw(value) => Some(value),
            VmError::Fault(_) => None,
        }
    }

    /// The internal fault, if this has not been classified yet.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            VmError::Throw(_) => None,
            VmError::Fault(fault) => Some(fault),
        }
    }

    /// Whether this is a verification failure, which is fatal to the frame
    /// that raised it.
    pub fn is_verify(&self) -> bool {
        matches!(
            self,
            VmError::Fault(
                Fault::Verify(_) | Fault::OperandStackUnderflow | Fault::OperandStackOverflow
            )
        )
    }
}
