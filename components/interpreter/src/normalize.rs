//! Fault classification
//!
//! Turns engine-internal [`Fault`]s into script error values of the right
//! kind and code, using what is known about the instruction that failed.
//! Thrown values pass through untouched.

use bytecode_system::{Opcode, ResolvedName};
use core_types::{error_codes, ErrorKind, Fault, Value, VmError};

use crate::context::ExecutionContext;

/// What the failing instruction was working on
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultSite<'a> {
    /// Failing opcode
    pub opcode: Option<Opcode>,
    /// Receiver or operand object
    pub receiver: Option<&'a Value>,
    /// Callee for call and construct
    pub callee: Option<&'a Value>,
    /// Property or variable name
    pub name: Option<&'a ResolvedName>,
}

impl<'a> FaultSite<'a> {
    /// Site for an opcode
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode: Some(opcode),
            ..Self::default()
        }
    }

    /// Site with nothing known about it
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Attach the receiver
    pub fn receiver(mut self, value: &'a Value) -> Self {
        self.receiver = Some(value);
        self
    }

    /// Attach the callee
    pub fn callee(mut self, value: &'a Value) -> Self {
        self.callee = Some(value);
        self
    }

    /// Attach the name
    pub fn name(mut self, name: &'a ResolvedName) -> Self {
        self.name = Some(name);
        self
    }

    fn name_string(&self) -> String {
        match self.name {
            Some(name) => name.name_string(),
            None => "value".to_string(),
        }
    }
}

/// Error kind, code and message arguments for a fault at a site.
pub fn describe(fault: &Fault, site: &FaultSite<'_>) -> (ErrorKind, u32, Vec<String>) {
    use error_codes::*;
    match fault {
        Fault::NullReference => (ErrorKind::TypeError, CONVERT_NULL, vec![]),
        Fault::UndefinedReference => (ErrorKind::TypeError, CONVERT_UNDEFINED, vec![]),
        Fault::NotCallable => (ErrorKind::TypeError, CALL_OF_NON_FUNCTION, vec![site.name_string()]),
        Fault::NotConstructor => (ErrorKind::TypeError, CONSTRUCT_OF_NON_FUNCTION, vec![site.name_string()]),
        Fault::PropertyNotFound(name) => match site.opcode {
            Some(Opcode::GetLex | Opcode::FindPropStrict) => {
                (ErrorKind::ReferenceError, UNDEFINED_VAR, vec![name.clone()])
            }
            Some(
                Opcode::CallProperty
                | Opcode::CallPropLex
                | Opcode::CallPropVoid
                | Opcode::CallSuper
                | Opcode::CallSuperVoid
                | Opcode::ConstructProp,
            ) => (ErrorKind::TypeError, CALL_OF_NON_FUNCTION, vec![name.clone()]),
            _ => (ErrorKind::ReferenceError, READ_SEALED, vec![name.clone(), "Object".into()]),
        },
        Fault::ReadSealed { name, class } => {
            (ErrorKind::ReferenceError, READ_SEALED, vec![name.clone(), class.clone()])
        }
        Fault::WriteSealed { name, class } => {
            (ErrorKind::ReferenceError, WRITE_SEALED, vec![name.clone(), class.clone()])
        }
        Fault::ConstWrite { name, class } => {
            (ErrorKind::ReferenceError, CONST_WRITE, vec![name.clone(), class.clone()])
        }
        Fault::ClassNotFound(name) => (ErrorKind::ReferenceError, CLASS_NOT_FOUND, vec![name.clone()]),
        Fault::NotAClass => match site.opcode {
            Some(Opcode::InstanceOf) => (ErrorKind::TypeError, CANT_USE_INSTANCEOF, vec![]),
            Some(Opcode::NewClass) => (ErrorKind::VerifyError, INVALID_BASE_CLASS, vec![]),
            _ => (ErrorKind::TypeError, IS_TYPE_MUST_BE_CLASS, vec![]),
        },
        Fault::ToPrimitive => (ErrorKind::TypeError, CONVERT_TO_PRIMITIVE, vec!["Object".into()]),
        Fault::RecursionLimit => (ErrorKind::RangeError, STACK_OVERFLOW, vec![]),
        Fault::ArgumentCount { method, expected, got } => (
            ErrorKind::ArgumentError,
            WRONG_ARGUMENT_COUNT,
            vec![method.clone(), expected.to_string(), got.to_string()],
        ),
        Fault::InvalidRadix(radix) => (ErrorKind::RangeError, INVALID_RADIX, vec![radix.to_string()]),
        Fault::OperandStackUnderflow => (ErrorKind::VerifyError, STACK_UNDERFLOW, vec![]),
        Fault::OperandStackOverflow => (ErrorKind::VerifyError, FRAME_STACK_OVERFLOW, vec![]),
        Fault::Verify(message) => (ErrorKind::VerifyError, ILLEGAL_OPCODE, vec![message.clone()]),
        Fault::Internal(message) => (ErrorKind::InternalError, INTERNAL_ERROR, vec![message.clone()]),
    }
}

/// Classify a failure into a thrown script error.
pub fn classify(cx: &ExecutionContext, err: VmError, site: &FaultSite<'_>) -> VmError {
    let fault = match err {
        VmError::Throw(_) => return err,
        VmError::Fault(fault) => fault,
    };
    let (kind, code, args) = describe(&fault, site);
    if kind == ErrorKind::InternalError {
        tracing::error!(
            opcode = site.opcode.map(Opcode::name),
            fault = %fault,
            "unclassified engine fault"
        );
    }
    VmError::Throw(cx.host().create_error(kind, code, &args))
}
