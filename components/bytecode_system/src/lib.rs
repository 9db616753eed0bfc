//! Bytecode layer for the AVM2 execution engine
//!
//! This crate provides the instruction set, the instruction stream reader,
//! multinames and the method/class descriptors of a loaded ABC file. The ABC
//! binary parser itself lives elsewhere; [`AbcBuilder`] and [`CodeBuilder`]
//! assemble files programmatically.
//!
//! # Features
//!
//! - AVM2 opcode table with operand layouts
//! - u30 / s24 operand decoding
//! - Static and runtime multinames
//! - Method descriptors with a write-once compilation cache
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CodeBuilder, InstructionStream, Opcode};
//!
//! let mut code = CodeBuilder::new();
//! let done = code.new_label();
//! code.op(Opcode::PushTrue).branch(Opcode::IfTrue, done);
//! code.op(Opcode::Nop);
//! code.bind(done).op(Opcode::ReturnVoid);
//! let bytes = code.finish().unwrap();
//!
//! let mut stream = InstructionStream::new(&bytes);
//! assert_eq!(stream.read_opcode().unwrap(), Opcode::PushTrue);
//! assert_eq!(stream.read_opcode().unwrap(), Opcode::IfTrue);
//! assert_eq!(stream.read_s24().unwrap(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abc;
pub mod builder;
pub mod error;
pub mod method;
pub mod multiname;
pub mod opcode;
pub mod reader;

// Re-export main types at crate root
pub use abc::{AbcFile, ConstantPool};
pub use builder::{encode_u30, AbcBuilder, BuildError, CodeBuilder, Label};
pub use error::DecodeError;
pub use method::{
    ClassInfo, CompilationSlot, CompilationState, ExceptionInfo, MethodBody, MethodFlags,
    MethodInfo, MethodOwner, Parameter,
};
pub use multiname::{Multiname, MultinameKind, Namespace, NamespaceKind, ResolvedName};
pub use opcode::{OperandLayout, Opcode};
pub use reader::{offset_target, InstructionStream};
