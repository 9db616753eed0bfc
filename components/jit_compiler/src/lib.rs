//! Method compiler and execution mode selection for the AVM2 engine
//!
//! This crate provides:
//! - Analysis: stack and scope depth dataflow, jump targets and try regions
//! - Codegen: threaded-code routines built from the interpreter's operations
//! - [`Engine`]: the invoker that compiles on use and falls back to the
//!   interpreter
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode};
//! use core_types::Value;
//! use interpreter::{ObjectHeap, Scope};
//! use jit_compiler::{Engine, EngineConfig};
//!
//! let heap = Rc::new(ObjectHeap::new());
//! let cx = Engine::context(heap.clone(), EngineConfig::compiler_only());
//!
//! let mut code = CodeBuilder::new();
//! code.push_byte(20).push_byte(22).op(Opcode::Add).op(Opcode::ReturnValue);
//! let mut abc = AbcBuilder::new();
//! let index = abc.method(MethodInfo::new(0).with_body(MethodBody::new(code.finish().unwrap(), 2, 1)));
//! let file = abc.build();
//!
//! let scope = Scope::global(heap.global());
//! let result = cx.invoke(file.method(index).unwrap(), &scope, Value::Undefined, &[]).unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod codegen;
pub mod compiled_code;
pub mod engine;
pub mod error;
pub mod ir;

// Re-export main types at crate root
pub use baseline::{BaselineCompiler, BaselineStats};
pub use codegen::CodeGenerator;
pub use compiled_code::{CompiledRoutine, SlotCounts};
pub use engine::{Engine, EngineConfig, ExecutionMode};
pub use error::CompileError;
pub use ir::{analyze, Analysis, IrInstruction, Operands};
