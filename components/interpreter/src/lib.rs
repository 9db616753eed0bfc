//! Bytecode interpreter for the AVM2 execution engine
//!
//! This crate provides the interpreting half of the engine together with the
//! pieces both execution modes share:
//! - [`ExecutionContext`] with the call-depth guard and the [`Invoker`] seam
//! - The [`ObjectModel`] trait every object operation goes through
//! - Scope chains and the per-frame [`ScopeStack`]
//! - Exception normalization and handler selection
//! - Method hooks fired on entry and on return
//! - [`ObjectHeap`], a small reference object model
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode};
//! use core_types::Value;
//! use interpreter::{Interpreter, ObjectHeap, Scope};
//!
//! let heap = Rc::new(ObjectHeap::new());
//! let cx = Interpreter::context(heap.clone());
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

pub mod context;
pub mod dispatch;
pub mod frame;
pub mod heap;
pub mod hooks;
pub mod host;
pub mod names;
pub mod normalize;
pub mod operations;
pub mod scope;
pub mod vm;

// Re-export main types at crate root
pub use context::{ExecutionContext, FrameGuard, Invoker, DEFAULT_MAX_CALL_DEPTH};
pub use dispatch::{covering_regions, select_handler, Dispatcher};
pub use frame::InterpreterFrame;
pub use heap::{ClassKind, NativeFn, ObjectHeap};
pub use hooks::{HookError, HookPlace, HookRegistry, HookSlot, MethodHook};
pub use host::{Hint, ObjectModel};
pub use normalize::FaultSite;
pub use scope::{Scope, ScopeStack};
pub use vm::Interpreter;
