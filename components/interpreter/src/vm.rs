//! Interpreter entry point
//!
//! [`Interpreter`] is the [`Invoker`] that always interprets. It is also
//! the fallback the engine uses when a method cannot be compiled.

use std::rc::Rc;

use bytecode_system::MethodInfo;
use core_types::{Value, VmError};

use crate::context::{ExecutionContext, Invoker};
use crate::dispatch::Dispatcher;
use crate::host::ObjectModel;
use crate::scope::Scope;

/// Invoker that runs every method through the dispatch loop
#[derive(Debug, Default)]
pub struct Interpreter {
    dispatcher: Dispatcher,
}

impl Interpreter {
    /// Create an interpreter
    pub fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(),
        }
    }

    /// Execution context that interprets every call
    ///
    /// # Example
    ///
    /// ```
    /// use std::rc::Rc;
    /// use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode};
    /// use core_types::Value;
    /// use interpreter::{Interpreter, ObjectHeap, Scope};
    ///
    /// let heap = Rc::new(ObjectHeap::new());
    /// let cx = Interpreter::context(heap.clone());
    ///
    /// let mut code = CodeBuilder::new();
    /// code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
    /// let mut abc = AbcBuilder::new();
    /// let index = abc.method(MethodInfo::new(0).with_body(MethodBody::new(code.finish().unwrap(), 2, 1)));
    /// let file = abc.build();
    ///
    /// let scope = Scope::global(heap.global());
    /// let result = cx.invoke(file.method(index).unwrap(), &scope, Value::Undefined, &[]).unwrap();
    /// assert_eq!(result, Value::Int(5));
    /// ```
    pub fn context(host: Rc<dyn ObjectModel>) -> ExecutionContext {
        ExecutionContext::new(host, Rc::new(Interpreter::new()))
    }
}

impl Invoker for Interpreter {
    fn invoke(
        &self,
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        self.dispatcher.run(cx, method, scope, receiver, args)
    }
}
