//! Interpreter frame: operand stack, locals and scope stack of one call

use std::rc::Rc;

use bytecode_system::{MethodInfo, Multiname, ResolvedName};
use core_types::{Fault, Value, VmError};

use crate::context::ExecutionContext;
use crate::names;
use crate::operations;
use crate::scope::{Scope, ScopeStack};

/// Mutable state of one interpreted invocation
#[derive(Debug)]
pub struct InterpreterFrame {
    /// Method being executed
    pub method: Rc<MethodInfo>,
    /// Operand stack
    pub stack: Vec<Value>,
    /// Locals; local 0 is the receiver
    pub locals: Vec<Value>,
    /// Scope stack over the saved scope
    pub scopes: ScopeStack,
    max_stack: usize,
    scope_capacity: usize,
}

impl InterpreterFrame {
    /// Set up a frame, binding arguments to locals
    pub fn new(
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Self, VmError> {
        let (max_stack, scope_capacity) = method
            .body
            .as_ref()
            .map_or((0, 0), |body| (body.max_stack, body.scope_capacity()));
        let locals = operations::bind_arguments(cx, method, scope, receiver, args)?;
        Ok(Self {
            method: Rc::clone(method),
            stack: Vec::with_capacity(max_stack),
            locals,
            scopes: ScopeStack::new(Rc::clone(scope)),
            max_stack,
            scope_capacity,
        })
    }

    /// Saved scope of the method
    pub fn saved_scope(&self) -> &Rc<Scope> {
        self.scopes.parent()
    }

    /// Push onto the operand stack
    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.max_stack {
            return Err(Fault::OperandStackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop the operand stack
    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or_else(|| Fault::OperandStackUnderflow.into())
    }

    /// Top of the operand stack
    pub fn peek(&self) -> Result<&Value, VmError> {
        self.stack.last().ok_or_else(|| Fault::OperandStackUnderflow.into())
    }

    /// Pop `count` values, deepest first
    pub fn pop_args(&mut self, count: usize) -> Result<Vec<Value>, VmError> {
        if count > self.stack.len() {
            return Err(Fault::OperandStackUnderflow.into());
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Pop the runtime parts of `mn` and resolve into `rn`
    pub fn pop_name(&mut self, cx: &ExecutionContext, mn: &Multiname, rn: &mut ResolvedName) -> Result<(), VmError> {
        names::pop_name_into(cx, &mut self.stack, mn, rn)
    }

    /// Read a local
    pub fn local(&self, index: u32) -> Result<Value, VmError> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Fault::Verify(format!("local {} out of range", index)).into())
    }

    /// Write a local
    pub fn set_local(&mut self, index: u32, value: Value) -> Result<(), VmError> {
        let slot = self
            .locals
            .get_mut(index as usize)
            .ok_or_else(|| Fault::Verify(format!("local {} out of range", index)))?;
        *slot = value;
        Ok(())
    }

    /// Push onto the scope stack
    pub fn push_scope(&mut self, object: Value, is_with: bool) -> Result<(), VmError> {
        if self.scopes.len() >= self.scope_capacity {
            return Err(Fault::Verify("scope stack overflow".into()).into());
        }
        self.scopes.push(object, is_with);
        Ok(())
    }

    /// Pop the scope stack
    pub fn pop_scope(&mut self) -> Result<(), VmError> {
        self.scopes
            .pop()
            .map(drop)
            .ok_or_else(|| Fault::Verify("scope stack underflow".into()).into())
    }

    /// Reset for an exception handler: the stack holds only the exception
    /// and the scope stack is empty.
    pub fn enter_handler(&mut self, exception: Value) {
        self.stack.clear();
        self.stack.push(exception);
        self.scopes.clear();
    }
}
