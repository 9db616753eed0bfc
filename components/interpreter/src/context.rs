//! Execution context shared by every frame of one engine instance
//!
//! The context owns the host, the invoker that decides how a method runs,
//! the hook registry and the call depth counters. Frames borrow it shared;
//! counters live in `Cell`s and are restored by [`FrameGuard`] on every exit
//! path, including unwinding through `?`.

use std::cell::Cell;
use std::rc::Rc;

use bytecode_system::MethodInfo;
use core_types::{Fault, Value, VmError};

use crate::hooks::HookRegistry;
use crate::host::ObjectModel;
use crate::normalize::{self, FaultSite};
use crate::scope::Scope;

/// Default limit on nested method invocations
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Runs a method in whatever mode the implementor chooses.
pub trait Invoker {
    /// Run `method` with `receiver` as local 0 and `args` bound to its
    /// parameters. `scope` is the method's saved scope.
    fn invoke(
        &self,
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError>;
}

/// Per-engine execution state
pub struct ExecutionContext {
    host: Rc<dyn ObjectModel>,
    invoker: Rc<dyn Invoker>,
    hooks: Rc<HookRegistry>,
    call_depth: Cell<usize>,
    scope_stacks: Cell<usize>,
    max_call_depth: usize,
}

impl ExecutionContext {
    /// Create a context with an empty hook registry
    pub fn new(host: Rc<dyn ObjectModel>, invoker: Rc<dyn Invoker>) -> Self {
        Self {
            host,
            invoker,
            hooks: Rc::new(HookRegistry::new()),
            call_depth: Cell::new(0),
            scope_stacks: Cell::new(0),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Share an existing hook registry
    pub fn with_hooks(mut self, hooks: Rc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Change the nesting limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// The object model
    pub fn host(&self) -> &dyn ObjectModel {
        &*self.host
    }

    /// Shared handle to the object model
    pub fn host_rc(&self) -> Rc<dyn ObjectModel> {
        Rc::clone(&self.host)
    }

    /// Hook registry
    pub fn hooks(&self) -> &Rc<HookRegistry> {
        &self.hooks
    }

    /// Invoke a method through the configured invoker.
    ///
    /// This is the engine boundary: any fault still unclassified when it
    /// gets here becomes a script error value.
    pub fn invoke(
        &self,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        self.invoker
            .invoke(self, method, scope, receiver, args)
            .map_err(|err| normalize::classify(self, err, &FaultSite::unknown()))
    }

    /// Account for a new frame. Fails once the nesting limit is reached.
    pub fn enter_frame(&self) -> Result<FrameGuard<'_>, VmError> {
        if self.call_depth.get() >= self.max_call_depth {
            return Err(Fault::RecursionLimit.into());
        }
        self.call_depth.set(self.call_depth.get() + 1);
        self.scope_stacks.set(self.scope_stacks.get() + 1);
        Ok(FrameGuard { cx: self })
    }

    /// Frames currently executing
    pub fn call_depth(&self) -> usize {
        self.call_depth.get()
    }

    /// Scope stacks currently live
    pub fn scope_stacks(&self) -> usize {
        self.scope_stacks.get()
    }

    /// Nesting limit
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }
}

/// Restores the frame counters when dropped
#[must_use = "the frame is released as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    cx: &'a ExecutionContext,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.cx.call_depth.set(self.cx.call_depth.get().saturating_sub(1));
        self.cx
            .scope_stacks
            .set(self.cx.scope_stacks.get().saturating_sub(1));
    }
}
