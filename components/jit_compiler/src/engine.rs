//! Execution mode selection
//!
//! [`Engine`] is the [`Invoker`] that decides, per method and per call,
//! whether to interpret or to compile and run the compiled routine. Each
//! method is compiled at most once; the outcome is cached in the method's
//! [`CompilationSlot`](bytecode_system::CompilationSlot).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytecode_system::{CompilationState, MethodInfo};
use core_types::{Fault, Value, VmError};
use interpreter::{
    ExecutionContext, HookError, HookPlace, HookRegistry, Interpreter, Invoker, MethodHook, ObjectModel, Scope,
    DEFAULT_MAX_CALL_DEPTH,
};

use crate::baseline::{BaselineCompiler, BaselineStats};
use crate::compiled_code::CompiledRoutine;

/// Compile failures beyond this count are logged at debug level
const LOGGED_FAILURES: usize = 100;

/// How methods are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Compile on use and interpret whatever fails to compile
    #[default]
    Adaptive,
    /// Never compile
    InterpretOnly,
    /// Compile everything; a compile failure is a VerifyError
    CompileOnly,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Execution mode
    pub mode: ExecutionMode,
    /// Limit on nested invocations
    pub max_call_depth: usize,
    /// Interpreted calls before a method is compiled (adaptive mode only)
    pub compile_threshold: u32,
    /// Always interpret methods whose saved scope is the script scope
    pub interpret_script_scope: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Adaptive,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            compile_threshold: 0, // compile on first call
            interpret_script_scope: true,
        }
    }
}

impl EngineConfig {
    /// Interpret every method
    pub fn interpreter_only() -> Self {
        Self {
            mode: ExecutionMode::InterpretOnly,
            ..Self::default()
        }
    }

    /// Compile every method with a body, without fallback
    pub fn compiler_only() -> Self {
        Self {
            mode: ExecutionMode::CompileOnly,
            interpret_script_scope: false,
            ..Self::default()
        }
    }

    /// Change the nesting limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Interpret the first `calls` calls of each method
    pub fn with_compile_threshold(mut self, calls: u32) -> Self {
        self.compile_threshold = calls;
        self
    }

    /// Whether script-scope methods stay interpreted
    pub fn with_script_scope_interpreted(mut self, enabled: bool) -> Self {
        self.interpret_script_scope = enabled;
        self
    }
}

/// Dual-mode invoker
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use bytecode_system::{AbcBuilder, CodeBuilder, CompilationState, MethodBody, MethodInfo, Opcode};
/// use core_types::Value;
/// use interpreter::{ObjectHeap, Scope};
/// use jit_compiler::{Engine, EngineConfig};
///
/// let heap = Rc::new(ObjectHeap::new());
/// let cx = Engine::context(heap.clone(), EngineConfig::default());
///
/// let mut code = CodeBuilder::new();
/// code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
/// let mut abc = AbcBuilder::new();
/// let index = abc.method(MethodInfo::new(0).with_body(MethodBody::new(code.finish().unwrap(), 2, 1)));
/// let file = abc.build();
/// let method = file.method(index).unwrap();
///
/// let scope = Scope::global(heap.global()).extend(Value::Null, false);
/// assert_eq!(cx.invoke(method, &scope, Value::Undefined, &[]).unwrap(), Value::Int(5));
/// assert_eq!(method.compilation().state(), CompilationState::Compiled);
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    interpreter: Interpreter,
    compiler: RefCell<BaselineCompiler>,
    hooks: Rc<HookRegistry>,
    failures_logged: Cell<usize>,
}

impl Engine {
    /// Create an engine
    pub fn new(config: EngineConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            interpreter: Interpreter::new(),
            compiler: RefCell::new(BaselineCompiler::new()),
            hooks: Rc::new(HookRegistry::new()),
            failures_logged: Cell::new(0),
        })
    }

    /// Execution context running every call through a new engine
    pub fn context(host: Rc<dyn ObjectModel>, config: EngineConfig) -> ExecutionContext {
        Self::new(config).bind(host)
    }

    /// Execution context running every call through this engine
    pub fn bind(self: &Rc<Self>, host: Rc<dyn ObjectModel>) -> ExecutionContext {
        let invoker: Rc<dyn Invoker> = Rc::clone(self) as Rc<dyn Invoker>;
        ExecutionContext::new(host, invoker)
            .with_hooks(Rc::clone(&self.hooks))
            .with_max_call_depth(self.config.max_call_depth)
    }

    /// Configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hook registry shared with bound contexts
    pub fn hooks(&self) -> &Rc<HookRegistry> {
        &self.hooks
    }

    /// Attach a hook to the method at `path`, in both execution modes
    pub fn attach_method_hook(&self, path: &str, place: HookPlace, hook: MethodHook) -> Result<(), HookError> {
        self.hooks.attach(path, place, hook)
    }

    /// Compiler statistics
    pub fn stats(&self) -> BaselineStats {
        self.compiler.borrow().stats().clone()
    }

    fn interprets(&self, method: &MethodInfo, scope: &Scope) -> bool {
        match self.config.mode {
            ExecutionMode::InterpretOnly => true,
            _ => method.body.is_none() || (self.config.interpret_script_scope && scope.is_global()),
        }
    }

    /// Routine to run for this call, or `None` to interpret
    fn routine(&self, method: &Rc<MethodInfo>) -> Result<Option<Rc<CompiledRoutine>>, VmError> {
        let slot = method.compilation();
        match slot.state() {
            CompilationState::Compiled => Ok(slot.routine().and_then(|routine| Rc::clone(routine).downcast().ok())),
            // Re-entered from inside the compiler
            CompilationState::Compiling => Ok(None),
            CompilationState::Failed => match self.config.mode {
                ExecutionMode::CompileOnly => {
                    let message = slot.error().map_or_else(String::new, |err| err.to_string());
                    Err(Fault::Verify(format!("{}: {}", method.display_name(), message)).into())
                }
                _ => Ok(None),
            },
            CompilationState::Pending => {
                if self.config.mode == ExecutionMode::Adaptive && slot.record_call() <= self.config.compile_threshold {
                    return Ok(None);
                }
                self.compile(method)
            }
        }
    }

    fn compile(&self, method: &Rc<MethodInfo>) -> Result<Option<Rc<CompiledRoutine>>, VmError> {
        let slot = method.compilation();
        let Ok(mut compiler) = self.compiler.try_borrow_mut() else {
            return Ok(None);
        };
        if !slot.begin() {
            return Ok(None);
        }
        let result = compiler.compile(method, &self.hooks);
        drop(compiler);
        match result {
            Ok(routine) => {
                tracing::debug!(
                    method = %method.display_name(),
                    steps = routine.step_count(),
                    blocks = routine.block_count(),
                    "method compiled"
                );
                let routine = Rc::new(routine);
                slot.complete(Rc::clone(&routine) as Rc<dyn std::any::Any>);
                Ok(Some(routine))
            }
            Err(err) => {
                let logged = self.failures_logged.get();
                if logged < LOGGED_FAILURES {
                    tracing::warn!(method = %method.display_name(), error = %err, "compilation failed");
                } else {
                    tracing::debug!(method = %method.display_name(), error = %err, "compilation failed");
                }
                self.failures_logged.set(logged + 1);
                slot.fail(err.to_string());
                match self.config.mode {
                    ExecutionMode::CompileOnly => Err(err.into()),
                    _ => Ok(None),
                }
            }
        }
    }
}

impl Invoker for Engine {
    fn invoke(
        &self,
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        if self.interprets(method, scope) {
            return self.interpreter.invoke(cx, method, scope, receiver, args);
        }
        match self.routine(method)? {
            Some(routine) => routine.execute(cx, method, scope, receiver, args),
            None => self.interpreter.invoke(cx, method, scope, receiver, args),
        }
    }
}
