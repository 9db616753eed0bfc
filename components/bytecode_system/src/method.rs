//! Method and class descriptors
//!
//! A [`MethodInfo`] is created once when its ABC file is loaded and is shared
//! by every call of the method. Its only mutable parts are the write-once
//! compilation slot and the memoized hook path.

use std::any::Any;
use std::cell::{Cell, OnceCell};
use std::rc::{Rc, Weak};

use core_types::Value;

use crate::abc::AbcFile;
use crate::error::DecodeError;
use crate::multiname::Multiname;

/// A declared parameter
#[derive(Debug, Clone, Default)]
pub struct Parameter {
    /// Parameter name (debug info)
    pub name: Option<Rc<str>>,
    /// Declared type; `None` means untyped
    pub type_name: Option<Rc<Multiname>>,
    /// Default value for optional parameters
    pub default: Option<Value>,
}

impl Parameter {
    /// Untyped, required parameter
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Typed, required parameter
    pub fn typed(type_name: Rc<Multiname>) -> Self {
        Self {
            type_name: Some(type_name),
            ..Self::default()
        }
    }

    /// Give the parameter a default value
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Method flags that change frame setup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    /// Surplus arguments are collected into an array after the parameters
    pub needs_rest: bool,
    /// All arguments are collected into an array after the parameters
    pub needs_arguments: bool,
    /// Method uses DXNS
    pub set_dxns: bool,
}

/// Exception region of a method body
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    /// First covered position
    pub start: usize,
    /// First position past the covered range
    pub end: usize,
    /// Handler entry point
    pub target: usize,
    /// Filter type; `None` catches everything
    pub type_name: Option<Rc<Multiname>>,
    /// Name of the catch variable
    pub var_name: Option<Rc<Multiname>>,
}

impl ExceptionInfo {
    /// Region catching everything
    pub fn catch_all(start: usize, end: usize, target: usize) -> Self {
        Self {
            start,
            end,
            target,
            type_name: None,
            var_name: None,
        }
    }

    /// Region filtered by type
    pub fn typed(start: usize, end: usize, target: usize, type_name: Rc<Multiname>) -> Self {
        Self {
            type_name: Some(type_name),
            ..Self::catch_all(start, end, target)
        }
    }

    /// Whether a throw at `site` lies in this region
    pub fn covers(&self, site: usize) -> bool {
        self.start <= site && site < self.end
    }
}

/// Executable part of a method
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Code buffer
    pub code: Rc<[u8]>,
    /// Declared maximum operand stack depth
    pub max_stack: usize,
    /// Number of local registers
    pub local_count: usize,
    /// Scope depth on entry
    pub init_scope_depth: usize,
    /// Maximum scope depth
    pub max_scope_depth: usize,
    /// Exception regions in declaration order
    pub exceptions: Vec<ExceptionInfo>,
}

impl MethodBody {
    /// Body with the given code and limits
    pub fn new(code: impl Into<Rc<[u8]>>, max_stack: usize, local_count: usize) -> Self {
        Self {
            code: code.into(),
            max_stack,
            local_count,
            init_scope_depth: 0,
            max_scope_depth: 0,
            exceptions: Vec::new(),
        }
    }

    /// Set the scope depth limits
    pub fn with_scope_depth(mut self, init: usize, max: usize) -> Self {
        self.init_scope_depth = init;
        self.max_scope_depth = max;
        self
    }

    /// Append an exception region
    pub fn with_exception(mut self, info: ExceptionInfo) -> Self {
        self.exceptions.push(info);
        self
    }

    /// Number of scope entries a frame may push
    pub fn scope_capacity(&self) -> usize {
        self.max_scope_depth.saturating_sub(self.init_scope_depth)
    }
}

/// What a method belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOwner {
    /// Script-level function or closure
    Script,
    /// Instance side of the named class
    Instance(Rc<str>),
    /// Static side of the named class
    Class(Rc<str>),
}

/// Compilation progress of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationState {
    /// Not attempted yet
    Pending,
    /// Compilation in progress; re-entrant calls interpret
    Compiling,
    /// Routine available
    Compiled,
    /// Compilation failed; never retried
    Failed,
}

/// Write-once compilation cache carried by every method descriptor.
///
/// The routine is stored type-erased so that the compiler crate can keep its
/// own representation.
#[derive(Debug)]
pub struct CompilationSlot {
    state: Cell<CompilationState>,
    routine: OnceCell<Rc<dyn Any>>,
    error: OnceCell<Rc<str>>,
    calls: Cell<u32>,
}

impl Default for CompilationSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilationSlot {
    /// Fresh slot in the `Pending` state
    pub fn new() -> Self {
        Self {
            state: Cell::new(CompilationState::Pending),
            routine: OnceCell::new(),
            error: OnceCell::new(),
            calls: Cell::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> CompilationState {
        self.state.get()
    }

    /// Move from `Pending` to `Compiling`. Returns false in any other state.
    pub fn begin(&self) -> bool {
        if self.state.get() != CompilationState::Pending {
            return false;
        }
        self.state.set(CompilationState::Compiling);
        true
    }

    /// Store the compiled routine
    pub fn complete(&self, routine: Rc<dyn Any>) {
        if self.routine.set(routine).is_ok() {
            self.state.set(CompilationState::Compiled);
        }
    }

    /// Record a compilation failure
    pub fn fail(&self, error: impl Into<Rc<str>>) {
        let _ = self.error.set(error.into());
        self.state.set(CompilationState::Failed);
    }

    /// The compiled routine, if any
    pub fn routine(&self) -> Option<&Rc<dyn Any>> {
        self.routine.get()
    }

    /// The recorded compile error, if any
    pub fn error(&self) -> Option<&Rc<str>> {
        self.error.get()
    }

    /// Count a call and return the total so far
    pub fn record_call(&self) -> u32 {
        let calls = self.calls.get().saturating_add(1);
        self.calls.set(calls);
        calls
    }

    /// Calls counted so far
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

/// Method descriptor
#[derive(Debug)]
pub struct MethodInfo {
    /// Index in the ABC method table
    pub index: u32,
    /// Method name (debug info)
    pub name: Option<Rc<str>>,
    /// Owning script or class
    pub owner: MethodOwner,
    /// Whether this is an instance initializer
    pub is_constructor: bool,
    /// Declared parameters
    pub params: Vec<Parameter>,
    /// Declared return type
    pub return_type: Option<Rc<Multiname>>,
    /// Frame setup flags
    pub flags: MethodFlags,
    /// Body; native methods have none
    pub body: Option<MethodBody>,
    pub(crate) abc: Weak<AbcFile>,
    compilation: CompilationSlot,
    hook_path: OnceCell<Rc<str>>,
}

impl MethodInfo {
    /// Script-level method with no parameters and no body
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: None,
            owner: MethodOwner::Script,
            is_constructor: false,
            params: Vec::new(),
            return_type: None,
            flags: MethodFlags::default(),
            body: None,
            abc: Weak::new(),
            compilation: CompilationSlot::new(),
            hook_path: OnceCell::new(),
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<Rc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the owner
    pub fn with_owner(mut self, owner: MethodOwner) -> Self {
        self.owner = owner;
        self
    }

    /// Mark as an instance initializer
    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    /// Append a parameter
    pub fn with_param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    /// Set the return type
    pub fn with_return_type(mut self, type_name: Rc<Multiname>) -> Self {
        self.return_type = Some(type_name);
        self
    }

    /// Set the flags
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// The ABC file this method was loaded from
    pub fn abc(&self) -> Result<Rc<AbcFile>, DecodeError> {
        self.abc.upgrade().ok_or(DecodeError::Detached)
    }

    /// Compilation cache
    pub fn compilation(&self) -> &CompilationSlot {
        &self.compilation
    }

    /// Arguments required before the first optional parameter
    pub fn min_arguments(&self) -> usize {
        self.params
            .iter()
            .position(|p| p.default.is_some())
            .unwrap_or(self.params.len())
    }

    /// Stable `path/member` key used for method hooks.
    ///
    /// ```
    /// use bytecode_system::{MethodInfo, MethodOwner};
    ///
    /// let m = MethodInfo::new(0)
    ///     .with_name("update")
    ///     .with_owner(MethodOwner::Instance("game.Player".into()));
    /// assert_eq!(&*m.hook_path(), "game/Player/update");
    ///
    /// let f = MethodInfo::new(1).with_name("main");
    /// assert_eq!(&*f.hook_path(), "__root__/main");
    /// ```
    pub fn hook_path(&self) -> Rc<str> {
        let path = self.hook_path.get_or_init(|| {
            let member = if self.is_constructor {
                "constructor"
            } else {
                self.name.as_deref().unwrap_or("anonymous")
            };
            match &self.owner {
                MethodOwner::Script => format!("__root__/{}", member).into(),
                MethodOwner::Instance(class) | MethodOwner::Class(class) => {
                    let class = class.replace("::", "/").replace('.', "/");
                    format!("{}/{}", class, member).into()
                }
            }
        });
        Rc::clone(path)
    }

    /// Name for diagnostics
    pub fn display_name(&self) -> String {
        self.hook_path().to_string()
    }
}

/// Class descriptor, opaque to the engine beyond what `NEWCLASS` passes on
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Index in the ABC class table
    pub index: u32,
    /// Class name
    pub name: Rc<Multiname>,
    /// Base class name
    pub super_name: Option<Rc<Multiname>>,
    /// Method index of the instance initializer
    pub instance_initializer: u32,
    /// Method index of the static initializer
    pub class_initializer: Option<u32>,
    /// Instances reject new dynamic properties
    pub sealed: bool,
    /// Interface rather than class
    pub interface: bool,
}

impl ClassInfo {
    /// Class with the given name and instance initializer
    pub fn new(index: u32, name: Rc<Multiname>, instance_initializer: u32) -> Self {
        Self {
            index,
            name,
            super_name: None,
            instance_initializer,
            class_initializer: None,
            sealed: false,
            interface: false,
        }
    }

    /// Set the base class name
    pub fn with_super(mut self, super_name: Rc<Multiname>) -> Self {
        self.super_name = Some(super_name);
        self
    }

    /// Set the static initializer
    pub fn with_class_initializer(mut self, method: u32) -> Self {
        self.class_initializer = Some(method);
        self
    }

    /// Mark instances as sealed
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }
}
