//! Capabilities the engine consumes from the object model
//!
//! Both execution modes only ever touch objects through [`ObjectModel`]. A
//! host embeds the engine by implementing it; [`crate::heap::ObjectHeap`] is
//! the reference implementation used by the test suites.
//!
//! Receivers passed to property operations have already been boxed with
//! [`ObjectModel::box_value`]. Faults returned from these methods are
//! classified by the instruction that called them.

use std::rc::Rc;

use bytecode_system::{AbcFile, ClassInfo, ExceptionInfo, MethodInfo, Multiname, Namespace, ResolvedName};
use core_types::{ErrorKind, Fault, Value, VmError};

use crate::context::ExecutionContext;
use crate::scope::Scope;

/// Preferred type for [`ObjectModel::to_primitive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    /// No preference (`+`, `==`)
    Default,
    /// Numeric contexts and relational comparison
    Number,
    /// String conversion
    String,
}

/// Object model consumed by the interpreter and compiled routines.
pub trait ObjectModel {
    /// Wrap a receiver for property access. `null` and `undefined` fail.
    fn box_value(&self, value: &Value) -> Result<Value, VmError> {
        match value {
            Value::Null => Err(Fault::NullReference.into()),
            Value::Undefined => Err(Fault::UndefinedReference.into()),
            other => Ok(other.clone()),
        }
    }

    /// Convert an object to a primitive value.
    fn to_primitive(&self, cx: &ExecutionContext, value: &Value, hint: Hint) -> Result<Value, VmError>;

    /// `typeof` of an object value
    fn type_of(&self, value: &Value) -> &'static str {
        value.type_of()
    }

    /// The multiname a `QName` object stands for
    fn as_qname(&self, _value: &Value) -> Option<Rc<Multiname>> {
        None
    }

    /// The namespace a `Namespace` object stands for
    fn as_namespace(&self, _value: &Value) -> Option<Namespace> {
        None
    }

    /// Script value for a namespace constant
    fn namespace_value(&self, ns: &Namespace) -> Result<Value, VmError>;

    /// Whether a value can be applied
    fn is_callable(&self, value: &Value) -> bool;

    // ---- properties -------------------------------------------------------

    /// Read a property
    fn get_property(&self, cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<Value, VmError>;

    /// Write a property
    fn set_property(
        &self,
        cx: &ExecutionContext,
        receiver: &Value,
        name: &ResolvedName,
        value: Value,
    ) -> Result<(), VmError>;

    /// Initialize a property; may write constants
    fn init_property(
        &self,
        cx: &ExecutionContext,
        receiver: &Value,
        name: &ResolvedName,
        value: Value,
    ) -> Result<(), VmError> {
        self.set_property(cx, receiver, name, value)
    }

    /// Delete a property
    fn delete_property(&self, cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<bool, VmError>;

    /// Whether a property exists
    fn has_property(&self, cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<bool, VmError>;

    /// Call a property. With `is_lex` the callee receives a null receiver.
    fn call_property(
        &self,
        cx: &ExecutionContext,
        receiver: &Value,
        name: &ResolvedName,
        args: &[Value],
        is_lex: bool,
    ) -> Result<Value, VmError>;

    /// Construct the value of a property
    fn construct_property(
        &self,
        cx: &ExecutionContext,
        receiver: &Value,
        name: &ResolvedName,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let class = self.get_property(cx, receiver, name)?;
        self.construct(cx, &class, args)
    }

    // ---- base class access ------------------------------------------------

    /// Read through the base class of the class owning `scope`
    fn get_super(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        receiver: &Value,
        name: &ResolvedName,
    ) -> Result<Value, VmError>;

    /// Write through the base class of the class owning `scope`
    fn set_super(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        receiver: &Value,
        name: &ResolvedName,
        value: Value,
    ) -> Result<(), VmError>;

    /// Call a base class method
    fn call_super(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        receiver: &Value,
        name: &ResolvedName,
        args: &[Value],
    ) -> Result<Value, VmError>;

    /// Run the base class constructor on `receiver`
    fn construct_super(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        receiver: &Value,
        args: &[Value],
    ) -> Result<(), VmError>;

    // ---- calls ------------------------------------------------------------

    /// Apply a function value
    fn apply(&self, cx: &ExecutionContext, callee: &Value, receiver: Value, args: &[Value]) -> Result<Value, VmError>;

    /// Construct an instance of a class or function value
    fn construct(&self, cx: &ExecutionContext, class: &Value, args: &[Value]) -> Result<Value, VmError>;

    /// Instantiate a parameterized type
    fn apply_type(&self, cx: &ExecutionContext, factory: &Value, args: &[Value]) -> Result<Value, VmError>;

    // ---- types ------------------------------------------------------------

    /// `value is class`
    fn is_type(&self, cx: &ExecutionContext, class: &Value, value: &Value) -> Result<bool, VmError>;

    /// `value as class`
    fn as_type(&self, cx: &ExecutionContext, class: &Value, value: &Value) -> Result<Value, VmError> {
        if self.is_type(cx, class, value)? {
            Ok(value.clone())
        } else {
            Ok(Value::Null)
        }
    }

    /// `value instanceof class`
    fn is_instance_of(&self, cx: &ExecutionContext, class: &Value, value: &Value) -> Result<bool, VmError>;

    /// Coerce a value to a class
    fn coerce(&self, cx: &ExecutionContext, class: &Value, value: Value) -> Result<Value, VmError>;

    /// Class registered under a type name, if any
    fn get_class(&self, cx: &ExecutionContext, name: &Multiname) -> Result<Option<Value>, VmError>;

    // ---- scope lookup -----------------------------------------------------

    /// Innermost scope object that has `name`.
    ///
    /// When nothing has it, strict lookups fail with
    /// [`Fault::PropertyNotFound`] and non-strict ones return the global
    /// object. With `stop_at_with` the search ends at the first `with` scope.
    fn find_scope_property(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        name: &ResolvedName,
        strict: bool,
        stop_at_with: bool,
    ) -> Result<Value, VmError>;

    /// Read `name` from the scope object that has it
    fn get_scope_property(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        name: &ResolvedName,
        strict: bool,
        stop_at_with: bool,
    ) -> Result<Value, VmError> {
        let object = self.find_scope_property(cx, scope, name, strict, stop_at_with)?;
        self.get_property(cx, &object, name)
    }

    // ---- creation ---------------------------------------------------------

    /// Activation object for a method that requested one
    fn create_activation(&self, cx: &ExecutionContext, method: &Rc<MethodInfo>, scope: &Rc<Scope>) -> Result<Value, VmError>;

    /// Scope object for a catch block
    fn create_catch(&self, cx: &ExecutionContext, info: &ExceptionInfo, scope: &Rc<Scope>) -> Result<Value, VmError>;

    /// Create a class; `base` is the base class object or `null`
    fn create_class(
        &self,
        cx: &ExecutionContext,
        abc: &Rc<AbcFile>,
        class: &Rc<ClassInfo>,
        base: &Value,
        scope: &Rc<Scope>,
    ) -> Result<Value, VmError>;

    /// Create a closure over `scope`
    fn create_function(&self, cx: &ExecutionContext, method: &Rc<MethodInfo>, scope: &Rc<Scope>) -> Result<Value, VmError>;

    /// Array holding exactly `values`
    fn create_array_unsafe(&self, values: Vec<Value>) -> Value;

    /// Empty plain object
    fn create_object(&self) -> Value;

    /// Define a public property keyed by an arbitrary value
    fn set_public_property(&self, cx: &ExecutionContext, object: &Value, key: &Value, value: Value) -> Result<(), VmError>;

    /// Script error object of the given kind
    fn create_error(&self, kind: ErrorKind, code: u32, args: &[String]) -> Value;

    // ---- slots ------------------------------------------------------------

    /// Read a slot (1-based)
    fn get_slot(&self, cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError>;

    /// Write a slot (1-based)
    fn set_slot(&self, cx: &ExecutionContext, object: &Value, index: u32, value: Value) -> Result<(), VmError>;

    // ---- enumeration ------------------------------------------------------

    /// Index after `index`, or 0 when enumeration is done
    fn has_next(&self, cx: &ExecutionContext, object: &Value, index: u32) -> Result<u32, VmError>;

    /// `HASNEXT2` step: the object to continue with and the next index
    fn has_next2(&self, cx: &ExecutionContext, object: &Value, index: u32) -> Result<(Value, u32), VmError> {
        let next = self.has_next(cx, object, index)?;
        if next == 0 {
            Ok((Value::Null, 0))
        } else {
            Ok((object.clone(), next))
        }
    }

    /// Name at an enumeration index
    fn next_name(&self, cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError>;

    /// Value at an enumeration index
    fn next_value(&self, cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError>;
}
