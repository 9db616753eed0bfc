//! Reference object model
//!
//! A small arena of script objects implementing [`ObjectModel`]: plain
//! objects with a class-based prototype chain, arrays, closures, native
//! functions, classes, namespaces and error objects. Embedders with their
//! own object model implement the trait instead; the engine never depends on
//! this module.
//!
//! Properties are keyed by local name; namespaces are not distinguished.
//! Objects are never freed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bytecode_system::{AbcFile, ClassInfo, ExceptionInfo, MethodInfo, Multiname, Namespace, ResolvedName};
use core_types::{convert, error_codes, ErrorKind, Fault, ObjectId, Value, VmError};

use crate::context::ExecutionContext;
use crate::host::{Hint, ObjectModel};
use crate::operations;
use crate::scope::Scope;

/// Native function: `(context, receiver, arguments)`
pub type NativeFn = Rc<dyn Fn(&ExecutionContext, &Value, &[Value]) -> Result<Value, VmError>>;

/// Behaviour family of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// `Object`
    Object,
    /// `Function`
    Function,
    /// `Array`
    Array,
    /// `Number`
    Number,
    /// `int`
    Int,
    /// `uint`
    UInt,
    /// `String`
    String,
    /// `Boolean`
    Boolean,
    /// `Namespace`
    Namespace,
    /// `Error` and its subclasses
    Error,
    /// Classes created by `NEWCLASS` or [`ObjectHeap::define_class`]
    Script,
}

#[derive(Clone)]
struct ClassData {
    name: Rc<str>,
    kind: ClassKind,
    base: Option<ObjectId>,
    prototype: ObjectId,
    sealed: bool,
    constructor: Option<(Rc<MethodInfo>, Rc<Scope>)>,
}

enum Kind {
    Plain,
    Array(Vec<Value>),
    Function { method: Rc<MethodInfo>, scope: Rc<Scope> },
    Native(NativeFn),
    Class(ClassData),
    Namespace(Namespace),
    QName(Rc<Multiname>),
}

struct HeapObject {
    kind: Kind,
    class: Option<ObjectId>,
    properties: Vec<(Rc<str>, Value)>,
    read_only: Vec<Rc<str>>,
    slots: Vec<Value>,
}

impl HeapObject {
    fn new(kind: Kind, class: Option<ObjectId>) -> Self {
        Self {
            kind,
            class,
            properties: Vec::new(),
            read_only: Vec::new(),
            slots: Vec::new(),
        }
    }

    fn own(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(name, _)| &**name == key)
            .map(|(_, value)| value)
    }

    fn put(&mut self, key: Rc<str>, value: Value) {
        match self.properties.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key, value)),
        }
    }
}

enum Callable {
    Function(Rc<MethodInfo>, Rc<Scope>),
    Native(NativeFn),
    Class(ObjectId),
    None,
}

fn key_of(rn: &ResolvedName) -> Rc<str> {
    match &rn.name {
        Value::String(s) => Rc::clone(s),
        _ => Rc::from(rn.name_string()),
    }
}

fn index_of(rn: &ResolvedName) -> Option<usize> {
    let n = rn.numeric_value;
    if rn.numeric && n >= 0.0 && n.fract() == 0.0 && n < u32::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

fn dangling(id: ObjectId) -> VmError {
    Fault::Internal(format!("dangling object reference {}", id.0)).into()
}

/// Arena-backed [`ObjectModel`]
pub struct ObjectHeap {
    objects: RefCell<Vec<HeapObject>>,
    classes: RefCell<HashMap<Rc<str>, ObjectId>>,
    builtins: RefCell<HashMap<ClassKind, ObjectId>>,
    global: ObjectId,
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("objects", &self.objects.borrow().len())
            .field("classes", &self.classes.borrow().len())
            .finish()
    }
}

impl ObjectHeap {
    /// Heap with a global object and the builtin classes defined on it
    pub fn new() -> Self {
        let heap = Self {
            objects: RefCell::new(vec![HeapObject::new(Kind::Plain, None)]),
            classes: RefCell::new(HashMap::new()),
            builtins: RefCell::new(HashMap::new()),
            global: ObjectId(0),
        };
        let object = heap.alloc_class("Object", ClassKind::Object, None, false);
        for (name, kind) in [
            ("Function", ClassKind::Function),
            ("Array", ClassKind::Array),
            ("Number", ClassKind::Number),
            ("int", ClassKind::Int),
            ("uint", ClassKind::UInt),
            ("String", ClassKind::String),
            ("Boolean", ClassKind::Boolean),
            ("Namespace", ClassKind::Namespace),
        ] {
            heap.alloc_class(name, kind, Some(object), true);
        }
        let error = heap.alloc_class("Error", ClassKind::Error, Some(object), false);
        for kind in [
            ErrorKind::VerifyError,
            ErrorKind::TypeError,
            ErrorKind::ReferenceError,
            ErrorKind::RangeError,
            ErrorKind::ArgumentError,
        ] {
            heap.alloc_class(kind.class_name(), ClassKind::Error, Some(error), false);
        }
        heap
    }

    fn alloc(&self, object: HeapObject) -> ObjectId {
        let mut objects = self.objects.borrow_mut();
        objects.push(object);
        ObjectId(objects.len() - 1)
    }

    fn alloc_class(&self, name: &str, kind: ClassKind, base: Option<ObjectId>, sealed: bool) -> ObjectId {
        let prototype = self.alloc(HeapObject::new(Kind::Plain, None));
        let name: Rc<str> = Rc::from(name);
        let class = self.alloc(HeapObject::new(
            Kind::Class(ClassData {
                name: Rc::clone(&name),
                kind,
                base,
                prototype,
                sealed,
                constructor: None,
            }),
            None,
        ));
        self.register_class(&name, class);
        if kind != ClassKind::Script {
            self.builtins.borrow_mut().entry(kind).or_insert(class);
        }
        class
    }

    fn register_class(&self, name: &Rc<str>, class: ObjectId) {
        self.classes.borrow_mut().insert(Rc::clone(name), class);
        self.put(self.global, Rc::clone(name), Value::Object(class));
    }

    fn builtin(&self, kind: ClassKind) -> Option<ObjectId> {
        self.builtins.borrow().get(&kind).copied()
    }

    fn with<R>(&self, id: ObjectId, f: impl FnOnce(&HeapObject) -> R) -> Result<R, VmError> {
        let objects = self.objects.borrow();
        objects.get(id.0).map(f).ok_or_else(|| dangling(id))
    }

    fn with_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut HeapObject) -> R) -> Result<R, VmError> {
        let mut objects = self.objects.borrow_mut();
        objects.get_mut(id.0).map(f).ok_or_else(|| dangling(id))
    }

    fn put(&self, id: ObjectId, key: Rc<str>, value: Value) {
        if let Some(object) = self.objects.borrow_mut().get_mut(id.0) {
            object.put(key, value);
        }
    }

    fn class_data(&self, id: ObjectId) -> Option<ClassData> {
        match &self.objects.borrow().get(id.0)?.kind {
            Kind::Class(data) => Some(data.clone()),
            _ => None,
        }
    }

    fn class_of_value(&self, value: &Value) -> Option<ObjectId> {
        match value {
            Value::Object(id) => self.objects.borrow().get(id.0)?.class,
            Value::Int(_) => self.builtin(ClassKind::Int),
            Value::UInt(_) => self.builtin(ClassKind::UInt),
            Value::Number(_) => self.builtin(ClassKind::Number),
            Value::String(_) => self.builtin(ClassKind::String),
            Value::Boolean(_) => self.builtin(ClassKind::Boolean),
            Value::Null | Value::Undefined => None,
        }
    }

    /// Walk the class chain starting at `class`, looking in each prototype
    fn lookup_in_classes(&self, mut class: Option<ObjectId>, key: &str) -> Option<Value> {
        let objects = self.objects.borrow();
        while let Some(id) = class {
            let Kind::Class(data) = &objects.get(id.0)?.kind else {
                return None;
            };
            if let Some(value) = objects.get(data.prototype.0).and_then(|proto| proto.own(key)) {
                return Some(value.clone());
            }
            class = data.base;
        }
        None
    }

    fn lookup(&self, value: &Value, key: &str) -> Option<Value> {
        if let Value::Object(id) = value {
            let objects = self.objects.borrow();
            let object = objects.get(id.0)?;
            if let Some(found) = object.own(key) {
                return Some(found.clone());
            }
            match &object.kind {
                Kind::Array(values) if key == "length" => return Some(Value::UInt(values.len() as u32)),
                Kind::Class(data) if key == "prototype" => return Some(Value::Object(data.prototype)),
                _ => {}
            }
        }
        if let Value::String(s) = value {
            if key == "length" {
                return Some(Value::Int(s.encode_utf16().count() as i32));
            }
        }
        self.lookup_in_classes(self.class_of_value(value), key)
    }

    fn array_get(&self, id: ObjectId, index: usize) -> Option<Option<Value>> {
        match &self.objects.borrow().get(id.0)?.kind {
            Kind::Array(values) => Some(values.get(index).cloned()),
            _ => None,
        }
    }

    fn sealed_class_name(&self, value: &Value) -> Option<Rc<str>> {
        let class = self.class_of_value(value)?;
        let data = self.class_data(class)?;
        data.sealed.then_some(data.name)
    }

    fn class_name_of_value(&self, value: &Value) -> Rc<str> {
        self.class_of_value(value)
            .and_then(|class| self.class_data(class))
            .map(|data| data.name)
            .unwrap_or_else(|| Rc::from(value.type_of()))
    }

    fn callable(&self, value: &Value) -> Callable {
        let Value::Object(id) = value else {
            return Callable::None;
        };
        match self.objects.borrow().get(id.0).map(|o| &o.kind) {
            Some(Kind::Function { method, scope }) => Callable::Function(Rc::clone(method), Rc::clone(scope)),
            Some(Kind::Native(f)) => Callable::Native(Rc::clone(f)),
            Some(Kind::Class(_)) => Callable::Class(*id),
            _ => Callable::None,
        }
    }

    fn as_class(&self, value: &Value) -> Result<(ObjectId, ClassData), VmError> {
        match value {
            Value::Object(id) => self
                .class_data(*id)
                .map(|data| (*id, data))
                .ok_or_else(|| Fault::NotAClass.into()),
            _ => Err(Fault::NotAClass.into()),
        }
    }

    /// Whether `class` is `ancestor` or derives from it
    fn derives_from(&self, mut class: Option<ObjectId>, ancestor: ObjectId) -> bool {
        while let Some(id) = class {
            if id == ancestor {
                return true;
            }
            class = self.class_data(id).and_then(|data| data.base);
        }
        false
    }

    fn enclosing_class(&self, scope: &Scope) -> Result<ObjectId, VmError> {
        scope
            .ancestors()
            .find_map(|s| match s.object() {
                Value::Object(id) if self.class_data(*id).is_some() => Some(*id),
                _ => None,
            })
            .ok_or_else(|| Fault::Internal("super access outside of a class".into()).into())
    }

    fn enumerable_keys(&self, value: &Value) -> Vec<Value> {
        let Value::Object(id) = value else {
            return Vec::new();
        };
        let objects = self.objects.borrow();
        let Some(object) = objects.get(id.0) else {
            return Vec::new();
        };
        let mut keys = Vec::new();
        if let Kind::Array(values) = &object.kind {
            keys.extend((0..values.len()).map(|i| Value::Int(i as i32)));
        }
        keys.extend(object.properties.iter().map(|(name, _)| Value::String(Rc::clone(name))));
        keys
    }

    fn init_error_fields(&self, cx: &ExecutionContext, instance: &Value, args: &[Value]) -> Result<(), VmError> {
        let Value::Object(id) = instance else {
            return Ok(());
        };
        let message = match args.first() {
            Some(value) if !value.is_nullish() => operations::to_string(cx, value)?,
            _ => Rc::from(""),
        };
        let code = match args.get(1) {
            Some(value) => operations::to_int32(cx, value)?,
            None => 0,
        };
        let name = self.class_name_of_value(instance);
        self.with_mut(*id, |object| {
            object.put("message".into(), Value::String(message));
            object.put("errorID".into(), Value::Int(code));
            object.put("name".into(), Value::String(name));
        })
    }

    /// Run the instance initializer of `class` (or the nearest ancestor
    /// that has one) on `instance`.
    fn run_initializer(&self, cx: &ExecutionContext, class: ObjectId, instance: &Value, args: &[Value]) -> Result<(), VmError> {
        let Some(data) = self.class_data(class) else {
            return Err(Fault::NotAClass.into());
        };
        if let Some((method, scope)) = data.constructor {
            cx.invoke(&method, &scope, instance.clone(), args)?;
            return Ok(());
        }
        match (data.kind, data.base) {
            (ClassKind::Error, _) if self.builtin(ClassKind::Error) == Some(class) || data.base.is_none() => {
                self.init_error_fields(cx, instance, args)
            }
            (_, Some(base)) => self.run_initializer(cx, base, instance, args),
            _ => Ok(()),
        }
    }

    fn construct_instance(&self, cx: &ExecutionContext, class: ObjectId, data: &ClassData, args: &[Value]) -> Result<Value, VmError> {
        match data.kind {
            ClassKind::Object => Ok(self.create_object()),
            ClassKind::Array => Ok(match args {
                [len] if len.is_number() => {
                    let len = operations::to_uint32(cx, len)? as usize;
                    self.create_array_unsafe(vec![Value::Undefined; len])
                }
                _ => self.create_array_unsafe(args.to_vec()),
            }),
            ClassKind::Number
            | ClassKind::Int
            | ClassKind::UInt
            | ClassKind::String
            | ClassKind::Boolean => {
                let class_value = Value::Object(class);
                let seed = args.first().cloned().unwrap_or(match data.kind {
                    ClassKind::String => Value::string(""),
                    ClassKind::Boolean => Value::Boolean(false),
                    _ => Value::Int(0),
                });
                self.coerce(cx, &class_value, seed)
            }
            ClassKind::Function | ClassKind::Namespace => Err(Fault::NotConstructor.into()),
            ClassKind::Error | ClassKind::Script => {
                let instance = Value::Object(self.alloc(HeapObject::new(Kind::Plain, Some(class))));
                if data.kind == ClassKind::Error {
                    self.init_error_fields(cx, &instance, args)?;
                }
                self.run_initializer(cx, class, &instance, args)?;
                Ok(instance)
            }
        }
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::Object(_) => self.class_name_of_value(value).to_string(),
            other => convert::primitive_to_string(other).to_string(),
        }
    }

    fn coercion_failed(&self, value: &Value, class: &ClassData) -> VmError {
        VmError::Throw(self.create_error(
            ErrorKind::TypeError,
            error_codes::CHECK_TYPE_FAILED,
            &[self.describe(value), class.name.to_string()],
        ))
    }

    fn call_method(&self, cx: &ExecutionContext, object: &Value, key: &str) -> Result<Option<Value>, VmError> {
        match self.lookup(object, key) {
            Some(f) if self.is_callable(&f) => self.apply(cx, &f, object.clone(), &[]).map(Some),
            _ => Ok(None),
        }
    }

    // ---- embedding API ----------------------------------------------------

    /// The global object
    pub fn global(&self) -> Value {
        Value::Object(self.global)
    }

    /// Define or overwrite a global property
    pub fn define_global(&self, name: &str, value: Value) {
        self.put(self.global, Rc::from(name), value);
    }

    /// Wrap a Rust closure as a script function
    pub fn native(&self, f: impl Fn(&ExecutionContext, &Value, &[Value]) -> Result<Value, VmError> + 'static) -> Value {
        let class = self.builtin(ClassKind::Function);
        Value::Object(self.alloc(HeapObject::new(Kind::Native(Rc::new(f)), class)))
    }

    /// Define a native function on the global object
    pub fn define_native(
        &self,
        name: &str,
        f: impl Fn(&ExecutionContext, &Value, &[Value]) -> Result<Value, VmError> + 'static,
    ) -> Value {
        let function = self.native(f);
        self.define_global(name, function.clone());
        function
    }

    /// Property of an object, searching the class chain
    pub fn get(&self, object: &Value, name: &str) -> Option<Value> {
        if let (Value::Object(id), Some(index)) = (object, convert::parse_numeric_name(name)) {
            if let Some(element) = self.array_get(*id, index as usize) {
                return element;
            }
        }
        self.lookup(object, name)
    }

    /// Set an own property, bypassing sealing and read-only checks
    pub fn set(&self, object: &Value, name: &str, value: Value) {
        if let Value::Object(id) = object {
            self.put(*id, Rc::from(name), value);
        }
    }

    /// Define a read-only property
    pub fn define_constant(&self, object: &Value, name: &str, value: Value) {
        if let Value::Object(id) = object {
            let key: Rc<str> = Rc::from(name);
            let _ = self.with_mut(*id, |o| {
                o.put(Rc::clone(&key), value);
                o.read_only.push(key);
            });
        }
    }

    /// Elements of an array
    pub fn array_elements(&self, value: &Value) -> Option<Vec<Value>> {
        let Value::Object(id) = value else {
            return None;
        };
        match &self.objects.borrow().get(id.0)?.kind {
            Kind::Array(values) => Some(values.clone()),
            _ => None,
        }
    }

    /// Define a class without bytecode initializers
    pub fn define_class(&self, name: &str, base: Option<&Value>, sealed: bool) -> Value {
        let base = match base {
            Some(Value::Object(id)) => Some(*id),
            _ => self.builtin(ClassKind::Object),
        };
        let kind = match base.and_then(|b| self.class_data(b)) {
            Some(data) if data.kind == ClassKind::Error => ClassKind::Error,
            _ => ClassKind::Script,
        };
        Value::Object(self.alloc_class(name, kind, base, sealed))
    }

    /// Class registered under `name`
    pub fn class(&self, name: &str) -> Option<Value> {
        self.classes.borrow().get(name).map(|id| Value::Object(*id))
    }

    /// Name of the class of `value`
    pub fn class_name(&self, value: &Value) -> Option<Rc<str>> {
        let class = self.class_of_value(value)?;
        self.class_data(class).map(|data| data.name)
    }

    /// `errorID` of an error object
    pub fn error_code(&self, value: &Value) -> Option<u32> {
        match self.get(value, "errorID")? {
            Value::Int(code) => u32::try_from(code).ok(),
            other => other.as_number().map(|n| n as u32),
        }
    }

    /// Whether `value` is an error object of exactly `kind`
    pub fn is_error(&self, value: &Value, kind: ErrorKind) -> bool {
        self.class_name(value).as_deref() == Some(kind.class_name())
    }

    /// A `QName` object for `mn`
    pub fn qname(&self, mn: Multiname) -> Value {
        Value::Object(self.alloc(HeapObject::new(Kind::QName(Rc::new(mn)), None)))
    }

    /// Number of objects allocated so far
    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }
}

impl ObjectModel for ObjectHeap {
    fn to_primitive(&self, cx: &ExecutionContext, value: &Value, hint: Hint) -> Result<Value, VmError> {
        let Value::Object(id) = value else {
            return Ok(value.clone());
        };
        enum Shape {
            Array(Vec<Value>),
            Text(String),
            Plain,
        }
        let shape = self.with(*id, |object| match &object.kind {
            Kind::Array(values) => Shape::Array(values.clone()),
            Kind::Function { .. } | Kind::Native(_) => Shape::Text("function Function() {}".into()),
            Kind::Class(data) => Shape::Text(format!("[class {}]", data.name)),
            Kind::Namespace(ns) => Shape::Text(ns.uri.to_string()),
            Kind::QName(mn) => Shape::Text(mn.to_string()),
            Kind::Plain => Shape::Plain,
        })?;
        match shape {
            Shape::Array(values) => {
                let mut parts = Vec::with_capacity(values.len());
                for element in &values {
                    parts.push(if element.is_nullish() {
                        String::new()
                    } else {
                        operations::to_string(cx, element)?.to_string()
                    });
                }
                Ok(Value::string(parts.join(",")))
            }
            Shape::Text(text) => Ok(Value::string(text)),
            Shape::Plain => {
                let order = if hint == Hint::String {
                    ["toString", "valueOf"]
                } else {
                    ["valueOf", "toString"]
                };
                let mut attempted = false;
                for key in order {
                    if let Some(result) = self.call_method(cx, value, key)? {
                        attempted = true;
                        if !matches!(result, Value::Object(_)) {
                            return Ok(result);
                        }
                    }
                }
                if attempted {
                    return Err(Fault::ToPrimitive.into());
                }
                let class = self.class_of_value(value).and_then(|c| self.class_data(c));
                match class {
                    Some(data) if data.kind == ClassKind::Error => {
                        let message = self.get(value, "message").unwrap_or_default();
                        let message = operations::to_string(cx, &message)?;
                        if message.is_empty() {
                            Ok(Value::String(data.name))
                        } else {
                            Ok(Value::string(format!("{}: {}", data.name, message)))
                        }
                    }
                    Some(data) => Ok(Value::string(format!("[object {}]", data.name))),
                    None => Ok(Value::string("[object Object]")),
                }
            }
        }
    }

    fn type_of(&self, value: &Value) -> &'static str {
        match self.callable(value) {
            Callable::Function(..) | Callable::Native(_) => "function",
            _ => value.type_of(),
        }
    }

    fn as_qname(&self, value: &Value) -> Option<Rc<Multiname>> {
        let Value::Object(id) = value else {
            return None;
        };
        match &self.objects.borrow().get(id.0)?.kind {
            Kind::QName(mn) => Some(Rc::clone(mn)),
            _ => None,
        }
    }

    fn as_namespace(&self, value: &Value) -> Option<Namespace> {
        let Value::Object(id) = value else {
            return None;
        };
        match &self.objects.borrow().get(id.0)?.kind {
            Kind::Namespace(ns) => Some(ns.clone()),
            _ => None,
        }
    }

    fn namespace_value(&self, ns: &Namespace) -> Result<Value, VmError> {
        let class = self.builtin(ClassKind::Namespace);
        Ok(Value::Object(self.alloc(HeapObject::new(Kind::Namespace(ns.clone()), class))))
    }

    fn is_callable(&self, value: &Value) -> bool {
        !matches!(self.callable(value), Callable::None)
    }

    fn get_property(&self, _cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<Value, VmError> {
        if let (Value::Object(id), Some(index)) = (receiver, index_of(name)) {
            if let Some(element) = self.array_get(*id, index) {
                return Ok(element.unwrap_or_default());
            }
        }
        let key = key_of(name);
        if let Some(value) = self.lookup(receiver, &key) {
            return Ok(value);
        }
        match self.sealed_class_name(receiver) {
            Some(class) => Err(Fault::ReadSealed {
                name: key.to_string(),
                class: class.to_string(),
            }
            .into()),
            None => Ok(Value::Undefined),
        }
    }

    fn set_property(&self, _cx: &ExecutionContext, receiver: &Value, name: &ResolvedName, value: Value) -> Result<(), VmError> {
        let key = key_of(name);
        let Value::Object(id) = receiver else {
            return Err(Fault::WriteSealed {
                name: key.to_string(),
                class: self.class_name_of_value(receiver).to_string(),
            }
            .into());
        };
        let sealed = self.sealed_class_name(receiver);
        let index = index_of(name);
        self.with_mut(*id, |object| {
            if let (Kind::Array(values), Some(index)) = (&mut object.kind, index) {
                if index >= values.len() {
                    values.resize(index + 1, Value::Undefined);
                }
                values[index] = value;
                return Ok(());
            }
            if object.read_only.contains(&key) {
                return Err(Fault::ConstWrite {
                    name: key.to_string(),
                    class: sealed.as_deref().unwrap_or("Object").to_string(),
                }
                .into());
            }
            if object.own(&key).is_none() {
                if let Some(class) = sealed {
                    return Err(Fault::WriteSealed {
                        name: key.to_string(),
                        class: class.to_string(),
                    }
                    .into());
                }
            }
            object.put(key, value);
            Ok(())
        })?
    }

    fn init_property(&self, cx: &ExecutionContext, receiver: &Value, name: &ResolvedName, value: Value) -> Result<(), VmError> {
        let Value::Object(id) = receiver else {
            return self.set_property(cx, receiver, name, value);
        };
        let key = key_of(name);
        let writable_const = self.with(*id, |object| object.read_only.contains(&key))?;
        if writable_const {
            self.put(*id, key, value);
            Ok(())
        } else {
            self.set_property(cx, receiver, name, value)
        }
    }

    fn delete_property(&self, _cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<bool, VmError> {
        let Value::Object(id) = receiver else {
            return Ok(false);
        };
        let key = key_of(name);
        let index = index_of(name);
        self.with_mut(*id, |object| {
            if let (Kind::Array(values), Some(index)) = (&mut object.kind, index) {
                if let Some(slot) = values.get_mut(index) {
                    *slot = Value::Undefined;
                }
                return true;
            }
            if object.read_only.contains(&key) {
                return false;
            }
            object.properties.retain(|(k, _)| *k != key);
            true
        })
    }

    fn has_property(&self, _cx: &ExecutionContext, receiver: &Value, name: &ResolvedName) -> Result<bool, VmError> {
        if let (Value::Object(id), Some(index)) = (receiver, index_of(name)) {
            if let Some(element) = self.array_get(*id, index) {
                return Ok(element.is_some());
            }
        }
        Ok(self.lookup(receiver, &key_of(name)).is_some())
    }

    fn call_property(
        &self,
        cx: &ExecutionContext,
        receiver: &Value,
        name: &ResolvedName,
        args: &[Value],
        is_lex: bool,
    ) -> Result<Value, VmError> {
        if receiver.is_number() && key_of(name).as_ref() == "toString" {
            let radix = match args.first() {
                Some(radix) if !radix.is_nullish() => operations::to_int32(cx, radix)?,
                _ => 10,
            };
            let n = receiver.as_number().unwrap_or(f64::NAN);
            return Ok(Value::string(convert::to_radix_string(n, radix)?));
        }
        let callee = self.get_property(cx, receiver, name)?;
        if !self.is_callable(&callee) {
            return Err(Fault::NotCallable.into());
        }
        let this = if is_lex { Value::Null } else { receiver.clone() };
        self.apply(cx, &callee, this, args)
    }

    fn get_super(&self, _cx: &ExecutionContext, scope: &Rc<Scope>, receiver: &Value, name: &ResolvedName) -> Result<Value, VmError> {
        let class = self.enclosing_class(scope)?;
        let base = self.class_data(class).and_then(|data| data.base);
        let key = key_of(name);
        self.lookup_in_classes(base, &key).ok_or_else(|| {
            Fault::ReadSealed {
                name: key.to_string(),
                class: self.class_name_of_value(receiver).to_string(),
            }
            .into()
        })
    }

    fn set_super(
        &self,
        cx: &ExecutionContext,
        _scope: &Rc<Scope>,
        receiver: &Value,
        name: &ResolvedName,
        value: Value,
    ) -> Result<(), VmError> {
        self.set_property(cx, receiver, name, value)
    }

    fn call_super(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        receiver: &Value,
        name: &ResolvedName,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let callee = self.get_super(cx, scope, receiver, name)?;
        if !self.is_callable(&callee) {
            return Err(Fault::NotCallable.into());
        }
        self.apply(cx, &callee, receiver.clone(), args)
    }

    fn construct_super(&self, cx: &ExecutionContext, scope: &Rc<Scope>, receiver: &Value, args: &[Value]) -> Result<(), VmError> {
        let class = self.enclosing_class(scope)?;
        match self.class_data(class).and_then(|data| data.base) {
            Some(base) => self.run_initializer(cx, base, receiver, args),
            None => Ok(()),
        }
    }

    fn apply(&self, cx: &ExecutionContext, callee: &Value, receiver: Value, args: &[Value]) -> Result<Value, VmError> {
        match self.callable(callee) {
            Callable::Function(method, scope) => {
                let this = if receiver.is_nullish() {
                    scope.global_object().clone()
                } else {
                    receiver
                };
                cx.invoke(&method, &scope, this, args)
            }
            Callable::Native(f) => f(cx, &receiver, args),
            Callable::Class(_) => self.coerce(cx, callee, args.first().cloned().unwrap_or_default()),
            Callable::None => Err(Fault::NotCallable.into()),
        }
    }

    fn construct(&self, cx: &ExecutionContext, class: &Value, args: &[Value]) -> Result<Value, VmError> {
        match self.callable(class) {
            Callable::Class(id) => {
                let data = self.class_data(id).ok_or(Fault::NotConstructor)?;
                self.construct_instance(cx, id, &data, args)
            }
            Callable::Function(method, scope) => {
                let instance = self.create_object();
                let result = cx.invoke(&method, &scope, instance.clone(), args)?;
                Ok(if matches!(result, Value::Object(_)) { result } else { instance })
            }
            Callable::Native(_) | Callable::None => Err(Fault::NotConstructor.into()),
        }
    }

    fn apply_type(&self, _cx: &ExecutionContext, factory: &Value, _args: &[Value]) -> Result<Value, VmError> {
        self.as_class(factory)?;
        Ok(factory.clone())
    }

    fn is_type(&self, _cx: &ExecutionContext, class: &Value, value: &Value) -> Result<bool, VmError> {
        let (class_id, data) = self.as_class(class)?;
        Ok(match data.kind {
            ClassKind::Object => !value.is_nullish(),
            ClassKind::Number => value.is_number(),
            ClassKind::Int => match value {
                Value::Int(_) => true,
                Value::UInt(u) => *u <= i32::MAX as u32,
                Value::Number(n) => n.fract() == 0.0 && *n >= i32::MIN as f64 && *n <= i32::MAX as f64,
                _ => false,
            },
            ClassKind::UInt => match value {
                Value::UInt(_) => true,
                Value::Int(i) => *i >= 0,
                Value::Number(n) => n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64,
                _ => false,
            },
            ClassKind::String => matches!(value, Value::String(_)),
            ClassKind::Boolean => matches!(value, Value::Boolean(_)),
            ClassKind::Function => matches!(self.callable(value), Callable::Function(..) | Callable::Native(_)),
            ClassKind::Array => self.array_elements(value).is_some(),
            ClassKind::Namespace => self.as_namespace(value).is_some(),
            ClassKind::Error | ClassKind::Script => {
                matches!(value, Value::Object(_)) && self.derives_from(self.class_of_value(value), class_id)
            }
        })
    }

    fn is_instance_of(&self, cx: &ExecutionContext, class: &Value, value: &Value) -> Result<bool, VmError> {
        match self.callable(class) {
            Callable::Class(_) => self.is_type(cx, class, value),
            Callable::Function(..) | Callable::Native(_) => Ok(false),
            Callable::None => Err(Fault::NotAClass.into()),
        }
    }

    fn coerce(&self, cx: &ExecutionContext, class: &Value, value: Value) -> Result<Value, VmError> {
        let (_, data) = self.as_class(class)?;
        match data.kind {
            ClassKind::Object => Ok(if value == Value::Undefined { Value::Null } else { value }),
            ClassKind::Number => Ok(Value::Number(operations::to_number(cx, &value)?)),
            ClassKind::Int => Ok(Value::Int(operations::to_int32(cx, &value)?)),
            ClassKind::UInt => Ok(Value::UInt(operations::to_uint32(cx, &value)?)),
            ClassKind::Boolean => Ok(Value::Boolean(value.is_truthy())),
            ClassKind::String => {
                if value.is_nullish() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(operations::to_string(cx, &value)?))
                }
            }
            _ => {
                if value.is_nullish() {
                    Ok(Value::Null)
                } else if self.is_type(cx, class, &value)? {
                    Ok(value)
                } else {
                    Err(self.coercion_failed(&value, &data))
                }
            }
        }
    }

    fn get_class(&self, _cx: &ExecutionContext, name: &Multiname) -> Result<Option<Value>, VmError> {
        Ok(name.name.as_deref().and_then(|n| self.class(n)))
    }

    fn find_scope_property(
        &self,
        cx: &ExecutionContext,
        scope: &Rc<Scope>,
        name: &ResolvedName,
        strict: bool,
        stop_at_with: bool,
    ) -> Result<Value, VmError> {
        for link in scope.ancestors() {
            if !link.object().is_nullish() && self.has_property(cx, link.object(), name)? {
                return Ok(link.object().clone());
            }
            if stop_at_with && link.is_with() {
                break;
            }
        }
        if strict {
            Err(Fault::PropertyNotFound(name.name_string()).into())
        } else {
            Ok(scope.global_object().clone())
        }
    }

    fn create_activation(&self, _cx: &ExecutionContext, _method: &Rc<MethodInfo>, _scope: &Rc<Scope>) -> Result<Value, VmError> {
        Ok(Value::Object(self.alloc(HeapObject::new(Kind::Plain, None))))
    }

    fn create_catch(&self, _cx: &ExecutionContext, info: &ExceptionInfo, _scope: &Rc<Scope>) -> Result<Value, VmError> {
        let id = self.alloc(HeapObject::new(Kind::Plain, None));
        if let Some(var) = info.var_name.as_ref().and_then(|mn| mn.name.clone()) {
            self.put(id, var, Value::Undefined);
        }
        Ok(Value::Object(id))
    }

    fn create_class(
        &self,
        cx: &ExecutionContext,
        abc: &Rc<AbcFile>,
        class: &Rc<ClassInfo>,
        base: &Value,
        scope: &Rc<Scope>,
    ) -> Result<Value, VmError> {
        let (base, kind) = match base {
            Value::Null | Value::Undefined => (None, ClassKind::Script),
            other => {
                let (id, data) = self.as_class(other)?;
                if data.sealed && data.kind != ClassKind::Object && data.kind != ClassKind::Script {
                    return Err(Fault::NotAClass.into());
                }
                let kind = if data.kind == ClassKind::Error {
                    ClassKind::Error
                } else {
                    ClassKind::Script
                };
                (Some(id), kind)
            }
        };
        let name: Rc<str> = class.name.name.clone().unwrap_or_else(|| Rc::from("anonymous"));
        let initializer = Rc::clone(abc.method(class.instance_initializer)?);
        let class_initializer = match class.class_initializer {
            Some(index) => Some(Rc::clone(abc.method(index)?)),
            None => None,
        };

        let prototype = self.alloc(HeapObject::new(Kind::Plain, None));
        let id = self.alloc(HeapObject::new(Kind::Plain, None));
        let class_scope = scope.extend(Value::Object(id), false);
        self.with_mut(id, |object| {
            object.kind = Kind::Class(ClassData {
                name: Rc::clone(&name),
                kind,
                base,
                prototype,
                sealed: class.sealed,
                constructor: Some((initializer, Rc::clone(&class_scope))),
            });
        })?;
        self.register_class(&name, id);
        if let Some(method) = class_initializer {
            cx.invoke(&method, &class_scope, Value::Object(id), &[])?;
        }
        Ok(Value::Object(id))
    }

    fn create_function(&self, _cx: &ExecutionContext, method: &Rc<MethodInfo>, scope: &Rc<Scope>) -> Result<Value, VmError> {
        let class = self.builtin(ClassKind::Function);
        Ok(Value::Object(self.alloc(HeapObject::new(
            Kind::Function {
                method: Rc::clone(method),
                scope: Rc::clone(scope),
            },
            class,
        ))))
    }

    fn create_array_unsafe(&self, values: Vec<Value>) -> Value {
        let class = self.builtin(ClassKind::Array);
        Value::Object(self.alloc(HeapObject::new(Kind::Array(values), class)))
    }

    fn create_object(&self) -> Value {
        let class = self.builtin(ClassKind::Object);
        Value::Object(self.alloc(HeapObject::new(Kind::Plain, class)))
    }

    fn set_public_property(&self, cx: &ExecutionContext, object: &Value, key: &Value, value: Value) -> Result<(), VmError> {
        let Value::Object(id) = object else {
            return Err(Fault::NotAClass.into());
        };
        let key = operations::to_string(cx, key)?;
        self.put(*id, key, value);
        Ok(())
    }

    fn create_error(&self, kind: ErrorKind, code: u32, args: &[String]) -> Value {
        let class = self.class(kind.class_name()).and_then(|c| c.as_object());
        let id = self.alloc(HeapObject::new(Kind::Plain, class));
        self.put(id, "message".into(), Value::string(error_codes::format_message(code, args)));
        self.put(id, "errorID".into(), Value::Int(code as i32));
        self.put(id, "name".into(), Value::string(kind.class_name()));
        Value::Object(id)
    }

    fn get_slot(&self, _cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError> {
        let Value::Object(id) = object else {
            return Err(Fault::Verify(format!("slot {} read on a primitive", index)).into());
        };
        self.with(*id, |o| o.slots.get(index as usize).cloned().unwrap_or_default())
    }

    fn set_slot(&self, _cx: &ExecutionContext, object: &Value, index: u32, value: Value) -> Result<(), VmError> {
        let Value::Object(id) = object else {
            return Err(Fault::Verify(format!("slot {} write on a primitive", index)).into());
        };
        self.with_mut(*id, |o| {
            let index = index as usize;
            if index >= o.slots.len() {
                o.slots.resize(index + 1, Value::Undefined);
            }
            o.slots[index] = value;
        })
    }

    fn has_next(&self, _cx: &ExecutionContext, object: &Value, index: u32) -> Result<u32, VmError> {
        let count = self.enumerable_keys(object).len() as u32;
        Ok(if index < count { index + 1 } else { 0 })
    }

    fn next_name(&self, _cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError> {
        let keys = self.enumerable_keys(object);
        Ok(index
            .checked_sub(1)
            .and_then(|i| keys.get(i as usize).cloned())
            .unwrap_or_default())
    }

    fn next_value(&self, _cx: &ExecutionContext, object: &Value, index: u32) -> Result<Value, VmError> {
        let keys = self.enumerable_keys(object);
        let Some(key) = index.checked_sub(1).and_then(|i| keys.get(i as usize)) else {
            return Ok(Value::Undefined);
        };
        Ok(match key {
            Value::Int(i) => self.get(object, &i.to_string()).unwrap_or_default(),
            other => self.get(object, &convert::primitive_to_string(other)).unwrap_or_default(),
        })
    }
}
