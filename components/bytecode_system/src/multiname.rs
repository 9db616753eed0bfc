//! Namespaces, multinames and resolved names
//!
//! A [`Multiname`] is the static descriptor stored in the constant pool. Its
//! name and/or namespace may be missing, in which case they are popped from
//! the operand stack at the use site and the result is written into a
//! [`ResolvedName`].

use std::fmt;
use std::rc::Rc;

use core_types::Value;

/// Namespace kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Plain namespace (`namespace ns = "..."`)
    Namespace,
    /// Package public
    Public,
    /// Package internal
    PackageInternal,
    /// Protected
    Protected,
    /// Explicit package namespace
    Explicit,
    /// Static protected
    StaticProtected,
    /// Private
    Private,
}

/// A namespace: kind plus URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Namespace kind
    pub kind: NamespaceKind,
    /// Namespace URI
    pub uri: Rc<str>,
}

impl Namespace {
    /// Create a namespace
    pub fn new(kind: NamespaceKind, uri: impl Into<Rc<str>>) -> Self {
        Self {
            kind,
            uri: uri.into(),
        }
    }

    /// The unnamed public namespace
    pub fn public() -> Self {
        Self::new(NamespaceKind::Public, "")
    }

    /// Whether this is a public namespace
    pub fn is_public(&self) -> bool {
        self.kind == NamespaceKind::Public
    }
}

/// Multiname kinds as they appear in the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultinameKind {
    /// Static name, static namespace
    QName,
    /// Attribute form of `QName`
    QNameA,
    /// Static name, runtime namespace
    RTQName,
    /// Attribute form of `RTQName`
    RTQNameA,
    /// Runtime name and namespace
    RTQNameL,
    /// Attribute form of `RTQNameL`
    RTQNameLA,
    /// Static name, namespace set
    Multiname,
    /// Attribute form of `Multiname`
    MultinameA,
    /// Runtime name, namespace set
    MultinameL,
    /// Attribute form of `MultinameL`
    MultinameLA,
    /// Parameterized type name (`Vector.<T>`)
    TypeName,
}

/// Name descriptor from the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiname {
    /// Pool index
    pub id: u32,
    /// Descriptor kind
    pub kind: MultinameKind,
    /// Static name; `None` is the any-name `*` or a runtime name
    pub name: Option<Rc<str>>,
    /// Static namespace set
    pub namespaces: Rc<[Namespace]>,
    /// Type parameters of a `TypeName`
    pub type_parameters: Vec<Rc<Multiname>>,
}

impl Multiname {
    /// Public qualified name
    ///
    /// ```
    /// use bytecode_system::Multiname;
    ///
    /// let mn = Multiname::public_qname("x");
    /// assert!(!mn.is_runtime());
    /// assert_eq!(mn.to_string(), "x");
    /// ```
    pub fn public_qname(name: impl Into<Rc<str>>) -> Self {
        Self::qname(Namespace::public(), name)
    }

    /// Qualified name in a single namespace
    pub fn qname(ns: Namespace, name: impl Into<Rc<str>>) -> Self {
        Self {
            id: 0,
            kind: MultinameKind::QName,
            name: Some(name.into()),
            namespaces: Rc::from(vec![ns]),
            type_parameters: Vec::new(),
        }
    }

    /// Descriptor of the given kind with no static parts
    pub fn runtime(kind: MultinameKind, name: Option<Rc<str>>, namespaces: Vec<Namespace>) -> Self {
        Self {
            id: 0,
            kind,
            name,
            namespaces: Rc::from(namespaces),
            type_parameters: Vec::new(),
        }
    }

    /// Whether the name is popped from the stack
    pub fn is_runtime_name(&self) -> bool {
        matches!(
            self.kind,
            MultinameKind::RTQNameL
                | MultinameKind::RTQNameLA
                | MultinameKind::MultinameL
                | MultinameKind::MultinameLA
        )
    }

    /// Whether the namespace is popped from the stack
    pub fn is_runtime_namespace(&self) -> bool {
        matches!(
            self.kind,
            MultinameKind::RTQName
                | MultinameKind::RTQNameA
                | MultinameKind::RTQNameL
                | MultinameKind::RTQNameLA
        )
    }

    /// Whether any part is resolved at runtime
    pub fn is_runtime(&self) -> bool {
        self.is_runtime_name() || self.is_runtime_namespace()
    }

    /// Number of stack values the runtime parts consume
    pub fn runtime_arity(&self) -> usize {
        self.is_runtime_name() as usize + self.is_runtime_namespace() as usize
    }

    /// Whether this names an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(
            self.kind,
            MultinameKind::QNameA
                | MultinameKind::RTQNameA
                | MultinameKind::RTQNameLA
                | MultinameKind::MultinameA
                | MultinameKind::MultinameLA
        )
    }

    /// Whether the static name is `*`
    pub fn is_any_name(&self) -> bool {
        self.name.is_none() && !self.is_runtime_name()
    }

    /// Whether a public namespace is in the set
    pub fn has_public_namespace(&self) -> bool {
        self.namespaces.iter().any(Namespace::is_public)
    }
}

impl fmt::Display for Multiname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qualifier = match self.namespaces.first() {
            Some(ns) if self.namespaces.len() == 1 && !ns.uri.is_empty() => Some(&ns.uri),
            _ => None,
        };
        if let Some(uri) = qualifier {
            write!(f, "{}::", uri)?;
        }
        match &self.name {
            Some(name) => f.write_str(name)?,
            None => f.write_str("*")?,
        }
        if !self.type_parameters.is_empty() {
            f.write_str(".<")?;
            for (i, param) in self.type_parameters.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", param)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// A multiname with its runtime parts filled in.
///
/// One record is reused for every name-based instruction of a frame; its
/// contents are only valid while one instruction executes.
#[derive(Debug, Clone)]
pub struct ResolvedName {
    /// Pool index of the originating descriptor
    pub id: u32,
    /// Kind of the originating descriptor
    pub kind: MultinameKind,
    /// The name (a string for static names, any value for runtime names)
    pub name: Value,
    /// Namespace set
    pub namespaces: Rc<[Namespace]>,
    /// Whether `name` is a number or numeric string
    pub numeric: bool,
    /// Parsed number when `numeric` is set
    pub numeric_value: f64,
}

impl Default for ResolvedName {
    fn default() -> Self {
        Self {
            id: 0,
            kind: MultinameKind::QName,
            name: Value::Undefined,
            namespaces: Rc::from(Vec::new()),
            numeric: false,
            numeric_value: 0.0,
        }
    }
}

impl ResolvedName {
    /// Resolve a descriptor with no runtime parts.
    pub fn from_static(mn: &Multiname) -> Self {
        let mut rn = Self::default();
        rn.reset(mn);
        rn
    }

    /// Overwrite with the static parts of a descriptor.
    pub fn reset(&mut self, mn: &Multiname) {
        self.id = mn.id;
        self.kind = mn.kind;
        self.name = match &mn.name {
            Some(name) => Value::String(Rc::clone(name)),
            None => Value::Undefined,
        };
        self.namespaces = Rc::clone(&mn.namespaces);
        self.numeric = false;
        self.numeric_value = 0.0;
    }

    /// Name as a string, for diagnostics and string-keyed lookups.
    pub fn name_string(&self) -> String {
        match &self.name {
            Value::Undefined => "*".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether a public namespace is in the set
    pub fn has_public_namespace(&self) -> bool {
        self.namespaces.iter().any(Namespace::is_public)
    }

    /// Whether this names an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(
            self.kind,
            MultinameKind::QNameA
                | MultinameKind::RTQNameA
                | MultinameKind::RTQNameLA
                | MultinameKind::MultinameA
                | MultinameKind::MultinameLA
        )
    }
}
