//! Script value representation.
//!
//! Primitive values are stored inline; objects are opaque handles owned by
//! whatever object model the engine is running against.

use std::fmt;
use std::rc::Rc;

use crate::convert;

/// Opaque handle to an object owned by the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Represents any AVM2 value.
///
/// The three numeric variants mirror the AVM2 numeric types (`int`, `uint`
/// and `Number`). They are interchangeable as far as comparisons go: equality
/// is numeric across variants.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let undefined = Value::Undefined;
/// let number = Value::Int(42);
/// let float = Value::Number(3.14);
///
/// assert!(!undefined.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(float.type_of(), "number");
/// assert_eq!(Value::UInt(42), number);
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// The `undefined` value
    #[default]
    Undefined,
    /// The `null` value
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// Signed 32-bit integer (`int`)
    Int(i32),
    /// Unsigned 32-bit integer (`uint`)
    UInt(u32),
    /// IEEE 754 double (`Number`)
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Object handle
    Object(ObjectId),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::UInt(n) => f.debug_tuple("UInt").field(n).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(&&**s).finish(),
            Value::Object(id) => f.debug_tuple("Object").field(&id.0).finish(),
        }
    }
}

/// Strict equality (`===`).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Value {
    /// Build a numeric value, preferring `Int` when the number is integral.
    ///
    /// Negative zero stays a `Number` so its sign survives.
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(matches!(Value::number(5.0), Value::Int(5)));
    /// assert!(matches!(Value::number(0.5), Value::Number(_)));
    /// assert!(matches!(Value::number(-0.0), Value::Number(_)));
    /// ```
    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Int(n as i32)
        } else {
            Value::Number(n)
        }
    }

    /// Build a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    /// Returns whether this value is truthy.
    ///
    /// `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy; every
    /// object is truthy.
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(!Value::Undefined.is_truthy());
    /// assert!(!Value::Number(f64::NAN).is_truthy());
    /// assert!(!Value::string("").is_truthy());
    /// assert!(Value::Int(-1).is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int(n) => *n != 0,
            Value::UInt(n) => *n != 0,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Returns the `typeof` result for primitive values.
    ///
    /// Objects report `"object"` here; the object model refines that into
    /// `"function"` where it applies.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Int(_) | Value::UInt(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }

    /// Numeric payload of an `Int`, `UInt` or `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether this is one of the numeric variants.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Number(_))
    }

    /// Whether this is `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Object handle, if this is an object.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// String payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(id) => write!(f, "[object #{}]", id.0),
            primitive => f.write_str(&convert::primitive_to_string(primitive)),
        }
    }
}
