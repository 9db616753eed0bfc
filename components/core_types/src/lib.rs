//! Core AVM2 value types, numeric coercions and error handling.
//!
//! This crate provides the foundational types shared by the bytecode layer,
//! the interpreter and the method compiler.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of script values
//! - [`ErrorKind`] - Script-visible error categories
//! - [`Fault`] - Engine-internal failures awaiting classification
//! - [`VmError`] - What every engine entry point returns on failure
//! - [`convert`] - Number/string coercion helpers
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, VmError, Fault};
//!
//! let five = Value::number(5.0);
//! assert_eq!(five, Value::Int(5));
//! assert!(five.is_truthy());
//! assert_eq!(five.type_of(), "number");
//!
//! let err: VmError = Fault::NotCallable.into();
//! assert!(err.as_fault().is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod convert;
mod error;
mod value;

pub use convert::{
    number_to_string, parse_numeric_name, string_to_number, to_int32, to_radix_string, to_uint32,
};
pub use error::{error_codes, ErrorKind, Fault, VmError};
pub use value::{ObjectId, Value};
