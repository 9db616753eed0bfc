//! Runtime multiname resolution
//!
//! Name-based instructions whose multiname has runtime parts pop them from
//! the operand stack. The namespace is pushed before the name, so the name is
//! popped first.

use std::rc::Rc;

use bytecode_system::{Multiname, MultinameKind, Namespace, NamespaceKind, ResolvedName};
use core_types::{convert, Fault, Value, VmError};

use crate::context::ExecutionContext;
use crate::operations;

/// Fill `rn` from `mn` plus the runtime parts taken from the stack.
///
/// A `QName` object supplied as the name carries its own namespace, so the
/// runtime namespace (if any) is ignored.
pub fn resolve_name(
    cx: &ExecutionContext,
    mn: &Multiname,
    runtime_name: Option<Value>,
    runtime_ns: Option<Value>,
    rn: &mut ResolvedName,
) -> Result<(), VmError> {
    rn.reset(mn);
    let mut qualified = false;
    if let Some(name) = runtime_name {
        match cx.host().as_qname(&name) {
            Some(qname) => {
                rn.id = qname.id;
                rn.kind = if mn.is_attribute() {
                    MultinameKind::RTQNameLA
                } else {
                    MultinameKind::RTQNameL
                };
                rn.name = match &qname.name {
                    Some(name) => Value::String(Rc::clone(name)),
                    None => Value::Undefined,
                };
                rn.namespaces = Rc::clone(&qname.namespaces);
                qualified = true;
            }
            None => set_runtime_name(cx, rn, name)?,
        }
    }
    if let Some(ns) = runtime_ns {
        if !qualified {
            let ns = match cx.host().as_namespace(&ns) {
                Some(ns) => ns,
                None => Namespace::new(NamespaceKind::Namespace, operations::to_string(cx, &ns)?),
            };
            rn.namespaces = Rc::from(vec![ns]);
        }
    }
    Ok(())
}

fn set_runtime_name(cx: &ExecutionContext, rn: &mut ResolvedName, name: Value) -> Result<(), VmError> {
    match &name {
        Value::Int(_) | Value::UInt(_) | Value::Number(_) => {
            rn.numeric = true;
            rn.numeric_value = name.as_number().unwrap_or(f64::NAN);
            rn.name = name;
        }
        Value::String(s) => {
            if let Some(n) = convert::parse_numeric_name(s) {
                rn.numeric = true;
                rn.numeric_value = n;
            }
            rn.name = name;
        }
        Value::Object(_) => {
            let s = operations::to_string(cx, &name)?;
            if let Some(n) = convert::parse_numeric_name(&s) {
                rn.numeric = true;
                rn.numeric_value = n;
            }
            rn.name = Value::String(s);
        }
        other => rn.name = Value::String(convert::primitive_to_string(other)),
    }
    Ok(())
}

/// Pop the runtime parts of `mn` from `stack` and resolve into `rn`.
pub fn pop_name_into(
    cx: &ExecutionContext,
    stack: &mut Vec<Value>,
    mn: &Multiname,
    rn: &mut ResolvedName,
) -> Result<(), VmError> {
    let name = if mn.is_runtime_name() {
        Some(stack.pop().ok_or(Fault::OperandStackUnderflow)?)
    } else {
        None
    };
    let ns = if mn.is_runtime_namespace() {
        Some(stack.pop().ok_or(Fault::OperandStackUnderflow)?)
    } else {
        None
    };
    resolve_name(cx, mn, name, ns, rn)
}

/// Resolved public name for a key value, as used by `IN` and `NEWOBJECT`.
pub fn public_key(cx: &ExecutionContext, key: Value) -> Result<ResolvedName, VmError> {
    let mn = Multiname::runtime(MultinameKind::MultinameL, None, vec![Namespace::public()]);
    let mut rn = ResolvedName::default();
    resolve_name(cx, &mn, Some(key), None, &mut rn)?;
    Ok(rn)
}
