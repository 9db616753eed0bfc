//! Instruction semantics shared by both execution modes
//!
//! The interpreter's dispatch loop and the compiler's generated steps call
//! the same functions here, so an instruction behaves identically whichever
//! mode runs it. Operations that consult the host classify their own faults
//! with the opcode, receiver and name at hand.

use std::rc::Rc;

use bytecode_system::{AbcFile, MethodInfo, Multiname, Opcode, ResolvedName};
use core_types::{convert, Fault, Value, VmError};

use crate::context::ExecutionContext;
use crate::host::Hint;
use crate::names;
use crate::normalize::{classify, FaultSite};
use crate::scope::Scope;

/// One-operand instruction
pub type UnaryFn = fn(&ExecutionContext, Value) -> Result<Value, VmError>;

/// Two-operand instruction; the first argument is the deeper operand
pub type BinaryFn = fn(&ExecutionContext, Value, Value) -> Result<Value, VmError>;

fn classified<T>(cx: &ExecutionContext, result: Result<T, VmError>, site: FaultSite<'_>) -> Result<T, VmError> {
    result.map_err(|err| classify(cx, err, &site))
}

// ---- conversions ----------------------------------------------------------

/// Primitive value of `value`
pub fn to_primitive(cx: &ExecutionContext, value: &Value, hint: Hint) -> Result<Value, VmError> {
    match value {
        Value::Object(_) => cx.host().to_primitive(cx, value, hint),
        other => Ok(other.clone()),
    }
}

/// ECMAScript `ToNumber`
pub fn to_number(cx: &ExecutionContext, value: &Value) -> Result<f64, VmError> {
    match value {
        Value::Object(_) => Ok(convert::primitive_to_number(&to_primitive(cx, value, Hint::Number)?)),
        other => Ok(convert::primitive_to_number(other)),
    }
}

/// ECMAScript `ToString`
pub fn to_string(cx: &ExecutionContext, value: &Value) -> Result<Rc<str>, VmError> {
    match value {
        Value::String(s) => Ok(Rc::clone(s)),
        Value::Object(_) => Ok(convert::primitive_to_string(&to_primitive(cx, value, Hint::String)?)),
        other => Ok(convert::primitive_to_string(other)),
    }
}

/// `ToInt32`
pub fn to_int32(cx: &ExecutionContext, value: &Value) -> Result<i32, VmError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Ok(convert::to_int32(to_number(cx, other)?)),
    }
}

/// `ToUint32`
pub fn to_uint32(cx: &ExecutionContext, value: &Value) -> Result<u32, VmError> {
    match value {
        Value::UInt(u) => Ok(*u),
        other => Ok(convert::to_uint32(to_number(cx, other)?)),
    }
}

// ---- unary ----------------------------------------------------------------

fn negate(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::number(-to_number(cx, &v)?))
}

fn increment(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &v)? + 1.0))
}

fn decrement(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &v)? - 1.0))
}

fn increment_i(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &v)?.wrapping_add(1)))
}

fn decrement_i(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &v)?.wrapping_sub(1)))
}

fn negate_i(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &v)?.wrapping_neg()))
}

fn not(_: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(!v.is_truthy()))
}

fn bit_not(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Int(!to_int32(cx, &v)?))
}

fn type_of(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::string(cx.host().type_of(&v)))
}

fn convert_i(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &v)?))
}

fn convert_u(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::UInt(to_uint32(cx, &v)?))
}

fn convert_d(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Number(to_number(cx, &v)?))
}

fn convert_b(_: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(v.is_truthy()))
}

/// `CONVERT_S`: every value becomes a string, `null` included
fn convert_s(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(Value::String(to_string(cx, &v)?))
}

/// `COERCE_S`: like `CONVERT_S` but `null` and `undefined` become `null`
fn coerce_s(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    match v {
        Value::Null | Value::Undefined => Ok(Value::Null),
        Value::String(_) => Ok(v),
        other => Ok(Value::String(to_string(cx, &other)?)),
    }
}

fn convert_o(cx: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    let fault = match v {
        Value::Null => Fault::NullReference,
        Value::Undefined => Fault::UndefinedReference,
        other => return Ok(other),
    };
    Err(classify(cx, fault.into(), &FaultSite::new(Opcode::ConvertO)))
}

fn coerce_o(_: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    match v {
        Value::Undefined => Ok(Value::Null),
        other => Ok(other),
    }
}

fn coerce_a(_: &ExecutionContext, v: Value) -> Result<Value, VmError> {
    Ok(v)
}

/// Implementation of a one-operand stack instruction
pub fn unary(op: Opcode) -> Option<UnaryFn> {
    let f: UnaryFn = match op {
        Opcode::Negate => negate,
        Opcode::Increment => increment,
        Opcode::Decrement => decrement,
        Opcode::IncrementI => increment_i,
        Opcode::DecrementI => decrement_i,
        Opcode::NegateI => negate_i,
        Opcode::Not => not,
        Opcode::BitNot => bit_not,
        Opcode::TypeOf => type_of,
        Opcode::ConvertI | Opcode::CoerceI => convert_i,
        Opcode::ConvertU | Opcode::CoerceU => convert_u,
        Opcode::ConvertD | Opcode::CoerceD => convert_d,
        Opcode::ConvertB | Opcode::CoerceB => convert_b,
        Opcode::ConvertS => convert_s,
        Opcode::CoerceS => coerce_s,
        Opcode::ConvertO => convert_o,
        Opcode::CoerceO => coerce_o,
        Opcode::CoerceA => coerce_a,
        _ => return None,
    };
    Some(f)
}

/// Update applied by `INCLOCAL`-style instructions
pub fn local_update(op: Opcode) -> Option<UnaryFn> {
    let f: UnaryFn = match op {
        Opcode::IncLocal => increment,
        Opcode::DecLocal => decrement,
        Opcode::IncLocalI => increment_i,
        Opcode::DecLocalI => decrement_i,
        _ => return None,
    };
    Some(f)
}

// ---- binary ---------------------------------------------------------------

fn add(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        return Ok(Value::number(*x as f64 + *y as f64));
    }
    let pa = to_primitive(cx, &a, Hint::Default)?;
    let pb = to_primitive(cx, &b, Hint::Default)?;
    if matches!(pa, Value::String(_)) || matches!(pb, Value::String(_)) {
        let mut s = convert::primitive_to_string(&pa).to_string();
        s.push_str(&convert::primitive_to_string(&pb));
        return Ok(Value::string(s));
    }
    Ok(Value::number(
        convert::primitive_to_number(&pa) + convert::primitive_to_number(&pb),
    ))
}

fn subtract(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &a)? - to_number(cx, &b)?))
}

fn multiply(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &a)? * to_number(cx, &b)?))
}

fn divide(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &a)? / to_number(cx, &b)?))
}

fn modulo(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::number(to_number(cx, &a)? % to_number(cx, &b)?))
}

fn lshift(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    let shift = to_uint32(cx, &b)? & 31;
    Ok(Value::Int(to_int32(cx, &a)?.wrapping_shl(shift)))
}

fn rshift(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    let shift = to_uint32(cx, &b)? & 31;
    Ok(Value::Int(to_int32(cx, &a)? >> shift))
}

fn urshift(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    let shift = to_uint32(cx, &b)? & 31;
    Ok(Value::UInt(to_uint32(cx, &a)? >> shift))
}

fn bit_and(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)? & to_int32(cx, &b)?))
}

fn bit_or(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)? | to_int32(cx, &b)?))
}

fn bit_xor(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)? ^ to_int32(cx, &b)?))
}

fn add_i(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)?.wrapping_add(to_int32(cx, &b)?)))
}

fn subtract_i(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)?.wrapping_sub(to_int32(cx, &b)?)))
}

fn multiply_i(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Int(to_int32(cx, &a)?.wrapping_mul(to_int32(cx, &b)?)))
}

fn equals(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(abstract_equals(cx, &a, &b)?))
}

fn strict_equals(_: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(a == b))
}

fn less_than(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(compare(cx, &a, &b)? == Some(true)))
}

fn less_equals(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(compare(cx, &b, &a)? == Some(false)))
}

fn greater_than(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(compare(cx, &b, &a)? == Some(true)))
}

fn greater_equals(cx: &ExecutionContext, a: Value, b: Value) -> Result<Value, VmError> {
    Ok(Value::Boolean(compare(cx, &a, &b)? == Some(false)))
}

fn instance_of(cx: &ExecutionContext, value: Value, class: Value) -> Result<Value, VmError> {
    let result = cx.host().is_instance_of(cx, &class, &value);
    classified(cx, result, FaultSite::new(Opcode::InstanceOf).callee(&class)).map(Value::Boolean)
}

fn is_type_late(cx: &ExecutionContext, value: Value, class: Value) -> Result<Value, VmError> {
    let result = cx.host().is_type(cx, &class, &value);
    classified(cx, result, FaultSite::new(Opcode::IsTypeLate).callee(&class)).map(Value::Boolean)
}

fn as_type_late(cx: &ExecutionContext, value: Value, class: Value) -> Result<Value, VmError> {
    let result = cx.host().as_type(cx, &class, &value);
    classified(cx, result, FaultSite::new(Opcode::AsTypeLate).callee(&class))
}

fn in_operator(cx: &ExecutionContext, name: Value, object: Value) -> Result<Value, VmError> {
    let rn = names::public_key(cx, name)?;
    let host = cx.host();
    let result = host
        .box_value(&object)
        .and_then(|boxed| host.has_property(cx, &boxed, &rn));
    classified(cx, result, FaultSite::new(Opcode::In).receiver(&object).name(&rn)).map(Value::Boolean)
}

/// Implementation of a two-operand stack instruction
pub fn binary(op: Opcode) -> Option<BinaryFn> {
    let f: BinaryFn = match op {
        Opcode::Add => add,
        Opcode::Subtract => subtract,
        Opcode::Multiply => multiply,
        Opcode::Divide => divide,
        Opcode::Modulo => modulo,
        Opcode::LShift => lshift,
        Opcode::RShift => rshift,
        Opcode::URShift => urshift,
        Opcode::BitAnd => bit_and,
        Opcode::BitOr => bit_or,
        Opcode::BitXor => bit_xor,
        Opcode::AddI => add_i,
        Opcode::SubtractI => subtract_i,
        Opcode::MultiplyI => multiply_i,
        Opcode::Equals => equals,
        Opcode::StrictEquals => strict_equals,
        Opcode::LessThan => less_than,
        Opcode::LessEquals => less_equals,
        Opcode::GreaterThan => greater_than,
        Opcode::GreaterEquals => greater_equals,
        Opcode::InstanceOf => instance_of,
        Opcode::IsTypeLate => is_type_late,
        Opcode::AsTypeLate => as_type_late,
        Opcode::In => in_operator,
        _ => return None,
    };
    Some(f)
}

/// ECMAScript abstract equality (`==`)
pub fn abstract_equals(cx: &ExecutionContext, a: &Value, b: &Value) -> Result<bool, VmError> {
    if a.is_number() && b.is_number() {
        return Ok(a == b);
    }
    Ok(match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        (Value::String(s), n) | (n, Value::String(s)) if n.is_number() => {
            n.as_number() == Some(convert::string_to_number(s))
        }
        (Value::Boolean(flag), other) | (other, Value::Boolean(flag)) => {
            let n = Value::Int(*flag as i32);
            return abstract_equals(cx, &n, other);
        }
        (Value::Object(_), primitive) | (primitive, Value::Object(_)) => {
            let object = if matches!(a, Value::Object(_)) { a } else { b };
            let converted = to_primitive(cx, object, Hint::Default)?;
            return abstract_equals(cx, &converted, primitive);
        }
        _ => false,
    })
}

/// Abstract relational comparison `a < b`; `None` when either side is NaN
pub fn compare(cx: &ExecutionContext, a: &Value, b: &Value) -> Result<Option<bool>, VmError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return Ok(Some(x < y));
    }
    let pa = to_primitive(cx, a, Hint::Number)?;
    let pb = to_primitive(cx, b, Hint::Number)?;
    if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
        return Ok(Some(x.encode_utf16().lt(y.encode_utf16())));
    }
    let x = convert::primitive_to_number(&pa);
    let y = convert::primitive_to_number(&pb);
    if x.is_nan() || y.is_nan() {
        Ok(None)
    } else {
        Ok(Some(x < y))
    }
}

/// Whether a two-operand conditional branch is taken.
///
/// The negated forms (`IFNLT` etc.) branch when the comparison is not true,
/// so they branch when either operand is NaN.
pub fn branch_taken(cx: &ExecutionContext, op: Opcode, a: &Value, b: &Value) -> Result<bool, VmError> {
    let taken = match op {
        Opcode::IfEq => abstract_equals(cx, a, b)?,
        Opcode::IfNe => !abstract_equals(cx, a, b)?,
        Opcode::IfStrictEq => a == b,
        Opcode::IfStrictNe => a != b,
        Opcode::IfLt => compare(cx, a, b)? == Some(true),
        Opcode::IfLe => compare(cx, b, a)? == Some(false),
        Opcode::IfGt => compare(cx, b, a)? == Some(true),
        Opcode::IfGe => compare(cx, a, b)? == Some(false),
        Opcode::IfNlt => compare(cx, a, b)? != Some(true),
        Opcode::IfNle => compare(cx, b, a)? != Some(false),
        Opcode::IfNgt => compare(cx, b, a)? != Some(true),
        Opcode::IfNge => compare(cx, a, b)? != Some(false),
        other => return Err(Fault::Verify(format!("{} is not a comparison branch", other)).into()),
    };
    Ok(taken)
}

/// Case selected by a `LOOKUPSWITCH` index; `None` selects the default.
pub fn switch_case(index: &Value, case_count: u32) -> Option<usize> {
    let n = index.as_number()?;
    if n.fract() == 0.0 && n >= 0.0 && n <= case_count as f64 {
        Some(n as usize)
    } else {
        None
    }
}

// ---- properties -----------------------------------------------------------

/// `GETPROPERTY`
pub fn get_property(cx: &ExecutionContext, receiver: &Value, rn: &ResolvedName) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.get_property(cx, &object, rn));
    classified(cx, result, FaultSite::new(Opcode::GetProperty).receiver(receiver).name(rn))
}

/// `SETPROPERTY` and `INITPROPERTY`
pub fn set_property(
    cx: &ExecutionContext,
    op: Opcode,
    receiver: &Value,
    rn: &ResolvedName,
    value: Value,
) -> Result<(), VmError> {
    let host = cx.host();
    let result = host.box_value(receiver).and_then(|object| {
        if op == Opcode::InitProperty {
            host.init_property(cx, &object, rn, value)
        } else {
            host.set_property(cx, &object, rn, value)
        }
    });
    classified(cx, result, FaultSite::new(op).receiver(receiver).name(rn))
}

/// `DELETEPROPERTY`
pub fn delete_property(cx: &ExecutionContext, receiver: &Value, rn: &ResolvedName) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.delete_property(cx, &object, rn));
    classified(cx, result, FaultSite::new(Opcode::DeleteProperty).receiver(receiver).name(rn)).map(Value::Boolean)
}

/// `CALLPROPERTY`, `CALLPROPLEX` and `CALLPROPVOID`
pub fn call_property(
    cx: &ExecutionContext,
    op: Opcode,
    receiver: &Value,
    rn: &ResolvedName,
    args: &[Value],
) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.call_property(cx, &object, rn, args, op == Opcode::CallPropLex));
    classified(cx, result, FaultSite::new(op).receiver(receiver).name(rn))
}

/// `CONSTRUCTPROP`
pub fn construct_property(
    cx: &ExecutionContext,
    receiver: &Value,
    rn: &ResolvedName,
    args: &[Value],
) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.construct_property(cx, &object, rn, args));
    classified(cx, result, FaultSite::new(Opcode::ConstructProp).receiver(receiver).name(rn))
}

/// `GETSUPER`
pub fn get_super(cx: &ExecutionContext, scope: &Rc<Scope>, receiver: &Value, rn: &ResolvedName) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.get_super(cx, scope, &object, rn));
    classified(cx, result, FaultSite::new(Opcode::GetSuper).receiver(receiver).name(rn))
}

/// `SETSUPER`
pub fn set_super(
    cx: &ExecutionContext,
    scope: &Rc<Scope>,
    receiver: &Value,
    rn: &ResolvedName,
    value: Value,
) -> Result<(), VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.set_super(cx, scope, &object, rn, value));
    classified(cx, result, FaultSite::new(Opcode::SetSuper).receiver(receiver).name(rn))
}

/// `CALLSUPER` and `CALLSUPERVOID`
pub fn call_super(
    cx: &ExecutionContext,
    op: Opcode,
    scope: &Rc<Scope>,
    receiver: &Value,
    rn: &ResolvedName,
    args: &[Value],
) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.call_super(cx, scope, &object, rn, args));
    classified(cx, result, FaultSite::new(op).receiver(receiver).name(rn))
}

/// `CONSTRUCTSUPER`
pub fn construct_super(cx: &ExecutionContext, scope: &Rc<Scope>, receiver: &Value, args: &[Value]) -> Result<(), VmError> {
    let host = cx.host();
    let result = host
        .box_value(receiver)
        .and_then(|object| host.construct_super(cx, scope, &object, args));
    classified(cx, result, FaultSite::new(Opcode::ConstructSuper).receiver(receiver))
}

// ---- calls ----------------------------------------------------------------

/// Checks a `CALL` or `CONSTRUCT` target before it is applied. Whether an
/// object can actually be constructed is left to the object model.
pub fn validate_call(cx: &ExecutionContext, target: &Value, construct: bool) -> Result<(), VmError> {
    match target {
        Value::Null if construct => Err(Fault::NullReference.into()),
        Value::Undefined if construct => Err(Fault::UndefinedReference.into()),
        Value::Object(_) if construct => Ok(()),
        _ if construct => Err(Fault::NotConstructor.into()),
        _ if cx.host().is_callable(target) => Ok(()),
        _ => Err(Fault::NotCallable.into()),
    }
}

/// `CALL`
pub fn call(cx: &ExecutionContext, callee: &Value, receiver: Value, args: &[Value]) -> Result<Value, VmError> {
    let result = validate_call(cx, callee, false).and_then(|()| cx.host().apply(cx, callee, receiver, args));
    classified(cx, result, FaultSite::new(Opcode::Call).callee(callee))
}

/// `CALLSTATIC`: the method at `index`, invoked directly on `receiver`
/// with `scope` as its saved scope
pub fn call_static(
    cx: &ExecutionContext,
    abc: &AbcFile,
    index: u32,
    scope: &Rc<Scope>,
    receiver: Value,
    args: &[Value],
) -> Result<Value, VmError> {
    let method = Rc::clone(abc.method(index)?);
    let result = match &receiver {
        Value::Null => Err(Fault::NullReference.into()),
        Value::Undefined => Err(Fault::UndefinedReference.into()),
        _ => cx.invoke(&method, scope, receiver.clone(), args),
    };
    classified(cx, result, FaultSite::new(Opcode::CallStatic).receiver(&receiver))
}

/// `CONSTRUCT`
pub fn construct(cx: &ExecutionContext, class: &Value, args: &[Value]) -> Result<Value, VmError> {
    let result = validate_call(cx, class, true).and_then(|()| cx.host().construct(cx, class, args));
    classified(cx, result, FaultSite::new(Opcode::Construct).callee(class))
}

/// `APPLYTYPE`
pub fn apply_type(cx: &ExecutionContext, factory: &Value, args: &[Value]) -> Result<Value, VmError> {
    let result = cx.host().apply_type(cx, factory, args);
    classified(cx, result, FaultSite::new(Opcode::ApplyType).callee(factory))
}

// ---- scope lookup ---------------------------------------------------------

/// `FINDPROPERTY` and `FINDPROPSTRICT`
pub fn find_property(cx: &ExecutionContext, op: Opcode, scope: &Rc<Scope>, rn: &ResolvedName) -> Result<Value, VmError> {
    let strict = op == Opcode::FindPropStrict;
    let result = cx.host().find_scope_property(cx, scope, rn, strict, false);
    classified(cx, result, FaultSite::new(op).name(rn))
}

/// `GETLEX`
pub fn get_lex(cx: &ExecutionContext, scope: &Rc<Scope>, rn: &ResolvedName) -> Result<Value, VmError> {
    let result = cx.host().get_scope_property(cx, scope, rn, true, false);
    classified(cx, result, FaultSite::new(Opcode::GetLex).name(rn))
}

fn resolve_class(cx: &ExecutionContext, scope: &Rc<Scope>, rn: &ResolvedName) -> Result<Value, VmError> {
    cx.host()
        .get_scope_property(cx, scope, rn, true, false)
        .map_err(|err| match err {
            VmError::Fault(Fault::PropertyNotFound(name)) => Fault::ClassNotFound(name).into(),
            other => other,
        })
}

/// `COERCE`, `ISTYPE` and `ASTYPE` with a type from the constant pool
pub fn named_type(
    cx: &ExecutionContext,
    op: Opcode,
    scope: &Rc<Scope>,
    rn: &ResolvedName,
    value: Value,
) -> Result<Value, VmError> {
    let host = cx.host();
    let result = resolve_class(cx, scope, rn).and_then(|class| match op {
        Opcode::IsType => host.is_type(cx, &class, &value).map(Value::Boolean),
        Opcode::AsType => host.as_type(cx, &class, &value),
        _ => host.coerce(cx, &class, value.clone()),
    });
    classified(cx, result, FaultSite::new(op).name(rn))
}

// ---- slots and enumeration ------------------------------------------------

/// `GETSLOT` and `GETGLOBALSLOT`
pub fn get_slot(cx: &ExecutionContext, op: Opcode, object: &Value, index: u32) -> Result<Value, VmError> {
    let host = cx.host();
    let result = host
        .box_value(object)
        .and_then(|boxed| host.get_slot(cx, &boxed, index));
    classified(cx, result, FaultSite::new(op).receiver(object))
}

/// `SETSLOT` and `SETGLOBALSLOT`
pub fn set_slot(cx: &ExecutionContext, op: Opcode, object: &Value, index: u32, value: Value) -> Result<(), VmError> {
    let host = cx.host();
    let result = host
        .box_value(object)
        .and_then(|boxed| host.set_slot(cx, &boxed, index, value));
    classified(cx, result, FaultSite::new(op).receiver(object))
}

/// `HASNEXT`
pub fn has_next(cx: &ExecutionContext, object: &Value, index: &Value) -> Result<Value, VmError> {
    let index = to_uint32(cx, index)?;
    if object.is_nullish() {
        return Ok(Value::Int(0));
    }
    let result = cx.host().has_next(cx, object, index);
    classified(cx, result, FaultSite::new(Opcode::HasNext).receiver(object)).map(|next| Value::Int(next as i32))
}

/// `HASNEXT2`: the object and index to store back, and the pushed flag
pub fn has_next2(cx: &ExecutionContext, object: &Value, index: &Value) -> Result<(Value, Value, bool), VmError> {
    if object.is_nullish() {
        return Ok((Value::Null, Value::Int(0), false));
    }
    let index = to_uint32(cx, index)?;
    let result = cx.host().has_next2(cx, object, index);
    let (object, next) = classified(cx, result, FaultSite::new(Opcode::HasNext2).receiver(object))?;
    Ok((object, Value::Int(next as i32), next != 0))
}

/// `NEXTNAME`
pub fn next_name(cx: &ExecutionContext, object: &Value, index: &Value) -> Result<Value, VmError> {
    let index = to_uint32(cx, index)?;
    let host = cx.host();
    let result = host
        .box_value(object)
        .and_then(|boxed| host.next_name(cx, &boxed, index));
    classified(cx, result, FaultSite::new(Opcode::NextName).receiver(object))
}

/// `NEXTVALUE`
pub fn next_value(cx: &ExecutionContext, object: &Value, index: &Value) -> Result<Value, VmError> {
    let index = to_uint32(cx, index)?;
    let host = cx.host();
    let result = host
        .box_value(object)
        .and_then(|boxed| host.next_value(cx, &boxed, index));
    classified(cx, result, FaultSite::new(Opcode::NextValue).receiver(object))
}

// ---- creation -------------------------------------------------------------

/// `NEWOBJECT`: `pairs` alternates keys and values; later keys win
pub fn new_object(cx: &ExecutionContext, pairs: Vec<Value>) -> Result<Value, VmError> {
    let host = cx.host();
    let object = host.create_object();
    let mut pairs = pairs.into_iter();
    while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
        let result = host.set_public_property(cx, &object, &key, value);
        classified(cx, result, FaultSite::new(Opcode::NewObject).receiver(&object))?;
    }
    Ok(object)
}

/// `NEWARRAY`
pub fn new_array(cx: &ExecutionContext, values: Vec<Value>) -> Value {
    cx.host().create_array_unsafe(values)
}

/// `NEWFUNCTION`
pub fn new_function(cx: &ExecutionContext, abc: &AbcFile, index: u32, scope: &Rc<Scope>) -> Result<Value, VmError> {
    let method = abc.method(index)?;
    let result = cx.host().create_function(cx, method, scope);
    classified(cx, result, FaultSite::new(Opcode::NewFunction))
}

/// `NEWCLASS`
pub fn new_class(cx: &ExecutionContext, abc: &Rc<AbcFile>, index: u32, base: &Value, scope: &Rc<Scope>) -> Result<Value, VmError> {
    let class = abc.class(index)?;
    let result = cx.host().create_class(cx, abc, class, base, scope);
    classified(cx, result, FaultSite::new(Opcode::NewClass).receiver(base))
}

/// `NEWACTIVATION`
pub fn new_activation(cx: &ExecutionContext, method: &Rc<MethodInfo>, scope: &Rc<Scope>) -> Result<Value, VmError> {
    let result = cx.host().create_activation(cx, method, scope);
    classified(cx, result, FaultSite::new(Opcode::NewActivation))
}

/// `NEWCATCH`
pub fn new_catch(cx: &ExecutionContext, method: &MethodInfo, index: u32, scope: &Rc<Scope>) -> Result<Value, VmError> {
    let info = method
        .body
        .as_ref()
        .and_then(|body| body.exceptions.get(index as usize))
        .ok_or_else(|| Fault::Verify(format!("exception index {} out of range", index)))?;
    let result = cx.host().create_catch(cx, info, scope);
    classified(cx, result, FaultSite::new(Opcode::NewCatch))
}

/// `PUSHNAMESPACE`
pub fn push_namespace(cx: &ExecutionContext, abc: &AbcFile, index: u32) -> Result<Value, VmError> {
    let ns = abc.namespace(index)?;
    let result = cx.host().namespace_value(ns);
    classified(cx, result, FaultSite::new(Opcode::PushNamespace))
}

/// `PUSHSCOPE` and `PUSHWITH`: the boxed scope object
pub fn scope_object(cx: &ExecutionContext, op: Opcode, value: &Value) -> Result<Value, VmError> {
    let result = cx.host().box_value(value);
    classified(cx, result, FaultSite::new(op).receiver(value))
}

/// `DXNSLATE`
pub fn dxns_late(cx: &ExecutionContext, scope: &Scope, value: &Value) -> Result<(), VmError> {
    scope.set_default_namespace(to_string(cx, value)?);
    Ok(())
}

// ---- frames ---------------------------------------------------------------

/// Coerce `value` to the class `type_name` names in `scope`. A type that
/// does not resolve leaves the value untouched.
fn coerce_to_type(cx: &ExecutionContext, scope: &Rc<Scope>, type_name: &Multiname, value: Value) -> Result<Value, VmError> {
    if type_name.is_any_name() || type_name.is_runtime() {
        return Ok(value);
    }
    let rn = ResolvedName::from_static(type_name);
    match resolve_class(cx, scope, &rn) {
        Ok(class) => cx.host().coerce(cx, &class, value),
        Err(VmError::Fault(Fault::ClassNotFound(_))) => Ok(value),
        Err(err) => Err(err),
    }
}

/// Number of locals a frame of `method` gets: at least the receiver, every
/// parameter and the rest or `arguments` array.
pub fn local_count(method: &MethodInfo) -> usize {
    let extra = (method.flags.needs_rest || method.flags.needs_arguments) as usize;
    let declared = method.body.as_ref().map_or(0, |body| body.local_count);
    declared.max(1 + method.params.len() + extra)
}

/// Locals of a new frame: receiver, parameters (defaults filled in and
/// coerced to their declared types), then the rest or `arguments` array,
/// padded with `undefined` to the declared local count.
pub fn bind_arguments(
    cx: &ExecutionContext,
    method: &MethodInfo,
    scope: &Rc<Scope>,
    receiver: Value,
    args: &[Value],
) -> Result<Vec<Value>, VmError> {
    let required = method.min_arguments();
    if args.len() < required {
        return Err(Fault::ArgumentCount {
            method: method.display_name(),
            expected: required,
            got: args.len(),
        }
        .into());
    }
    let params = method.params.len();
    let flags = method.flags;
    let count = local_count(method);

    let mut locals = Vec::with_capacity(count);
    locals.push(receiver);
    for (i, param) in method.params.iter().enumerate() {
        let value = match args.get(i) {
            Some(arg) => arg.clone(),
            None => param.default.clone().unwrap_or_default(),
        };
        let value = match &param.type_name {
            Some(type_name) => coerce_to_type(cx, scope, type_name, value)?,
            None => value,
        };
        locals.push(value);
    }
    if flags.needs_rest {
        let rest = args.get(params..).unwrap_or_default().to_vec();
        locals.push(cx.host().create_array_unsafe(rest));
    } else if flags.needs_arguments {
        locals.push(cx.host().create_array_unsafe(args.to_vec()));
    }
    locals.resize(count, Value::Undefined);
    Ok(locals)
}

/// Coerce a returned value to the method's declared return type, resolved
/// through the method's saved scope
pub fn coerce_return(cx: &ExecutionContext, method: &MethodInfo, scope: &Rc<Scope>, value: Value) -> Result<Value, VmError> {
    match &method.return_type {
        Some(type_name) => {
            let result = coerce_to_type(cx, scope, type_name, value);
            classified(cx, result, FaultSite::new(Opcode::ReturnValue))
        }
        None => Ok(value),
    }
}
