//! Unit tests for interpreter components

use std::rc::Rc;

use bytecode_system::{ExceptionInfo, Multiname, MultinameKind, Namespace, Opcode, ResolvedName};
use core_types::{ErrorKind, Fault, Value, VmError};
use interpreter::names::{pop_name_into, public_key};
use interpreter::normalize::{classify, describe};
use interpreter::operations as ops;
use interpreter::{
    covering_regions, select_handler, ExecutionContext, FaultSite, Hint, Interpreter, ObjectHeap, ObjectModel, Scope,
    ScopeStack, DEFAULT_MAX_CALL_DEPTH,
};

fn setup() -> (Rc<ObjectHeap>, ExecutionContext) {
    let heap = Rc::new(ObjectHeap::new());
    let cx = Interpreter::context(heap.clone());
    (heap, cx)
}

// ============================================================================
// Arithmetic and conversions
// ============================================================================

fn binary(cx: &ExecutionContext, op: Opcode, a: Value, b: Value) -> Result<Value, VmError> {
    ops::binary(op).expect("binary opcode")(cx, a, b)
}

fn unary(cx: &ExecutionContext, op: Opcode, v: Value) -> Result<Value, VmError> {
    ops::unary(op).expect("unary opcode")(cx, v)
}

#[test]
fn test_division_by_zero_is_infinity() {
    let (_, cx) = setup();
    let result = binary(&cx, Opcode::Divide, Value::Int(1), Value::Int(0)).unwrap();
    assert_eq!(result.as_number(), Some(f64::INFINITY));
}

#[test]
fn test_zero_modulo_zero_is_nan() {
    let (_, cx) = setup();
    let result = binary(&cx, Opcode::Modulo, Value::Int(0), Value::Int(0)).unwrap();
    assert!(result.as_number().unwrap().is_nan());
}

#[test]
fn test_add_concatenates_when_either_side_is_string() {
    let (_, cx) = setup();
    assert_eq!(binary(&cx, Opcode::Add, Value::string("a"), Value::Int(1)).unwrap(), Value::string("a1"));
    assert_eq!(binary(&cx, Opcode::Add, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
}

#[test]
fn test_add_i_wraps() {
    let (_, cx) = setup();
    let result = binary(&cx, Opcode::AddI, Value::Int(i32::MAX), Value::Int(1)).unwrap();
    assert_eq!(result, Value::Int(i32::MIN));
}

#[test]
fn test_shift_count_masked() {
    let (_, cx) = setup();
    assert_eq!(binary(&cx, Opcode::LShift, Value::Int(1), Value::Int(33)).unwrap(), Value::Int(2));
    assert_eq!(binary(&cx, Opcode::URShift, Value::Int(-1), Value::Int(28)).unwrap(), Value::UInt(15));
}

#[test]
fn test_convert_s_and_coerce_s_differ_on_null() {
    let (_, cx) = setup();
    assert_eq!(unary(&cx, Opcode::ConvertS, Value::Null).unwrap(), Value::string("null"));
    assert_eq!(unary(&cx, Opcode::CoerceS, Value::Null).unwrap(), Value::Null);
    assert_eq!(unary(&cx, Opcode::CoerceS, Value::Undefined).unwrap(), Value::Null);
    assert_eq!(unary(&cx, Opcode::ConvertS, Value::Int(5)).unwrap(), Value::string("5"));
}

#[test]
fn test_convert_o_rejects_nullish() {
    let (heap, cx) = setup();
    let err = unary(&cx, Opcode::ConvertO, Value::Undefined).unwrap_err();
    assert_eq!(heap.error_code(err.thrown().unwrap()), Some(1010));
}

#[test]
fn test_typeof_reports_functions() {
    let (heap, cx) = setup();
    let f = heap.native(|_, _, _| Ok(Value::Undefined));
    assert_eq!(unary(&cx, Opcode::TypeOf, f).unwrap(), Value::string("function"));
    assert_eq!(unary(&cx, Opcode::TypeOf, Value::Null).unwrap(), Value::string("object"));
}

#[test]
fn test_object_converts_through_value_of() {
    let (heap, cx) = setup();
    let object = heap.create_object();
    heap.set(&object, "valueOf", heap.native(|_, _, _| Ok(Value::Int(40))));
    assert_eq!(ops::to_number(&cx, &object).unwrap(), 40.0);
    let sum = binary(&cx, Opcode::Add, object, Value::Int(2)).unwrap();
    assert_eq!(sum, Value::Int(42));
}

#[test]
fn test_to_primitive_string_hint_prefers_to_string() {
    let (heap, cx) = setup();
    let object = heap.create_object();
    heap.set(&object, "valueOf", heap.native(|_, _, _| Ok(Value::Int(1))));
    heap.set(&object, "toString", heap.native(|_, _, _| Ok(Value::string("one"))));
    assert_eq!(ops::to_primitive(&cx, &object, Hint::String).unwrap(), Value::string("one"));
    assert_eq!(ops::to_primitive(&cx, &object, Hint::Number).unwrap(), Value::Int(1));
}

// ============================================================================
// Comparisons and branches
// ============================================================================

#[test]
fn test_negated_branches_taken_on_nan() {
    let (_, cx) = setup();
    let nan = Value::Number(f64::NAN);
    for op in [Opcode::IfNlt, Opcode::IfNle, Opcode::IfNgt, Opcode::IfNge] {
        assert!(ops::branch_taken(&cx, op, &nan, &Value::Int(1)).unwrap(), "{}", op);
    }
    for op in [Opcode::IfLt, Opcode::IfLe, Opcode::IfGt, Opcode::IfGe] {
        assert!(!ops::branch_taken(&cx, op, &nan, &Value::Int(1)).unwrap(), "{}", op);
    }
}

#[test]
fn test_equality_across_numeric_representations() {
    let (_, cx) = setup();
    assert!(ops::branch_taken(&cx, Opcode::IfEq, &Value::Int(1), &Value::Number(1.0)).unwrap());
    assert!(ops::branch_taken(&cx, Opcode::IfEq, &Value::string("1"), &Value::Int(1)).unwrap());
    assert!(!ops::branch_taken(&cx, Opcode::IfStrictEq, &Value::string("1"), &Value::Int(1)).unwrap());
    assert!(ops::branch_taken(&cx, Opcode::IfEq, &Value::Null, &Value::Undefined).unwrap());
    assert!(!ops::branch_taken(&cx, Opcode::IfStrictEq, &Value::Null, &Value::Undefined).unwrap());
}

#[test]
fn test_string_comparison_is_lexicographic() {
    let (_, cx) = setup();
    assert_eq!(ops::compare(&cx, &Value::string("abc"), &Value::string("abd")).unwrap(), Some(true));
    assert_eq!(ops::compare(&cx, &Value::string("10"), &Value::string("9")).unwrap(), Some(true));
    assert_eq!(ops::compare(&cx, &Value::string("10"), &Value::Int(9)).unwrap(), Some(false));
}

#[test]
fn test_switch_case_selection() {
    assert_eq!(ops::switch_case(&Value::Int(2), 2), Some(2));
    assert_eq!(ops::switch_case(&Value::Int(3), 2), None);
    assert_eq!(ops::switch_case(&Value::Number(1.5), 2), None);
    assert_eq!(ops::switch_case(&Value::Int(-1), 2), None);
    assert_eq!(ops::switch_case(&Value::string("1"), 2), None);
}

// ============================================================================
// Names
// ============================================================================

#[test]
fn test_runtime_name_popped_before_namespace() {
    let (_, cx) = setup();
    let mn = Multiname::runtime(MultinameKind::RTQNameL, None, Vec::new());
    let mut stack = vec![Value::string("urn:ns"), Value::string("field")];
    let mut rn = ResolvedName::default();
    pop_name_into(&cx, &mut stack, &mn, &mut rn).unwrap();
    assert!(stack.is_empty());
    assert_eq!(rn.name, Value::string("field"));
    assert_eq!(&*rn.namespaces[0].uri, "urn:ns");
}

#[test]
fn test_qname_object_overrides_runtime_namespace() {
    let (heap, cx) = setup();
    let qname = heap.qname(Multiname::qname(Namespace::public(), "inner"));
    let mn = Multiname::runtime(MultinameKind::RTQNameL, None, Vec::new());
    let mut stack = vec![Value::string("urn:ignored"), qname];
    let mut rn = ResolvedName::default();
    pop_name_into(&cx, &mut stack, &mn, &mut rn).unwrap();
    assert_eq!(rn.name, Value::string("inner"));
    assert!(rn.has_public_namespace());
}

#[test]
fn test_numeric_string_key_is_index() {
    let (_, cx) = setup();
    let rn = public_key(&cx, Value::string("12")).unwrap();
    assert!(rn.numeric);
    assert_eq!(rn.numeric_value, 12.0);
    let rn = public_key(&cx, Value::string("x")).unwrap();
    assert!(!rn.numeric);
}

#[test]
fn test_missing_runtime_name_underflows() {
    let (_, cx) = setup();
    let mn = Multiname::runtime(MultinameKind::MultinameL, None, vec![Namespace::public()]);
    let mut rn = ResolvedName::default();
    let err = pop_name_into(&cx, &mut Vec::new(), &mn, &mut rn).unwrap_err();
    assert!(err.is_verify());
}

// ============================================================================
// Scopes
// ============================================================================

#[test]
fn test_scope_stack_reuses_unchanged_links() {
    let (heap, _) = setup();
    let global = Scope::global(heap.global());
    let mut stack = ScopeStack::new(Rc::clone(&global));
    let a = heap.create_object();
    stack.push(a.clone(), false);
    let first = stack.top_scope();
    let second = stack.top_scope();
    assert!(Rc::ptr_eq(&first, &second));
    stack.pop();
    assert!(Rc::ptr_eq(&stack.top_scope(), &global));
    stack.push(a, true);
    let with = stack.top_scope();
    assert!(with.is_with());
    assert!(!Rc::ptr_eq(&with, &first));
}

#[test]
fn test_scope_global_object_reachable_from_any_depth() {
    let (heap, _) = setup();
    let global = Scope::global(heap.global());
    let inner = global.extend(heap.create_object(), false).extend(heap.create_object(), true);
    assert_eq!(inner.depth(), 2);
    assert_eq!(inner.global_object(), &heap.global());
    assert_eq!(inner.ancestors().filter(|s| s.is_with()).count(), 1);
}

#[test]
fn test_find_property_stops_at_with_scope_when_asked() {
    let (heap, cx) = setup();
    heap.define_global("target", Value::Int(1));
    let with_object = heap.create_object();
    let scope = Scope::global(heap.global()).extend(with_object.clone(), true);
    let rn = ResolvedName::from_static(&Multiname::public_qname("target"));
    let found = heap.find_scope_property(&cx, &scope, &rn, true, false).unwrap();
    assert_eq!(found, heap.global());
    let err = heap.find_scope_property(&cx, &scope, &rn, true, true).unwrap_err();
    assert_eq!(err.as_fault(), Some(&Fault::PropertyNotFound("target".into())));
}

// ============================================================================
// Exception dispatch helpers
// ============================================================================

#[test]
fn test_covering_regions_half_open() {
    let regions = vec![
        ExceptionInfo::catch_all(0, 4, 10),
        ExceptionInfo::catch_all(4, 8, 20),
        ExceptionInfo::catch_all(0, 8, 30),
    ];
    assert_eq!(covering_regions(&regions, 3).collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(covering_regions(&regions, 4).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(covering_regions(&regions, 8).count(), 0);
}

#[test]
fn test_select_handler_checks_type() {
    let (heap, cx) = setup();
    let regions = vec![
        ExceptionInfo::typed(0, 4, 10, Rc::new(Multiname::public_qname("RangeError"))),
        ExceptionInfo::typed(0, 4, 20, Rc::new(Multiname::public_qname("Error"))),
        ExceptionInfo::catch_all(0, 4, 30),
    ];
    let type_error = heap.create_error(ErrorKind::TypeError, 1009, &[]);
    assert_eq!(select_handler(&cx, &regions, 0..3, &type_error).unwrap(), Some(1));
    assert_eq!(select_handler(&cx, &regions, 0..3, &Value::Int(1)).unwrap(), Some(2));
    assert_eq!(select_handler(&cx, &regions, 0..1, &Value::Int(1)).unwrap(), None);
}

#[test]
fn test_classify_passes_thrown_values_through() {
    let (_, cx) = setup();
    let err = classify(&cx, VmError::Throw(Value::Int(3)), &FaultSite::unknown());
    assert_eq!(err, VmError::Throw(Value::Int(3)));
}

#[test]
fn test_classify_builds_script_errors() {
    let (heap, cx) = setup();
    let err = classify(&cx, Fault::RecursionLimit.into(), &FaultSite::unknown());
    let thrown = err.thrown().unwrap();
    assert!(heap.is_error(thrown, ErrorKind::RangeError));
    assert_eq!(heap.error_code(thrown), Some(1023));
}

#[test]
fn test_describe_call_of_undefined_property() {
    let fault = Fault::PropertyNotFound("draw".into());
    let (kind, code, args) = describe(&fault, &FaultSite::new(Opcode::CallPropVoid));
    assert_eq!((kind, code), (ErrorKind::TypeError, 1006));
    assert_eq!(args, vec!["draw".to_string()]);
    let (kind, code, _) = describe(&fault, &FaultSite::new(Opcode::GetLex));
    assert_eq!((kind, code), (ErrorKind::ReferenceError, 1065));
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn test_frame_guard_restores_depth() {
    let (_, cx) = setup();
    assert_eq!(cx.max_call_depth(), DEFAULT_MAX_CALL_DEPTH);
    {
        let _outer = cx.enter_frame().unwrap();
        let _inner = cx.enter_frame().unwrap();
        assert_eq!(cx.call_depth(), 2);
    }
    assert_eq!(cx.call_depth(), 0);
    assert_eq!(cx.scope_stacks(), 0);
}

#[test]
fn test_depth_limit_raises_recursion_fault() {
    let heap = Rc::new(ObjectHeap::new());
    let cx = Interpreter::context(heap).with_max_call_depth(1);
    let _frame = cx.enter_frame().unwrap();
    let err = cx.enter_frame().err().unwrap();
    assert_eq!(err.as_fault(), Some(&Fault::RecursionLimit));
}
