//! End-to-end scenarios
//!
//! Small programs assembled from several methods, each run interpreted and
//! compiled with identical results.

use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode, Parameter};
use core_types::Value;
use integration_tests::{entry, returned, run_both, threw};

/// `main` calls `callee` with no arguments and returns the result
fn call_without_arguments(abc: &mut AbcBuilder, callee: u32) -> u32 {
    let mut code = CodeBuilder::new();
    code.op_u30(Opcode::NewFunction, callee).op(Opcode::PushNull).op_u30(Opcode::Call, 0);
    code.op(Opcode::ReturnValue);
    entry(abc, &code, 2, 1)
}

#[test]
fn test_add_two_bytes() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(5)"));
}

#[test]
fn test_defaulted_parameter_is_local_one() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.get_local(1).op(Opcode::ReturnValue);
        let callee = abc.method(
            MethodInfo::new(0)
                .with_name("withDefault")
                .with_param(Parameter::untyped().with_default(Value::Int(9)))
                .with_body(MethodBody::new(code.finish().unwrap(), 1, 2)),
        );
        call_without_arguments(abc, callee)
    });
    assert_eq!(outcome, returned("Int(9)"));
}

#[test]
fn test_missing_required_argument() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.get_local(1).op(Opcode::ReturnValue);
        let callee = abc.method(
            MethodInfo::new(0)
                .with_name("required")
                .with_param(Parameter::untyped())
                .with_body(MethodBody::new(code.finish().unwrap(), 1, 2)),
        );
        call_without_arguments(abc, callee)
    });
    assert_eq!(outcome, integration_tests::threw("ArgumentError #1063"));
}

#[test]
fn test_recursive_fibonacci() {
    let outcome = run_both(&|abc| {
        let fib = abc.public_name("fib");
        let mut body = CodeBuilder::new();
        let base = body.new_label();
        body.get_local(1).push_byte(2).branch(Opcode::IfLt, base);
        body.op_u30(Opcode::FindPropStrict, fib).get_local(1).op(Opcode::Decrement);
        body.op_u30x2(Opcode::CallProperty, fib, 1);
        body.op_u30(Opcode::FindPropStrict, fib).get_local(1).push_byte(2).op(Opcode::Subtract);
        body.op_u30x2(Opcode::CallProperty, fib, 1);
        body.op(Opcode::Add).op(Opcode::ReturnValue);
        body.bind(base).get_local(1).op(Opcode::ReturnValue);
        let method = abc.method(
            MethodInfo::new(0)
                .with_name("fib")
                .with_param(Parameter::untyped())
                .with_body(MethodBody::new(body.finish().unwrap(), 4, 2)),
        );

        let mut code = CodeBuilder::new();
        code.op(Opcode::GetGlobalScope).op_u30(Opcode::NewFunction, method).op_u30(Opcode::SetProperty, fib);
        code.op_u30(Opcode::FindPropStrict, fib).push_byte(10).op_u30x2(Opcode::CallProperty, fib, 1);
        code.op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(55)"));
}

#[test]
fn test_rest_arguments_collected() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.get_local(1).op(Opcode::ReturnValue);
        let callee = abc.method(
            MethodInfo::new(0)
                .with_name("rest")
                .with_flags(bytecode_system::MethodFlags {
                    needs_rest: true,
                    ..Default::default()
                })
                .with_body(MethodBody::new(code.finish().unwrap(), 1, 2)),
        );
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::NewFunction, callee).op(Opcode::PushNull);
        code.push_byte(1).push_byte(2).push_byte(3).op_u30(Opcode::Call, 3).op(Opcode::ReturnValue);
        entry(abc, &code, 5, 1)
    });
    assert_eq!(outcome, returned("[Int(1), Int(2), Int(3)]"));
}

#[test]
fn test_activation_object_holds_slots() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.op(Opcode::NewActivation).set_local(1);
        code.get_local(1).push_byte(21).op_u30(Opcode::SetSlot, 1);
        code.get_local(1).op_u30(Opcode::GetSlot, 1).op(Opcode::Dup).op(Opcode::Add);
        code.op(Opcode::ReturnValue);
        entry(abc, &code, 2, 2)
    });
    assert_eq!(outcome, returned("Int(42)"));
}

/// `main` pushes `receiver` and one argument, then calls `callee` by
/// method index
fn call_static(abc: &mut AbcBuilder, receiver: Opcode, argument: i8) -> u32 {
    let mut callee_code = CodeBuilder::new();
    callee_code.get_local(1).push_byte(1).op(Opcode::Add).op(Opcode::ReturnValue);
    let callee = abc.method(
        MethodInfo::new(0)
            .with_name("increment")
            .with_param(Parameter::untyped())
            .with_body(MethodBody::new(callee_code.finish().unwrap(), 2, 2)),
    );
    let mut code = CodeBuilder::new();
    code.op(receiver).push_byte(argument).op_u30x2(Opcode::CallStatic, callee, 1).op(Opcode::ReturnValue);
    entry(abc, &code, 2, 1)
}

#[test]
fn test_call_static_invokes_method_by_index() {
    let outcome = run_both(&|abc| call_static(abc, Opcode::PushTrue, 41));
    assert_eq!(outcome, returned("Int(42)"));
}

#[test]
fn test_call_static_passes_the_receiver() {
    let outcome = run_both(&|abc| {
        let mut callee_code = CodeBuilder::new();
        callee_code.get_local(0).op(Opcode::ReturnValue);
        let callee = abc.method(
            MethodInfo::new(0)
                .with_name("receiver")
                .with_param(Parameter::untyped())
                .with_body(MethodBody::new(callee_code.finish().unwrap(), 1, 2)),
        );
        let mut code = CodeBuilder::new();
        code.push_byte(7).push_byte(0).op_u30x2(Opcode::CallStatic, callee, 1).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(7)"));
}

#[test]
fn test_call_static_on_null_receiver() {
    let outcome = run_both(&|abc| call_static(abc, Opcode::PushNull, 1));
    assert_eq!(outcome, threw("TypeError #1009"));
}

#[test]
fn test_call_static_on_undefined_receiver() {
    let outcome = run_both(&|abc| call_static(abc, Opcode::PushUndefined, 1));
    assert_eq!(outcome, threw("TypeError #1010"));
}
