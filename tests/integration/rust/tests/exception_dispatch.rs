//! Exception region dispatch in both modes
//!
//! Covers the handler entry state, first-match selection, typed filters,
//! faults classified at the throw site and unwinding across frames.

use std::rc::Rc;

use bytecode_system::{AbcBuilder, CodeBuilder, ExceptionInfo, MethodBody, MethodInfo, Multiname, Opcode};
use integration_tests::{returned, run_both, threw};

fn main_with(abc: &mut AbcBuilder, code: &CodeBuilder, max_stack: usize, regions: Vec<ExceptionInfo>) -> u32 {
    let mut body = MethodBody::new(code.finish().unwrap(), max_stack, 2).with_scope_depth(0, 2);
    for region in regions {
        body = body.with_exception(region);
    }
    abc.method(MethodInfo::new(0).with_name("main").with_body(body))
}

fn type_name(name: &str) -> Rc<Multiname> {
    Rc::new(Multiname::public_qname(name))
}

#[test]
fn test_throw_resumes_at_handler_with_value_as_sole_entry() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(7).op(Opcode::Throw);
        while code.position() < 10 {
            code.op(Opcode::Nop);
        }
        code.op(Opcode::ReturnValue);
        main_with(abc, &code, 1, vec![ExceptionInfo::catch_all(0, 4, 10)])
    });
    assert_eq!(outcome, returned("Int(7)"));
}

#[test]
fn test_deeper_stack_is_discarded_on_entry() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(1).push_byte(2).push_byte(3).op(Opcode::Throw);
        let target = code.position();
        code.op(Opcode::ReturnValue);
        main_with(abc, &code, 3, vec![ExceptionInfo::catch_all(0, target, target)])
    });
    assert_eq!(outcome, returned("Int(3)"));
}

#[test]
fn test_first_matching_region_in_declaration_order() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(5).op(Opcode::Throw);
        let end = code.position();
        let typed = code.position();
        code.op(Opcode::Pop).push_byte(1).op(Opcode::ReturnValue);
        let first = code.position();
        code.op(Opcode::Pop).push_byte(2).op(Opcode::ReturnValue);
        let second = code.position();
        code.op(Opcode::Pop).push_byte(3).op(Opcode::ReturnValue);
        main_with(
            abc,
            &code,
            1,
            vec![
                ExceptionInfo::typed(0, end, typed, type_name("RangeError")),
                ExceptionInfo::catch_all(0, end, first),
                ExceptionInfo::catch_all(0, end, second),
            ],
        )
    });
    assert_eq!(outcome, returned("Int(2)"));
}

#[test]
fn test_typed_region_matches_classified_fault() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.op(Opcode::PushNull).op(Opcode::ConvertO);
        let end = code.position();
        code.op(Opcode::ReturnValue);
        let range = code.position();
        code.op(Opcode::Pop).push_byte(1).op(Opcode::ReturnValue);
        let type_error = code.position();
        code.op(Opcode::ReturnValue);
        main_with(
            abc,
            &code,
            1,
            vec![
                ExceptionInfo::typed(0, end, range, type_name("RangeError")),
                ExceptionInfo::typed(0, end, type_error, type_name("TypeError")),
            ],
        )
    });
    assert_eq!(outcome, returned("TypeError #1009"));
}

#[test]
fn test_site_outside_every_region_propagates() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.op(Opcode::Nop).op(Opcode::Nop);
        code.push_byte(4).op(Opcode::Throw);
        let target = code.position();
        code.op(Opcode::ReturnValue);
        main_with(abc, &code, 1, vec![ExceptionInfo::catch_all(0, 2, target)])
    });
    assert_eq!(outcome, threw("Int(4)"));
}

#[test]
fn test_handler_can_rethrow() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(1).op(Opcode::Throw);
        let inner_end = code.position();
        let inner = code.position();
        code.push_byte(10).op(Opcode::Add).op(Opcode::Throw);
        let outer_end = code.position();
        let outer = code.position();
        code.op(Opcode::ReturnValue);
        main_with(
            abc,
            &code,
            2,
            vec![
                ExceptionInfo::catch_all(0, inner_end, inner),
                ExceptionInfo::catch_all(0, outer_end, outer),
            ],
        )
    });
    assert_eq!(outcome, returned("Int(11)"));
}

#[test]
fn test_callee_exception_unwinds_into_caller_handler() {
    let outcome = run_both(&|abc| {
        let mut callee = CodeBuilder::new();
        callee.op(Opcode::PushNull).op(Opcode::Throw);
        let thrower = abc.method(
            MethodInfo::new(0)
                .with_name("thrower")
                .with_body(MethodBody::new(callee.finish().unwrap(), 1, 1)),
        );
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::NewFunction, thrower).op(Opcode::PushNull).op_u30(Opcode::Call, 0);
        let end = code.position();
        code.op(Opcode::ReturnValue);
        let target = code.position();
        code.op(Opcode::Pop).push_byte(99).op(Opcode::ReturnValue);
        main_with(abc, &code, 2, vec![ExceptionInfo::catch_all(0, end, target)])
    });
    assert_eq!(outcome, returned("Int(99)"));
}

#[test]
fn test_catch_scope_object_receives_exception() {
    let outcome = run_both(&|abc| {
        let name = abc.public_name("e");
        let mut code = CodeBuilder::new();
        code.push_byte(8).op(Opcode::Throw);
        let target = code.position();
        code.set_local(1).op_u30(Opcode::NewCatch, 0).op(Opcode::Dup).op(Opcode::PushScope);
        code.get_local(1).op_u30(Opcode::SetProperty, name);
        code.op_u30(Opcode::FindPropStrict, name).op_u30(Opcode::GetProperty, name);
        code.op(Opcode::PopScope).op(Opcode::ReturnValue);
        let region = ExceptionInfo {
            var_name: Some(type_name("e")),
            ..ExceptionInfo::catch_all(0, target, target)
        };
        let body = MethodBody::new(code.finish().unwrap(), 2, 2).with_scope_depth(0, 2).with_exception(region);
        abc.method(MethodInfo::new(0).with_name("main").with_body(body))
    });
    assert_eq!(outcome, returned("Int(8)"));
}
