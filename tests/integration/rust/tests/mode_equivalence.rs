//! Interpreter/compiler equivalence
//!
//! Each body runs interpreted and compiled; `run_both` fails the test when
//! the two disagree on the returned value or on the thrown error.

use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode, Parameter};
use integration_tests::{entry, returned, run_both, threw};

fn binary(a: i8, b: i8, op: Opcode) -> impl Fn(&mut AbcBuilder) -> u32 {
    move |abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(a).push_byte(b).op(op).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    }
}

// ============================================================================
// Arithmetic and conversions
// ============================================================================

#[test]
fn test_integer_arithmetic() {
    assert_eq!(run_both(&binary(2, 3, Opcode::Add)), returned("Int(5)"));
    assert_eq!(run_both(&binary(2, 5, Opcode::Subtract)), returned("Int(-3)"));
    assert_eq!(run_both(&binary(6, 7, Opcode::Multiply)), returned("Int(42)"));
    assert_eq!(run_both(&binary(7, 2, Opcode::Divide)), returned("Number(3.5)"));
    assert_eq!(run_both(&binary(7, 3, Opcode::Modulo)), returned("Int(1)"));
}

#[test]
fn test_numeric_edge_cases() {
    assert_eq!(run_both(&binary(1, 0, Opcode::Divide)), returned("Number(inf)"));
    assert_eq!(run_both(&binary(0, 0, Opcode::Modulo)), returned("Number(NaN)"));
    run_both(&binary(-1, 0, Opcode::Divide));
}

#[test]
fn test_bitwise_and_shift_operators() {
    for op in [
        Opcode::BitAnd,
        Opcode::BitOr,
        Opcode::BitXor,
        Opcode::LShift,
        Opcode::RShift,
        Opcode::URShift,
        Opcode::AddI,
        Opcode::SubtractI,
        Opcode::MultiplyI,
    ] {
        run_both(&binary(-7, 3, op));
    }
    assert_eq!(run_both(&binary(6, 3, Opcode::BitXor)), returned("Int(5)"));
}

#[test]
fn test_comparisons() {
    assert_eq!(run_both(&binary(1, 2, Opcode::LessThan)), returned("Boolean(true)"));
    assert_eq!(run_both(&binary(2, 2, Opcode::LessEquals)), returned("Boolean(true)"));
    assert_eq!(run_both(&binary(1, 2, Opcode::GreaterThan)), returned("Boolean(false)"));
    assert_eq!(run_both(&binary(3, 3, Opcode::StrictEquals)), returned("Boolean(true)"));
    run_both(&binary(3, 4, Opcode::Equals));
    run_both(&binary(3, 4, Opcode::GreaterEquals));
}

#[test]
fn test_string_concatenation() {
    let outcome = run_both(&|abc| {
        let a = abc.string("a");
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::PushString, a).push_byte(1).op(Opcode::Add).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("String(\"a1\")"));
}

#[test]
fn test_unary_operators() {
    for op in [
        Opcode::Negate,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::IncrementI,
        Opcode::DecrementI,
        Opcode::NegateI,
        Opcode::Not,
        Opcode::BitNot,
        Opcode::TypeOf,
        Opcode::ConvertS,
        Opcode::ConvertI,
        Opcode::ConvertU,
        Opcode::ConvertD,
        Opcode::ConvertB,
        Opcode::CoerceS,
        Opcode::CoerceA,
    ] {
        run_both(&move |abc| {
            let mut code = CodeBuilder::new();
            code.push_byte(-5).op(op).op(Opcode::ReturnValue);
            entry(abc, &code, 1, 1)
        });
    }
}

#[test]
fn test_coerce_s_and_convert_s_differ_on_null() {
    let with = |op: Opcode| {
        move |abc: &mut AbcBuilder| {
            let mut code = CodeBuilder::new();
            code.op(Opcode::PushNull).op(op).op(Opcode::ReturnValue);
            entry(abc, &code, 1, 1)
        }
    };
    assert_eq!(run_both(&with(Opcode::CoerceS)), returned("Null"));
    assert_eq!(run_both(&with(Opcode::ConvertS)), returned("String(\"null\")"));
}

#[test]
fn test_conversion_of_null_object_is_type_error() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.op(Opcode::PushNull).op(Opcode::ConvertO).op(Opcode::ReturnValue);
        entry(abc, &code, 1, 1)
    });
    assert_eq!(outcome, threw("TypeError #1009"));
}

// ============================================================================
// Stack, locals and control flow
// ============================================================================

#[test]
fn test_stack_manipulation() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(10).push_byte(3).op(Opcode::Swap).op(Opcode::Subtract);
        code.op(Opcode::Dup).op(Opcode::Multiply).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(49)"));
}

#[test]
fn test_locals_and_kill() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(4).set_local(1).op_u30(Opcode::IncLocal, 1).op_u30(Opcode::IncLocalI, 1);
        code.get_local(1).set_local(5).op_u30(Opcode::Kill, 1);
        code.get_local(5).get_local(1).op(Opcode::Add).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 6)
    });
    // undefined converts to NaN
    assert_eq!(outcome, returned("Number(NaN)"));
}

#[test]
fn test_every_conditional_branch() {
    let branches = [
        Opcode::IfEq,
        Opcode::IfNe,
        Opcode::IfLt,
        Opcode::IfLe,
        Opcode::IfGt,
        Opcode::IfGe,
        Opcode::IfNlt,
        Opcode::IfNle,
        Opcode::IfNgt,
        Opcode::IfNge,
        Opcode::IfStrictEq,
        Opcode::IfStrictNe,
    ];
    for op in branches {
        for (a, b) in [(1, 2), (2, 1), (2, 2)] {
            run_both(&move |abc| {
                let mut code = CodeBuilder::new();
                let taken = code.new_label();
                code.push_byte(a).push_byte(b).branch(op, taken);
                code.push_byte(0).op(Opcode::ReturnValue);
                code.bind(taken).push_byte(1).op(Opcode::ReturnValue);
                entry(abc, &code, 2, 1)
            });
        }
    }
}

#[test]
fn test_nan_comparisons_branch_on_negated_forms() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        let taken = code.new_label();
        code.op(Opcode::PushNaN).push_byte(1).branch(Opcode::IfNlt, taken);
        code.push_byte(0).op(Opcode::ReturnValue);
        code.bind(taken).push_byte(1).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(1)"));
}

#[test]
fn test_jump_skips_code() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        let over = code.new_label();
        code.push_byte(1).branch(Opcode::Jump, over);
        code.op(Opcode::Pop).push_byte(2);
        code.bind(over).op(Opcode::ReturnValue);
        entry(abc, &code, 1, 1)
    });
    assert_eq!(outcome, returned("Int(1)"));
}

#[test]
fn test_factorial_loop() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        let (top, done) = (code.new_label(), code.new_label());
        code.push_byte(1).set_local(1).push_byte(6).set_local(2);
        code.bind(top).get_local(2).push_byte(1).branch(Opcode::IfLe, done);
        code.get_local(1).get_local(2).op(Opcode::Multiply).set_local(1);
        code.op_u30(Opcode::DecLocal, 2).branch(Opcode::Jump, top);
        code.bind(done).get_local(1).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 3)
    });
    assert_eq!(outcome, returned("Int(720)"));
}

#[test]
fn test_lookup_switch_cases() {
    for index in [-1, 0, 1, 2, 3] {
        run_both(&move |abc| {
            let mut code = CodeBuilder::new();
            let cases = [code.new_label(), code.new_label(), code.new_label()];
            let default = code.new_label();
            code.push_byte(index).lookup_switch(default, &cases);
            for (n, case) in cases.iter().enumerate() {
                code.bind(*case).push_byte(n as i8 * 10).op(Opcode::ReturnValue);
            }
            code.bind(default).push_byte(-1).op(Opcode::ReturnValue);
            entry(abc, &code, 1, 1)
        });
    }
}

// ============================================================================
// Objects, arrays and calls
// ============================================================================

#[test]
fn test_new_array() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(1).push_byte(2).push_byte(3).op_u30(Opcode::NewArray, 3).op(Opcode::ReturnValue);
        entry(abc, &code, 3, 1)
    });
    assert_eq!(outcome, returned("[Int(1), Int(2), Int(3)]"));
}

#[test]
fn test_new_object_keeps_last_duplicate_key() {
    let outcome = run_both(&|abc| {
        let key = abc.string("x");
        let name = abc.public_name("x");
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::PushString, key).push_byte(1);
        code.op_u30(Opcode::PushString, key).push_byte(2);
        code.op_u30(Opcode::NewObject, 2).op_u30(Opcode::GetProperty, name).op(Opcode::ReturnValue);
        entry(abc, &code, 4, 1)
    });
    assert_eq!(outcome, returned("Int(2)"));
}

#[test]
fn test_property_round_trip() {
    let outcome = run_both(&|abc| {
        let name = abc.public_name("count");
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::NewObject, 0).set_local(1);
        code.get_local(1).push_byte(9).op_u30(Opcode::SetProperty, name);
        code.get_local(1).op_u30(Opcode::GetProperty, name).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 2)
    });
    assert_eq!(outcome, returned("Int(9)"));
}

#[test]
fn test_property_of_null_is_type_error() {
    let outcome = run_both(&|abc| {
        let name = abc.public_name("count");
        let mut code = CodeBuilder::new();
        code.op(Opcode::PushNull).op_u30(Opcode::GetProperty, name).op(Opcode::ReturnValue);
        entry(abc, &code, 1, 1)
    });
    assert_eq!(outcome, threw("TypeError #1009"));
}

#[test]
fn test_undefined_variable_is_reference_error() {
    let outcome = run_both(&|abc| {
        let name = abc.public_name("nowhere");
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::GetLex, name).op(Opcode::ReturnValue);
        entry(abc, &code, 1, 1)
    });
    assert_eq!(outcome, threw("ReferenceError #1065"));
}

#[test]
fn test_call_of_non_function() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        code.push_byte(1).op(Opcode::PushNull).op_u30(Opcode::Call, 0).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, threw("TypeError #1006"));
}

#[test]
fn test_call_of_script_function() {
    let outcome = run_both(&|abc| {
        let mut callee = CodeBuilder::new();
        callee.get_local(1).get_local(2).op(Opcode::Multiply).op(Opcode::ReturnValue);
        let body = MethodBody::new(callee.finish().unwrap(), 2, 3);
        let method = abc.method(
            MethodInfo::new(0)
                .with_name("product")
                .with_param(Parameter::untyped())
                .with_param(Parameter::untyped())
                .with_body(body),
        );
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::NewFunction, method).op(Opcode::PushNull).push_byte(6).push_byte(7);
        code.op_u30(Opcode::Call, 2).op(Opcode::ReturnValue);
        entry(abc, &code, 4, 1)
    });
    assert_eq!(outcome, returned("Int(42)"));
}

#[test]
fn test_scope_chain_lookup_through_with() {
    let outcome = run_both(&|abc| {
        let key = abc.string("depth");
        let name = abc.public_name("depth");
        let mut code = CodeBuilder::new();
        code.op_u30(Opcode::PushString, key).push_byte(3).op_u30(Opcode::NewObject, 1);
        code.op(Opcode::PushWith);
        code.op_u30(Opcode::FindPropStrict, name).op_u30(Opcode::GetProperty, name);
        code.op(Opcode::PopScope).op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    });
    assert_eq!(outcome, returned("Int(3)"));
}

#[test]
fn test_enumeration_with_has_next2() {
    let outcome = run_both(&|abc| {
        let mut code = CodeBuilder::new();
        let (top, done) = (code.new_label(), code.new_label());
        code.push_byte(4).push_byte(5).op_u30(Opcode::NewArray, 2).set_local(1);
        code.push_byte(0).set_local(2).push_byte(0).set_local(3);
        code.bind(top).op_u30x2(Opcode::HasNext2, 1, 2).branch(Opcode::IfFalse, done);
        code.get_local(3).get_local(1).get_local(2).op(Opcode::NextValue).op(Opcode::Add).set_local(3);
        code.branch(Opcode::Jump, top);
        code.bind(done).get_local(3).op(Opcode::ReturnValue);
        entry(abc, &code, 3, 4)
    });
    assert_eq!(outcome, returned("Int(9)"));
}
