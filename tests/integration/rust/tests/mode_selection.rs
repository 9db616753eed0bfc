//! Execution mode selection across both modes: compile-once caching,
//! fallbacks, thresholds, recursion limits and method hooks

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{AbcBuilder, CodeBuilder, CompilationState, MethodBody, MethodInfo, MethodOwner, Opcode};
use core_types::{ErrorKind, Value};
use integration_tests::{compiled, describe, entry, interpreted, run_with, threw, Outcome};
use interpreter::{HookPlace, ObjectHeap, ObjectModel, Scope};
use jit_compiler::{Engine, EngineConfig};

fn add_body() -> MethodBody {
    let mut code = CodeBuilder::new();
    code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
    MethodBody::new(code.finish().unwrap(), 2, 1)
}

fn unsupported(abc: &mut AbcBuilder) -> u32 {
    let mut code = CodeBuilder::new();
    code.push_byte(0).op(Opcode::Lf64).op(Opcode::ReturnValue);
    entry(abc, &code, 1, 1)
}

#[test]
fn test_compiles_once_and_reuses_the_routine() {
    let heap = Rc::new(ObjectHeap::new());
    let engine = Engine::new(EngineConfig::default().with_script_scope_interpreted(false));
    let cx = engine.bind(heap.clone());
    let mut abc = AbcBuilder::new();
    let index = abc.method(MethodInfo::new(0).with_name("add").with_body(add_body()));
    let file = abc.build();
    let method = file.method(index).unwrap();
    let scope = Scope::global(heap.global());

    for _ in 0..3 {
        assert_eq!(cx.invoke(method, &scope, Value::Undefined, &[]).unwrap(), Value::Int(5));
    }
    let first = method.compilation().routine().cloned().unwrap();
    cx.invoke(method, &scope, Value::Undefined, &[]).unwrap();
    assert!(Rc::ptr_eq(&first, method.compilation().routine().unwrap()));
    assert_eq!(engine.stats().functions_compiled, 1);
}

#[test]
fn test_compiling_state_falls_back_to_interpreter() {
    let heap = Rc::new(ObjectHeap::new());
    let cx = Engine::context(heap.clone(), EngineConfig::compiler_only());
    let mut abc = AbcBuilder::new();
    let index = abc.method(MethodInfo::new(0).with_name("add").with_body(add_body()));
    let file = abc.build();
    let method = file.method(index).unwrap();
    assert!(method.compilation().begin());

    let scope = Scope::global(heap.global());
    assert_eq!(cx.invoke(method, &scope, Value::Undefined, &[]).unwrap(), Value::Int(5));
    assert_eq!(method.compilation().state(), CompilationState::Compiling);
}

#[test]
fn test_compile_failure_without_fallback_is_verify_error() {
    let run = run_with(EngineConfig::compiler_only(), &unsupported);
    assert_eq!(run.state, CompilationState::Failed);
    assert_eq!(run.outcome, threw("VerifyError #1011"));
}

#[test]
fn test_compile_failure_falls_back_to_interpreter() {
    let run = compiled(&unsupported);
    assert_eq!(run.state, CompilationState::Failed);
    // The interpreter raises the same classification when it reaches the opcode
    assert_eq!(run.outcome, interpreted(&unsupported).outcome);
}

#[test]
fn test_threshold_interprets_early_calls() {
    let heap = Rc::new(ObjectHeap::new());
    let config = EngineConfig::default()
        .with_script_scope_interpreted(false)
        .with_compile_threshold(3);
    let cx = Engine::context(heap.clone(), config);
    let mut abc = AbcBuilder::new();
    let index = abc.method(MethodInfo::new(0).with_name("add").with_body(add_body()));
    let file = abc.build();
    let method = file.method(index).unwrap();
    let scope = Scope::global(heap.global());

    for _ in 0..3 {
        cx.invoke(method, &scope, Value::Undefined, &[]).unwrap();
    }
    assert_eq!(method.compilation().state(), CompilationState::Pending);
    assert_eq!(method.compilation().calls(), 3);
    cx.invoke(method, &scope, Value::Undefined, &[]).unwrap();
    assert_eq!(method.compilation().state(), CompilationState::Compiled);
}

#[test]
fn test_script_scope_methods_stay_interpreted() {
    let run = run_with(EngineConfig::default(), &|abc| {
        abc.method(MethodInfo::new(0).with_name("add").with_body(add_body()))
    });
    assert_eq!(run.outcome, Outcome::Returned("Int(5)".into()));
    assert_eq!(run.state, CompilationState::Pending);
}

#[test]
fn test_method_without_body_returns_undefined_in_every_mode() {
    for config in [EngineConfig::default(), EngineConfig::compiler_only()] {
        let run = run_with(config, &|abc| abc.method(MethodInfo::new(0).with_name("native")));
        assert_eq!(run.outcome, Outcome::Returned("Undefined".into()));
        assert_eq!(run.state, CompilationState::Pending);
    }
}

/// Run a method that calls itself through a global property until the
/// call depth limit of `config` stops it
fn unbounded_recursion(config: EngineConfig) {
    let heap = Rc::new(ObjectHeap::new());
    let cx = Engine::context(heap.clone(), config);
    let mut abc = AbcBuilder::new();
    let recurse = abc.public_name("recurse");
    let mut code = CodeBuilder::new();
    code.op_u30(Opcode::FindPropStrict, recurse)
        .op_u30x2(Opcode::CallProperty, recurse, 0)
        .op(Opcode::ReturnValue);
    let index = abc.method(
        MethodInfo::new(0)
            .with_name("recurse")
            .with_body(MethodBody::new(code.finish().unwrap(), 1, 1)),
    );
    let file = abc.build();
    let method = file.method(index).unwrap();
    let scope = Scope::global(heap.global());
    let function = heap.create_function(&cx, method, &scope).unwrap();
    heap.define_global("recurse", function);

    let err = cx.invoke(method, &scope, Value::Undefined, &[]).unwrap_err();
    assert_eq!(describe(&heap, err.thrown().unwrap()), "RangeError #1023");
    assert_eq!(cx.call_depth(), 0);
    assert_eq!(cx.scope_stacks(), 0);
}

#[test]
fn test_recursion_limit_in_both_modes() {
    for config in [EngineConfig::interpreter_only(), EngineConfig::compiler_only()] {
        unbounded_recursion(config.with_max_call_depth(32));
    }
}

#[test]
fn test_default_recursion_limit_fits_the_test_thread_stack() {
    for config in [EngineConfig::interpreter_only(), EngineConfig::compiler_only(), EngineConfig::default()] {
        unbounded_recursion(config);
    }
}

#[test]
fn test_hooks_fire_in_both_modes() {
    for config in [EngineConfig::interpreter_only(), EngineConfig::compiler_only()] {
        let heap = Rc::new(ObjectHeap::new());
        let engine = Engine::new(config);
        let cx = engine.bind(heap.clone());
        let receivers = Rc::new(RefCell::new(Vec::new()));

        let log = receivers.clone();
        engine
            .attach_method_hook("game/Player/update", HookPlace::Begin, Rc::new(move |this: &Value| {
                log.borrow_mut().push(("begin", this.clone()))
            }))
            .unwrap();
        let log = receivers.clone();
        engine
            .attach_method_hook("game/Player/update", HookPlace::Return, Rc::new(move |this: &Value| {
                log.borrow_mut().push(("return", this.clone()))
            }))
            .unwrap();

        let mut abc = AbcBuilder::new();
        let index = abc.method(
            MethodInfo::new(0)
                .with_name("update")
                .with_owner(MethodOwner::Instance("game.Player".into()))
                .with_body(add_body()),
        );
        let file = abc.build();
        let scope = Scope::global(heap.global());
        cx.invoke(file.method(index).unwrap(), &scope, Value::Int(1), &[]).unwrap();
        assert_eq!(*receivers.borrow(), vec![("begin", Value::Int(1)), ("return", Value::Int(1))]);
    }
}

#[test]
fn test_return_hook_skipped_when_method_throws() {
    for config in [EngineConfig::interpreter_only(), EngineConfig::compiler_only()] {
        let heap = Rc::new(ObjectHeap::new());
        let engine = Engine::new(config);
        let cx = engine.bind(heap.clone());
        let fired = Rc::new(RefCell::new(0));
        let count = fired.clone();
        engine
            .attach_method_hook("__root__/fail", HookPlace::Return, Rc::new(move |_: &Value| *count.borrow_mut() += 1))
            .unwrap();

        let mut code = CodeBuilder::new();
        code.op(Opcode::PushNull).op(Opcode::ConvertO).op(Opcode::ReturnValue);
        let mut abc = AbcBuilder::new();
        let index = abc.method(
            MethodInfo::new(0)
                .with_name("fail")
                .with_body(MethodBody::new(code.finish().unwrap(), 1, 1)),
        );
        let file = abc.build();
        let scope = Scope::global(heap.global());
        let err = cx.invoke(file.method(index).unwrap(), &scope, Value::Undefined, &[]).unwrap_err();
        assert!(heap.is_error(err.thrown().unwrap(), ErrorKind::TypeError));
        assert_eq!(*fired.borrow(), 0);
    }
}

/// Two nulls, then `op` with raw operand bytes, then `RETURNVALUE`
fn raw_operand(op: Opcode, operand: &'static [u8]) -> impl Fn(&mut AbcBuilder) -> u32 {
    move |abc| {
        let mut code = CodeBuilder::new();
        code.op(Opcode::PushNull).op(Opcode::PushNull).op(op);
        for &byte in operand {
            code.u8(byte);
        }
        code.op(Opcode::ReturnValue);
        entry(abc, &code, 2, 1)
    }
}

#[test]
fn test_oversized_u30_operand_is_a_verify_error_in_every_mode() {
    for build in [
        raw_operand(Opcode::NewArray, &[0x80, 0x80, 0x80, 0x80, 0x08]),
        raw_operand(Opcode::Call, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
    ] {
        assert_eq!(interpreted(&build).outcome, threw("VerifyError #1011"));
        let run = compiled(&build);
        assert_eq!(run.state, CompilationState::Failed);
        assert_eq!(run.outcome, threw("VerifyError #1011"));
        assert_eq!(run_with(EngineConfig::compiler_only(), &build).outcome, threw("VerifyError #1011"));
    }
}

#[test]
fn test_operand_count_beyond_the_stack_fails_compilation_cleanly() {
    for build in [
        raw_operand(Opcode::NewObject, &[0xFF, 0xFF, 0xFF, 0xFF, 0x03]),
        raw_operand(Opcode::Call, &[0xFF, 0xFF, 0xFF, 0xFF, 0x03]),
    ] {
        let run = compiled(&build);
        assert_eq!(run.state, CompilationState::Failed);
        assert_eq!(run.outcome, interpreted(&build).outcome);
        assert_eq!(run_with(EngineConfig::compiler_only(), &build).outcome, threw("VerifyError #1011"));
    }
}
