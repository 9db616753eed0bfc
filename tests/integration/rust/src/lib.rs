//! Integration test support for the AVM2 execution engine
//!
//! Every scenario is a closure that assembles a method into a fresh
//! [`AbcBuilder`]. [`run_both`] executes it once interpreted and once
//! compiled, each against its own [`ObjectHeap`], and reports outcomes in a
//! heap-independent form so the two modes can be compared.

use std::fmt;
use std::rc::Rc;

use bytecode_system::{AbcBuilder, CodeBuilder, CompilationState, MethodBody, MethodInfo};
use core_types::{Value, VmError};
use interpreter::{ObjectHeap, Scope};
use jit_compiler::{Engine, EngineConfig};

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use jit_compiler;
}

/// Result of one top-level invocation, described without heap handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Normal return
    Returned(String),
    /// Uncaught exception
    Threw(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Returned(value) => write!(f, "returned {}", value),
            Outcome::Threw(value) => write!(f, "threw {}", value),
        }
    }
}

/// One execution of a scenario
#[derive(Debug)]
pub struct Run {
    /// What came out
    pub outcome: Outcome,
    /// Compilation state of the entry method afterwards
    pub state: CompilationState,
    /// Call depth after returning
    pub call_depth: usize,
    /// Live scope stacks after returning
    pub scope_stacks: usize,
}

/// Add `code` as the entry method `main` and return its index
pub fn entry(abc: &mut AbcBuilder, code: &CodeBuilder, max_stack: usize, locals: usize) -> u32 {
    let body = MethodBody::new(code.finish().expect("assembled code"), max_stack, locals).with_scope_depth(0, 4);
    abc.method(MethodInfo::new(0).with_name("main").with_body(body))
}

/// Describe `value` so that equal results from different heaps compare equal
pub fn describe(heap: &ObjectHeap, value: &Value) -> String {
    match value {
        Value::Object(_) => {
            if let Some(elements) = heap.array_elements(value) {
                let parts: Vec<String> = elements.iter().map(|element| describe(heap, element)).collect();
                return format!("[{}]", parts.join(", "));
            }
            let class = heap.class_name(value).map_or_else(|| "Object".to_string(), |name| name.to_string());
            match heap.error_code(value) {
                Some(code) => format!("{} #{}", class, code),
                None => format!("<{}>", class),
            }
        }
        other => format!("{:?}", other),
    }
}

/// Run a scenario with `config`
///
/// `build` adds its methods to the builder and returns the entry method.
/// The entry method runs with the script scope as its saved scope.
pub fn run_with(config: EngineConfig, build: &dyn Fn(&mut AbcBuilder) -> u32) -> Run {
    let heap = Rc::new(ObjectHeap::new());
    let engine = Engine::new(config);
    let cx = engine.bind(heap.clone());
    let mut abc = AbcBuilder::new();
    let index = build(&mut abc);
    let file = abc.build();
    let method = file.method(index).expect("entry method");
    let scope = Scope::global(heap.global());
    let outcome = match cx.invoke(method, &scope, Value::Undefined, &[]) {
        Ok(value) => Outcome::Returned(describe(&heap, &value)),
        Err(VmError::Throw(value)) => Outcome::Threw(describe(&heap, &value)),
        Err(VmError::Fault(fault)) => panic!("fault escaped the engine: {}", fault),
    };
    Run {
        outcome,
        state: method.compilation().state(),
        call_depth: cx.call_depth(),
        scope_stacks: cx.scope_stacks(),
    }
}

/// Interpreted run
pub fn interpreted(build: &dyn Fn(&mut AbcBuilder) -> u32) -> Run {
    run_with(EngineConfig::interpreter_only(), build)
}

/// Compiled run; the entry method is compiled even though it runs in the
/// script scope
pub fn compiled(build: &dyn Fn(&mut AbcBuilder) -> u32) -> Run {
    run_with(
        EngineConfig::default().with_script_scope_interpreted(false),
        build,
    )
}

/// Run in both modes, assert the outcomes agree and return the shared one
pub fn run_both(build: &dyn Fn(&mut AbcBuilder) -> u32) -> Outcome {
    let interpreted = interpreted(build);
    let compiled = compiled(build);
    assert_eq!(interpreted.state, CompilationState::Pending);
    assert_eq!(compiled.state, CompilationState::Compiled, "entry method was not compiled");
    assert_eq!(interpreted.outcome, compiled.outcome, "modes disagree");
    for run in [&interpreted, &compiled] {
        assert_eq!(run.call_depth, 0);
        assert_eq!(run.scope_stacks, 0);
    }
    interpreted.outcome
}

/// `Outcome::Returned` of a described value
pub fn returned(described: &str) -> Outcome {
    Outcome::Returned(described.to_string())
}

/// `Outcome::Threw` of a described value
pub fn threw(described: &str) -> Outcome {
    Outcome::Threw(described.to_string())
}
