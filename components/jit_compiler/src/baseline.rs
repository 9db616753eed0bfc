//! Baseline method compiler
//!
//! Runs the analysis pass and the codegen pass over one method body and
//! keeps running statistics.

use std::rc::Rc;
use std::time::Instant;

use bytecode_system::MethodInfo;
use interpreter::HookRegistry;

use crate::codegen::CodeGenerator;
use crate::compiled_code::CompiledRoutine;
use crate::error::CompileError;
use crate::ir;

/// Statistics for baseline compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineStats {
    /// Methods compiled successfully
    pub functions_compiled: u64,
    /// Methods that could not be compiled
    pub functions_failed: u64,
    /// Total compilation time (microseconds)
    pub total_compilation_time_us: u64,
    /// Steps emitted across all routines
    pub total_steps: usize,
}

/// Compiles method bodies into threaded-code routines
#[derive(Debug, Default)]
pub struct BaselineCompiler {
    stats: BaselineStats,
}

impl BaselineCompiler {
    /// Create a compiler with empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `method`.
    ///
    /// Hook slots for the method are looked up in `hooks` now and kept by the
    /// routine.
    ///
    /// # Example
    /// ```
    /// use std::rc::Rc;
    /// use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode};
    /// use interpreter::HookRegistry;
    /// use jit_compiler::BaselineCompiler;
    ///
    /// let mut code = CodeBuilder::new();
    /// code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
    /// let mut abc = AbcBuilder::new();
    /// let index = abc.method(MethodInfo::new(0).with_body(MethodBody::new(code.finish().unwrap(), 2, 1)));
    /// let file = abc.build();
    ///
    /// let mut compiler = BaselineCompiler::new();
    /// let routine = compiler.compile(file.method(index).unwrap(), &HookRegistry::new()).unwrap();
    /// assert_eq!(routine.step_count(), 4);
    /// ```
    pub fn compile(&mut self, method: &Rc<MethodInfo>, hooks: &HookRegistry) -> Result<CompiledRoutine, CompileError> {
        let started = Instant::now();
        let result = Self::lower(method, hooks);
        self.stats.total_compilation_time_us += started.elapsed().as_micros() as u64;
        match &result {
            Ok(routine) => {
                self.stats.functions_compiled += 1;
                self.stats.total_steps += routine.step_count();
            }
            Err(_) => self.stats.functions_failed += 1,
        }
        result
    }

    fn lower(method: &Rc<MethodInfo>, hooks: &HookRegistry) -> Result<CompiledRoutine, CompileError> {
        if method.body.is_none() {
            return Err(CompileError::NoBody);
        }
        let abc = method.abc()?;
        let analysis = ir::analyze(&abc, method)?;
        CodeGenerator::new(&abc, method).generate(&analysis, hooks)
    }

    /// Get compilation statistics
    pub fn stats(&self) -> &BaselineStats {
        &self.stats
    }

    /// Reset compilation statistics
    pub fn reset_stats(&mut self) {
        self.stats = BaselineStats::default();
    }
}
