//! Compiled routines
//!
//! A routine is threaded code: one boxed closure per reachable instruction,
//! working on an [`Activation`] whose operand stack slots are addressed by
//! the static depths found during analysis. Routines with branches or
//! exception regions are split into blocks keyed by their start position.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bytecode_system::{AbcFile, ExceptionInfo, MethodInfo, Multiname, Opcode, ResolvedName};
use core_types::{Fault, Value, VmError};
use interpreter::normalize::{classify, FaultSite};
use interpreter::{operations, select_handler, ExecutionContext, HookSlot, Scope, ScopeStack};

/// State of one compiled invocation
pub struct Activation {
    /// Operand stack slots, `max_stack` of them
    pub stack: Vec<Value>,
    /// Locals; local 0 is the receiver
    pub locals: Vec<Value>,
    /// Scope stack over the saved scope
    pub scopes: ScopeStack,
    /// Scratch record for names with runtime parts
    pub rn: ResolvedName,
    /// Method being executed
    pub method: Rc<MethodInfo>,
    /// Container of the method, for constant pool lookups
    pub abc: Rc<AbcFile>,
}

impl Activation {
    /// Saved scope of the method
    pub fn saved_scope(&self) -> &Rc<Scope> {
        self.scopes.parent()
    }

    /// Move the values in `from..to` out of the stack, deepest first
    pub fn take_range(&mut self, from: usize, to: usize) -> Vec<Value> {
        self.stack[from..to].iter_mut().map(std::mem::take).collect()
    }

    fn receiver(&self) -> &Value {
        &self.locals[0]
    }

    fn enter_handler(&mut self, exception: Value) {
        self.stack.iter_mut().for_each(|slot| *slot = Value::Undefined);
        self.stack[0] = exception;
        self.scopes.clear();
    }
}

/// What to do after a step
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Continue with the following instruction
    Next,
    /// Continue at a position
    Jump(usize),
    /// Leave the routine
    Return(Value),
}

/// Executable body of one step
pub type StepFn = Box<dyn Fn(&ExecutionContext, &mut Activation) -> Result<Flow, VmError>>;

/// One compiled instruction
pub struct Step {
    /// Position of the source instruction
    pub position: usize,
    /// Position of the instruction after it
    pub next_position: usize,
    /// Source opcode
    pub opcode: Opcode,
    /// Regions containing the position, in declaration order
    pub guard: Rc<[usize]>,
    exec: StepFn,
}

impl Step {
    /// Wrap a step body
    pub fn new(position: usize, next_position: usize, opcode: Opcode, guard: Rc<[usize]>, exec: StepFn) -> Self {
        Self {
            position,
            next_position,
            opcode,
            guard,
            exec,
        }
    }

    fn run(&self, cx: &ExecutionContext, act: &mut Activation) -> Result<Flow, VmError> {
        (self.exec)(cx, act).map_err(|err| {
            if err.is_verify() {
                err
            } else {
                classify(cx, err, &FaultSite::new(self.opcode))
            }
        })
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("position", &self.position)
            .field("opcode", &self.opcode)
            .field("guard", &self.guard)
            .finish()
    }
}

/// Steps starting at a jump target
#[derive(Debug)]
pub struct Block {
    /// Position of the first step
    pub start: usize,
    /// Steps in code order
    pub steps: Vec<Step>,
}

/// Layout of a routine's steps
#[derive(Debug)]
pub enum Shape {
    /// One ordered step list
    Straight(Vec<Step>),
    /// Blocks with a table from start position to block index
    Dispatch {
        /// Blocks in code order
        blocks: Vec<Block>,
        /// Start position to block index
        table: HashMap<usize, usize>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    block: usize,
    step: usize,
}

impl Shape {
    fn entry(&self) -> Cursor {
        Cursor { block: 0, step: 0 }
    }

    fn step(&self, at: Cursor) -> Option<&Step> {
        match self {
            Shape::Straight(steps) => steps.get(at.step),
            Shape::Dispatch { blocks, .. } => blocks.get(at.block).and_then(|block| block.steps.get(at.step)),
        }
    }

    fn locate(&self, position: usize) -> Option<Cursor> {
        match self {
            Shape::Straight(steps) => steps
                .binary_search_by_key(&position, |step| step.position)
                .ok()
                .map(|step| Cursor { block: 0, step }),
            Shape::Dispatch { table, .. } => table.get(&position).map(|&block| Cursor { block, step: 0 }),
        }
    }

    fn advance(&self, at: Cursor, current: &Step) -> Option<Cursor> {
        let next = Cursor {
            block: at.block,
            step: at.step + 1,
        };
        if self.step(next).is_some() {
            return Some(next);
        }
        match self {
            Shape::Straight(_) => None,
            Shape::Dispatch { .. } => self.locate(current.next_position),
        }
    }
}

/// Threaded-code equivalent of one method body
pub struct CompiledRoutine {
    shape: Shape,
    names: Vec<Rc<Multiname>>,
    regions: Vec<ExceptionInfo>,
    max_stack: usize,
    scope_slots: usize,
    local_count: usize,
    begin_hook: Rc<HookSlot>,
    return_hook: Rc<HookSlot>,
}

/// Slot counts of a routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCounts {
    /// Operand stack slots
    pub stack: usize,
    /// Scope stack slots
    pub scopes: usize,
    /// Locals
    pub locals: usize,
}

impl CompiledRoutine {
    pub(crate) fn new(
        shape: Shape,
        names: Vec<Rc<Multiname>>,
        regions: Vec<ExceptionInfo>,
        slots: SlotCounts,
        hooks: (Rc<HookSlot>, Rc<HookSlot>),
    ) -> Self {
        Self {
            shape,
            names,
            regions,
            max_stack: slots.stack,
            scope_slots: slots.scopes,
            local_count: slots.locals,
            begin_hook: hooks.0,
            return_hook: hooks.1,
        }
    }

    /// Multiname constants the routine refers to, in first-use order
    pub fn names(&self) -> &[Rc<Multiname>] {
        &self.names
    }

    /// Whether the routine was laid out as dispatch blocks
    pub fn is_dispatch(&self) -> bool {
        matches!(self.shape, Shape::Dispatch { .. })
    }

    /// Number of compiled steps
    pub fn step_count(&self) -> usize {
        match &self.shape {
            Shape::Straight(steps) => steps.len(),
            Shape::Dispatch { blocks, .. } => blocks.iter().map(|block| block.steps.len()).sum(),
        }
    }

    /// Number of blocks; a straight-line routine is one block
    pub fn block_count(&self) -> usize {
        match &self.shape {
            Shape::Straight(_) => 1,
            Shape::Dispatch { blocks, .. } => blocks.len(),
        }
    }

    /// Slot counts
    pub fn slots(&self) -> SlotCounts {
        SlotCounts {
            stack: self.max_stack,
            scopes: self.scope_slots,
            locals: self.local_count,
        }
    }

    /// Guard of the step at `position`
    pub fn guard_at(&self, position: usize) -> Option<&[usize]> {
        let mut steps: Box<dyn Iterator<Item = &Step>> = match &self.shape {
            Shape::Straight(steps) => Box::new(steps.iter()),
            Shape::Dispatch { blocks, .. } => Box::new(blocks.iter().flat_map(|block| block.steps.iter())),
        };
        steps.find(|step| step.position == position).map(|step| &*step.guard)
    }

    /// Run the routine for one call of `method`
    pub fn execute(
        &self,
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let _guard = cx.enter_frame()?;
        let abc = method.abc()?;
        let locals = operations::bind_arguments(cx, method, scope, receiver, args)?;
        let mut act = Activation {
            stack: vec![Value::Undefined; self.max_stack.max(1)],
            locals,
            scopes: ScopeStack::new(Rc::clone(scope)),
            rn: ResolvedName::default(),
            method: Rc::clone(method),
            abc,
        };
        self.begin_hook.fire(act.receiver());
        let value = self.run(cx, &mut act)?;
        self.return_hook.fire(act.receiver());
        Ok(value)
    }

    fn run(&self, cx: &ExecutionContext, act: &mut Activation) -> Result<Value, VmError> {
        let mut at = self.shape.entry();
        loop {
            let step = self
                .shape
                .step(at)
                .ok_or_else(|| Fault::Verify(format!("fell off the end of {}", act.method.display_name())))?;
            match step.run(cx, act) {
                Ok(Flow::Next) => {
                    at = self.shape.advance(at, step).ok_or_else(|| {
                        Fault::Verify(format!("fell off the end of {}", act.method.display_name()))
                    })?;
                }
                Ok(Flow::Jump(target)) => at = self.jump(target)?,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(err) if err.is_verify() => return Err(err),
                Err(err) => {
                    let exception = match classify(cx, err, &FaultSite::unknown()) {
                        VmError::Throw(value) => value,
                        other => return Err(other),
                    };
                    let candidates = step.guard.iter().copied();
                    match select_handler(cx, &self.regions, candidates, &exception)? {
                        Some(index) => {
                            let target = self.regions[index].target;
                            tracing::trace!(site = step.position, handler = target, "exception caught");
                            act.enter_handler(exception);
                            at = self.jump(target)?;
                        }
                        None => return Err(VmError::Throw(exception)),
                    }
                }
            }
        }
    }

    fn jump(&self, target: usize) -> Result<Cursor, VmError> {
        self.shape
            .locate(target)
            .ok_or_else(|| Fault::Verify(format!("no compiled code at {}", target)).into())
    }
}

impl fmt::Debug for CompiledRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoutine")
            .field("steps", &self.step_count())
            .field("blocks", &self.block_count())
            .field("names", &self.names.len())
            .field("slots", &self.slots())
            .finish()
    }
}
