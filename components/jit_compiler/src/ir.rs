//! Analysis pass: decoded instructions with static stack and scope depths
//!
//! The raw code buffer is decoded into [`IrInstruction`] records. A worklist
//! pass then walks every path from the entry point and from every exception
//! handler, assigning each reachable instruction the operand stack and scope
//! depth it starts with. Anything the interpreter would only discover at run
//! time (stack underrun, overflow, unbalanced scopes, bad branch targets) is
//! rejected here as a [`CompileError`].

use std::collections::{BTreeSet, HashMap};

use bytecode_system::{offset_target, AbcFile, InstructionStream, MethodInfo, Opcode, OperandLayout};
use interpreter::operations;

use crate::error::CompileError;

/// Decoded operands of one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    /// No operands, or debug operands that have no effect
    None,
    /// One raw byte
    U8(u8),
    /// One u30
    U30(u32),
    /// Two u30s
    U30x2(u32, u32),
    /// Branch with its absolute target
    Branch(usize),
    /// `LOOKUPSWITCH` with absolute targets; `cases` has `case_count + 1` entries
    Switch {
        /// Target when the index selects no case
        default: usize,
        /// Case targets
        cases: Vec<usize>,
    },
}

impl Operands {
    /// First u30 operand, or zero
    pub fn index(&self) -> u32 {
        match self {
            Operands::U30(a) | Operands::U30x2(a, _) => *a,
            Operands::U8(b) => u32::from(*b),
            _ => 0,
        }
    }

    /// Second u30 operand (argument count of call forms), or zero
    pub fn count(&self) -> u32 {
        match self {
            Operands::U30x2(_, b) => *b,
            _ => 0,
        }
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub struct IrInstruction {
    /// Operation
    pub opcode: Opcode,
    /// Decoded operands
    pub operands: Operands,
    /// Position of the opcode byte
    pub position: usize,
    /// Position of the following instruction
    pub next_position: usize,
    /// Operand stack depth on entry; -1 when unreachable
    pub stack_before: i32,
    /// Scope stack depth on entry; -1 when unreachable
    pub scope_before: i32,
}

impl IrInstruction {
    /// Whether the dataflow reached this instruction
    pub fn is_reachable(&self) -> bool {
        self.stack_before >= 0
    }

    /// Branch and switch targets
    pub fn targets(&self) -> Vec<usize> {
        match &self.operands {
            Operands::Branch(target) => vec![*target],
            Operands::Switch { default, cases } => {
                let mut targets = Vec::with_capacity(cases.len() + 1);
                targets.push(*default);
                targets.extend(cases.iter().copied());
                targets
            }
            _ => Vec::new(),
        }
    }
}

/// Stack effect of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Effect {
    pops: usize,
    pushes: usize,
    scope: i32,
}

impl Effect {
    fn stack(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes, scope: 0 }
    }

    fn scope(pops: usize, scope: i32) -> Self {
        Self { pops, pushes: 0, scope }
    }
}

/// `fixed + scale * count` operand values, or an underflow when the sum
/// cannot be represented
fn operand_count(ins: &IrInstruction, fixed: usize, scale: usize, count: u32) -> Result<usize, CompileError> {
    usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(scale))
        .and_then(|values| values.checked_add(fixed))
        .ok_or(CompileError::StackUnderflow { position: ins.position })
}

/// Result of analyzing one method body
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Every decoded instruction, in code order
    pub instructions: Vec<IrInstruction>,
    /// Branch, switch and handler targets
    pub jump_targets: BTreeSet<usize>,
    /// Per region: first instruction at or after `start`
    pub try_opens: Vec<usize>,
    /// Per region: first instruction at or after `end` (the code length if none)
    pub try_closes: Vec<usize>,
    /// Operand stack slots
    pub max_stack: usize,
    /// Scope stack slots
    pub scope_capacity: usize,
    /// Local slots
    pub local_count: usize,
    positions: HashMap<usize, usize>,
}

impl Analysis {
    /// Index of the instruction starting at `position`
    pub fn index_of(&self, position: usize) -> Option<usize> {
        self.positions.get(&position).copied()
    }

    /// Instructions the dataflow reached, in code order
    pub fn reachable(&self) -> impl Iterator<Item = &IrInstruction> + '_ {
        self.instructions.iter().filter(|ins| ins.is_reachable())
    }
}

fn decode_all(code: &[u8]) -> Result<Vec<IrInstruction>, CompileError> {
    let mut stream = InstructionStream::new(code);
    let mut instructions = Vec::new();
    while !stream.is_at_end() {
        let position = stream.pc();
        let opcode = stream.read_opcode()?;
        if !opcode.is_supported() {
            return Err(CompileError::Unsupported { opcode, position });
        }
        let operands = match opcode.operands() {
            OperandLayout::None => Operands::None,
            OperandLayout::U8 => Operands::U8(stream.read_u8()?),
            OperandLayout::U30 => Operands::U30(stream.read_u30()?),
            OperandLayout::U30x2 => {
                let first = stream.read_u30()?;
                Operands::U30x2(first, stream.read_u30()?)
            }
            OperandLayout::S24 => {
                let offset = stream.read_s24()?;
                Operands::Branch(absolute(position, stream.pc(), offset)?)
            }
            OperandLayout::LookupSwitch => {
                let default = absolute(position, position, stream.read_s24()?)?;
                let case_count = stream.read_u30()?;
                let mut cases = Vec::new();
                for _ in 0..=case_count {
                    cases.push(absolute(position, position, stream.read_s24()?)?);
                }
                Operands::Switch { default, cases }
            }
            OperandLayout::Debug => {
                stream.read_u8()?;
                stream.read_u30()?;
                stream.read_u8()?;
                stream.read_u30()?;
                Operands::None
            }
        };
        instructions.push(IrInstruction {
            opcode,
            operands,
            position,
            next_position: stream.pc(),
            stack_before: -1,
            scope_before: -1,
        });
    }
    Ok(instructions)
}

fn absolute(position: usize, base: usize, offset: i32) -> Result<usize, CompileError> {
    offset_target(base, offset).ok_or(CompileError::BadTarget {
        position,
        target: base as i64 + offset as i64,
    })
}

fn check_local(ins: &IrInstruction, index: u32, local_count: usize) -> Result<(), CompileError> {
    if (index as usize) < local_count {
        Ok(())
    } else {
        Err(CompileError::BadLocal {
            position: ins.position,
            index,
        })
    }
}

fn effect(abc: &AbcFile, ins: &IrInstruction, local_count: usize) -> Result<Effect, CompileError> {
    use Opcode::*;

    let op = ins.opcode;
    let index = ins.operands.index();
    let argc = ins.operands.count();
    let arity = |index: u32| -> Result<usize, CompileError> { Ok(abc.multiname(index)?.runtime_arity()) };

    if operations::unary(op).is_some() {
        return Ok(Effect::stack(1, 1));
    }
    if operations::binary(op).is_some() {
        return Ok(Effect::stack(2, 1));
    }
    if operations::local_update(op).is_some() {
        check_local(ins, index, local_count)?;
        return Ok(Effect::stack(0, 0));
    }

    let effect = match op {
        Nop | Label | Bkpt | Timestamp | Debug | DebugLine | DebugFile | BkptLine | Jump | ReturnVoid => {
            Effect::stack(0, 0)
        }
        Throw | IfTrue | IfFalse | LookupSwitch | Pop | ReturnValue | DxnsLate => Effect::stack(1, 0),
        _ if op.is_compare_branch() => Effect::stack(2, 0),

        PushNull | PushUndefined | PushTrue | PushFalse | PushNaN | PushByte | PushShort | PushString | PushInt
        | PushUInt | PushDouble | PushNamespace | GetGlobalScope | NewFunction | NewActivation | NewCatch => {
            Effect::stack(0, 1)
        }
        Dup => Effect::stack(1, 2),
        Swap => Effect::stack(2, 2),

        GetLocal => {
            check_local(ins, index, local_count)?;
            Effect::stack(0, 1)
        }
        SetLocal => {
            check_local(ins, index, local_count)?;
            Effect::stack(1, 0)
        }
        Kill => {
            check_local(ins, index, local_count)?;
            Effect::stack(0, 0)
        }
        GetLocal0 | GetLocal1 | GetLocal2 | GetLocal3 => {
            check_local(ins, (op as u8 - GetLocal0 as u8) as u32, local_count)?;
            Effect::stack(0, 1)
        }
        SetLocal0 | SetLocal1 | SetLocal2 | SetLocal3 => {
            check_local(ins, (op as u8 - SetLocal0 as u8) as u32, local_count)?;
            Effect::stack(1, 0)
        }

        PushScope | PushWith => Effect::scope(1, 1),
        PopScope => Effect::scope(0, -1),
        GetScopeObject => {
            if index as i32 >= ins.scope_before {
                return Err(CompileError::BadScopeIndex {
                    position: ins.position,
                    index: index as u8,
                });
            }
            Effect::stack(0, 1)
        }
        Dxns => {
            abc.string(index)?;
            Effect::stack(0, 0)
        }

        GetProperty | DeleteProperty | GetSuper => Effect::stack(1 + arity(index)?, 1),
        SetProperty | InitProperty | SetSuper => Effect::stack(2 + arity(index)?, 0),
        FindProperty | FindPropStrict | GetLex => Effect::stack(arity(index)?, 1),
        Coerce | AsType | IsType => {
            abc.multiname(index)?;
            Effect::stack(1, 1)
        }

        GetSlot => Effect::stack(1, 1),
        SetSlot => Effect::stack(2, 0),
        GetGlobalSlot => Effect::stack(0, 1),
        SetGlobalSlot => Effect::stack(1, 0),

        HasNext | NextName | NextValue => Effect::stack(2, 1),
        HasNext2 => {
            check_local(ins, index, local_count)?;
            check_local(ins, ins.operands.count(), local_count)?;
            Effect::stack(0, 1)
        }

        Call => Effect::stack(operand_count(ins, 2, 1, index)?, 1),
        Construct | ApplyType => Effect::stack(operand_count(ins, 1, 1, index)?, 1),
        ConstructSuper => Effect::stack(operand_count(ins, 1, 1, index)?, 0),
        CallStatic => {
            abc.method(index)?;
            Effect::stack(operand_count(ins, 1, 1, argc)?, 1)
        }
        CallProperty | CallPropLex | CallSuper | ConstructProp => {
            Effect::stack(operand_count(ins, 1 + arity(index)?, 1, argc)?, 1)
        }
        CallPropVoid | CallSuperVoid => Effect::stack(operand_count(ins, 1 + arity(index)?, 1, argc)?, 0),

        NewObject => Effect::stack(operand_count(ins, 0, 2, index)?, 1),
        NewArray => Effect::stack(operand_count(ins, 0, 1, index)?, 1),
        NewClass => Effect::stack(1, 1),

        other => {
            return Err(CompileError::Unsupported {
                opcode: other,
                position: ins.position,
            })
        }
    };
    Ok(effect)
}

/// Analyze the body of `method`.
///
/// Unreachable instructions keep a depth of -1 and are not an error.
pub fn analyze(abc: &AbcFile, method: &MethodInfo) -> Result<Analysis, CompileError> {
    let body = method.body.as_ref().ok_or(CompileError::NoBody)?;
    let code_len = body.code.len();
    let mut instructions = decode_all(&body.code)?;
    let positions: HashMap<usize, usize> = instructions
        .iter()
        .enumerate()
        .map(|(index, ins)| (ins.position, index))
        .collect();
    let local_count = operations::local_count(method);
    let scope_capacity = body.scope_capacity();

    let mut jump_targets = BTreeSet::new();
    let mut try_opens = Vec::with_capacity(body.exceptions.len());
    let mut try_closes = Vec::with_capacity(body.exceptions.len());
    let first_at = |from: usize| {
        instructions
            .iter()
            .find(|ins| ins.position >= from)
            .map_or(code_len, |ins| ins.position)
    };
    for (index, region) in body.exceptions.iter().enumerate() {
        if region.start > region.end || region.end > code_len || !positions.contains_key(&region.target) {
            return Err(CompileError::BadRegion(index));
        }
        try_opens.push(first_at(region.start));
        try_closes.push(first_at(region.end));
        jump_targets.insert(region.target);
    }

    if instructions.is_empty() {
        return Err(CompileError::FallsOffEnd(0));
    }
    let mut work: Vec<(usize, i32, i32)> = vec![(0, 0, 0)];
    work.extend(
        body.exceptions
            .iter()
            .filter_map(|region| positions.get(&region.target))
            .map(|&index| (index, 1, 0)),
    );

    while let Some((index, stack, scope)) = work.pop() {
        let ins = &mut instructions[index];
        if ins.is_reachable() {
            if (ins.stack_before, ins.scope_before) != (stack, scope) {
                return Err(CompileError::InconsistentDepth(ins.position));
            }
            continue;
        }
        ins.stack_before = stack;
        ins.scope_before = scope;
        let ins = &instructions[index];

        let effect = effect(abc, ins, local_count)?;
        let depth = stack as usize;
        let remaining = depth
            .checked_sub(effect.pops)
            .ok_or(CompileError::StackUnderflow { position: ins.position })?;
        let peak = remaining.saturating_add(effect.pushes).max(depth);
        if peak > body.max_stack {
            return Err(CompileError::StackOverflow {
                position: ins.position,
                depth: peak,
                max: body.max_stack,
            });
        }
        let stack_after = i32::try_from(remaining + effect.pushes).map_err(|_| CompileError::StackOverflow {
            position: ins.position,
            depth: peak,
            max: body.max_stack,
        })?;
        let scope_after = scope + effect.scope;
        if scope_after < 0 {
            return Err(CompileError::ScopeUnderflow(ins.position));
        }
        if scope_after as usize > scope_capacity {
            return Err(CompileError::ScopeOverflow(ins.position));
        }

        for target in ins.targets() {
            let next = positions.get(&target).ok_or(CompileError::BadTarget {
                position: ins.position,
                target: target as i64,
            })?;
            jump_targets.insert(target);
            work.push((*next, stack_after, scope_after));
        }
        if !ins.opcode.is_terminator() {
            match positions.get(&ins.next_position) {
                Some(&next) => work.push((next, stack_after, scope_after)),
                None => return Err(CompileError::FallsOffEnd(ins.position)),
            }
        }
    }

    Ok(Analysis {
        instructions,
        jump_targets,
        try_opens,
        try_closes,
        max_stack: body.max_stack,
        scope_capacity,
        local_count,
        positions,
    })
}
