//! Codegen pass: one closure per reachable instruction
//!
//! Every closure addresses fixed operand stack slots computed from the
//! instruction's static depth, and performs its work through the same
//! `interpreter::operations` functions the dispatch loop uses.

use std::mem::take;
use std::rc::Rc;

use bytecode_system::{AbcFile, MethodInfo, Multiname, Opcode, ResolvedName};
use core_types::{Fault, Value, VmError};
use interpreter::{covering_regions, names, operations as ops, ExecutionContext, HookPlace, HookRegistry};

use crate::compiled_code::{Activation, Block, CompiledRoutine, Flow, Shape, SlotCounts, Step, StepFn};
use crate::error::CompileError;
use crate::ir::{Analysis, IrInstruction, Operands};

fn step<F>(f: F) -> StepFn
where
    F: Fn(&ExecutionContext, &mut Activation) -> Result<Flow, VmError> + 'static,
{
    Box::new(f)
}

fn push_value(at: usize, value: Value) -> StepFn {
    step(move |_, act| {
        act.stack[at] = value.clone();
        Ok(Flow::Next)
    })
}

/// Name operand of a compiled instruction
enum NameRef {
    /// Fully static; resolved once at compile time
    Static(ResolvedName),
    /// Name or namespace taken from the stack on every execution
    Runtime(Rc<Multiname>),
}

impl NameRef {
    fn arity(&self) -> usize {
        match self {
            NameRef::Static(_) => 0,
            NameRef::Runtime(mn) => mn.runtime_arity(),
        }
    }

    /// Resolved name, taking runtime parts from the slots just below `top`
    fn resolve<'a>(
        &'a self,
        cx: &ExecutionContext,
        stack: &mut [Value],
        top: usize,
        scratch: &'a mut ResolvedName,
    ) -> Result<&'a ResolvedName, VmError> {
        match self {
            NameRef::Static(rn) => Ok(rn),
            NameRef::Runtime(mn) => {
                let mut at = top;
                let name = if mn.is_runtime_name() {
                    at -= 1;
                    Some(take(&mut stack[at]))
                } else {
                    None
                };
                let ns = if mn.is_runtime_namespace() {
                    at -= 1;
                    Some(take(&mut stack[at]))
                } else {
                    None
                };
                names::resolve_name(cx, mn, name, ns, scratch)?;
                Ok(scratch)
            }
        }
    }
}

/// Lowers an analyzed method body into a [`CompiledRoutine`]
pub struct CodeGenerator<'a> {
    abc: &'a AbcFile,
    method: &'a MethodInfo,
    names: Vec<Rc<Multiname>>,
    seen: Vec<u32>,
}

impl<'a> CodeGenerator<'a> {
    /// Generator for `method`, whose constants live in `abc`
    pub fn new(abc: &'a AbcFile, method: &'a MethodInfo) -> Self {
        Self {
            abc,
            method,
            names: Vec::new(),
            seen: Vec::new(),
        }
    }

    /// Emit the routine. Hook slots for the method's path are captured from
    /// `hooks` so that later attachments still fire.
    pub fn generate(mut self, analysis: &Analysis, hooks: &HookRegistry) -> Result<CompiledRoutine, CompileError> {
        let body = self.method.body.as_ref().ok_or(CompileError::NoBody)?;
        let straight = analysis.jump_targets.len() <= 1 && body.exceptions.is_empty();

        let mut blocks: Vec<Block> = Vec::new();
        let mut previous: Option<&IrInstruction> = None;
        for ins in analysis.reachable() {
            let starts_block = analysis.jump_targets.contains(&ins.position)
                || previous.map_or(true, |prev| prev.opcode.is_terminator() || prev.next_position != ins.position);
            if blocks.is_empty() || (starts_block && !straight) {
                blocks.push(Block {
                    start: ins.position,
                    steps: Vec::new(),
                });
            }
            let guard: Rc<[usize]> = covering_regions(&body.exceptions, ins.position).collect();
            let exec = self.emit(ins)?;
            if let Some(block) = blocks.last_mut() {
                block
                    .steps
                    .push(Step::new(ins.position, ins.next_position, ins.opcode, guard, exec));
            }
            previous = Some(ins);
        }

        let shape = if straight {
            Shape::Straight(blocks.into_iter().flat_map(|block| block.steps).collect())
        } else {
            let table = blocks
                .iter()
                .enumerate()
                .map(|(index, block)| (block.start, index))
                .collect();
            Shape::Dispatch { blocks, table }
        };
        let path = self.method.hook_path();
        let slots = SlotCounts {
            stack: analysis.max_stack,
            scopes: analysis.scope_capacity,
            locals: analysis.local_count,
        };
        Ok(CompiledRoutine::new(
            shape,
            self.names,
            body.exceptions.clone(),
            slots,
            (hooks.slot(&path, HookPlace::Begin), hooks.slot(&path, HookPlace::Return)),
        ))
    }

    fn multiname(&mut self, index: u32) -> Result<&'a Rc<Multiname>, CompileError> {
        let mn = self.abc.multiname(index)?;
        if !self.seen.contains(&index) {
            self.seen.push(index);
            self.names.push(Rc::clone(mn));
        }
        Ok(mn)
    }

    fn name(&mut self, index: u32) -> Result<NameRef, CompileError> {
        let mn = self.multiname(index)?;
        Ok(if mn.is_runtime() {
            NameRef::Runtime(Rc::clone(mn))
        } else {
            NameRef::Static(ResolvedName::from_static(mn))
        })
    }

    fn emit(&mut self, ins: &IrInstruction) -> Result<StepFn, CompileError> {
        use Opcode::*;

        let op = ins.opcode;
        let d = ins.stack_before as usize;
        let index = ins.operands.index();
        let argc = ins.operands.count() as usize;

        if let Some(f) = ops::unary(op) {
            return Ok(step(move |cx, act| {
                let value = take(&mut act.stack[d - 1]);
                act.stack[d - 1] = f(cx, value)?;
                Ok(Flow::Next)
            }));
        }
        if let Some(f) = ops::binary(op) {
            return Ok(step(move |cx, act| {
                let b = take(&mut act.stack[d - 1]);
                let a = take(&mut act.stack[d - 2]);
                act.stack[d - 2] = f(cx, a, b)?;
                Ok(Flow::Next)
            }));
        }
        if let Some(f) = ops::local_update(op) {
            let local = index as usize;
            return Ok(step(move |cx, act| {
                let value = act.locals[local].clone();
                act.locals[local] = f(cx, value)?;
                Ok(Flow::Next)
            }));
        }

        let exec = match op {
            Nop | Label | Bkpt | Timestamp | Debug | DebugLine | DebugFile | BkptLine => step(|_, _| Ok(Flow::Next)),
            Throw => step(move |_, act| Err(VmError::Throw(take(&mut act.stack[d - 1])))),

            // ---- branches ----
            Jump => {
                let target = branch_target(ins)?;
                step(move |_, _| Ok(Flow::Jump(target)))
            }
            IfTrue | IfFalse => {
                let target = branch_target(ins)?;
                let wanted = op == IfTrue;
                step(move |_, act| {
                    let value = take(&mut act.stack[d - 1]);
                    Ok(if value.is_truthy() == wanted { Flow::Jump(target) } else { Flow::Next })
                })
            }
            _ if op.is_compare_branch() => {
                let target = branch_target(ins)?;
                step(move |cx, act| {
                    let b = take(&mut act.stack[d - 1]);
                    let a = take(&mut act.stack[d - 2]);
                    Ok(if ops::branch_taken(cx, op, &a, &b)? { Flow::Jump(target) } else { Flow::Next })
                })
            }
            LookupSwitch => {
                let Operands::Switch { default, cases } = ins.operands.clone() else {
                    return Err(bad_target(ins));
                };
                let case_count = cases.len().saturating_sub(1) as u32;
                step(move |_, act| {
                    let index = take(&mut act.stack[d - 1]);
                    let target = ops::switch_case(&index, case_count)
                        .and_then(|case| cases.get(case).copied())
                        .unwrap_or(default);
                    Ok(Flow::Jump(target))
                })
            }

            // ---- stack ----
            PushNull => push_value(d, Value::Null),
            PushUndefined => push_value(d, Value::Undefined),
            PushTrue => push_value(d, Value::Boolean(true)),
            PushFalse => push_value(d, Value::Boolean(false)),
            PushNaN => push_value(d, Value::Number(f64::NAN)),
            PushByte => push_value(d, Value::Int(index as u8 as i8 as i32)),
            PushShort => push_value(d, Value::Int(index as u16 as i16 as i32)),
            PushString => push_value(d, Value::String(Rc::clone(self.abc.string(index)?))),
            PushInt => push_value(d, Value::Int(self.abc.int(index)?)),
            PushUInt => push_value(d, Value::UInt(self.abc.uint(index)?)),
            PushDouble => push_value(d, Value::Number(self.abc.double(index)?)),
            PushNamespace => {
                self.abc.namespace(index)?;
                step(move |cx, act| {
                    act.stack[d] = ops::push_namespace(cx, &act.abc, index)?;
                    Ok(Flow::Next)
                })
            }
            Pop => step(move |_, act| {
                act.stack[d - 1] = Value::Undefined;
                Ok(Flow::Next)
            }),
            Dup => step(move |_, act| {
                act.stack[d] = act.stack[d - 1].clone();
                Ok(Flow::Next)
            }),
            Swap => step(move |_, act| {
                act.stack.swap(d - 1, d - 2);
                Ok(Flow::Next)
            }),

            // ---- locals ----
            GetLocal | GetLocal0 | GetLocal1 | GetLocal2 | GetLocal3 => {
                let local = if op == GetLocal { index as usize } else { (op as u8 - GetLocal0 as u8) as usize };
                step(move |_, act| {
                    act.stack[d] = act.locals[local].clone();
                    Ok(Flow::Next)
                })
            }
            SetLocal | SetLocal0 | SetLocal1 | SetLocal2 | SetLocal3 => {
                let local = if op == SetLocal { index as usize } else { (op as u8 - SetLocal0 as u8) as usize };
                step(move |_, act| {
                    act.locals[local] = take(&mut act.stack[d - 1]);
                    Ok(Flow::Next)
                })
            }
            Kill => {
                let local = index as usize;
                step(move |_, act| {
                    act.locals[local] = Value::Undefined;
                    Ok(Flow::Next)
                })
            }

            // ---- scopes ----
            PushScope | PushWith => {
                let is_with = op == PushWith;
                step(move |cx, act| {
                    let value = take(&mut act.stack[d - 1]);
                    let object = ops::scope_object(cx, op, &value)?;
                    act.scopes.push(object, is_with);
                    Ok(Flow::Next)
                })
            }
            PopScope => step(|_, act| {
                act.scopes.pop();
                Ok(Flow::Next)
            }),
            GetGlobalScope => step(move |_, act| {
                act.stack[d] = act.saved_scope().global_object().clone();
                Ok(Flow::Next)
            }),
            GetScopeObject => {
                let slot = index as usize;
                step(move |_, act| {
                    act.stack[d] = act
                        .scopes
                        .get(slot)
                        .cloned()
                        .ok_or_else(|| Fault::Verify(format!("scope index {} out of range", slot)))?;
                    Ok(Flow::Next)
                })
            }
            Dxns => {
                let uri = Rc::clone(self.abc.string(index)?);
                step(move |_, act| {
                    act.scopes.top_scope().set_default_namespace(Rc::clone(&uri));
                    Ok(Flow::Next)
                })
            }
            DxnsLate => step(move |cx, act| {
                let value = take(&mut act.stack[d - 1]);
                ops::dxns_late(cx, &act.scopes.top_scope(), &value)?;
                Ok(Flow::Next)
            }),

            // ---- properties ----
            GetProperty | DeleteProperty | GetSuper => {
                let name = self.name(index)?;
                let receiver_at = d - 1 - name.arity();
                step(move |cx, act| {
                    let rn = name.resolve(cx, &mut act.stack, d, &mut act.rn)?;
                    let receiver = take(&mut act.stack[receiver_at]);
                    act.stack[receiver_at] = match op {
                        GetProperty => ops::get_property(cx, &receiver, rn)?,
                        DeleteProperty => ops::delete_property(cx, &receiver, rn)?,
                        _ => ops::get_super(cx, act.scopes.parent(), &receiver, rn)?,
                    };
                    Ok(Flow::Next)
                })
            }
            SetProperty | InitProperty | SetSuper => {
                let name = self.name(index)?;
                let receiver_at = d - 2 - name.arity();
                step(move |cx, act| {
                    let value = take(&mut act.stack[d - 1]);
                    let rn = name.resolve(cx, &mut act.stack, d - 1, &mut act.rn)?;
                    let receiver = take(&mut act.stack[receiver_at]);
                    if op == SetSuper {
                        ops::set_super(cx, act.scopes.parent(), &receiver, rn, value)?;
                    } else {
                        ops::set_property(cx, op, &receiver, rn, value)?;
                    }
                    Ok(Flow::Next)
                })
            }
            FindProperty | FindPropStrict | GetLex => {
                let name = self.name(index)?;
                let result_at = d - name.arity();
                step(move |cx, act| {
                    let rn = name.resolve(cx, &mut act.stack, d, &mut act.rn)?;
                    let scope = act.scopes.top_scope();
                    act.stack[result_at] = if op == GetLex {
                        ops::get_lex(cx, &scope, rn)?
                    } else {
                        ops::find_property(cx, op, &scope, rn)?
                    };
                    Ok(Flow::Next)
                })
            }
            GetSlot => step(move |cx, act| {
                let object = take(&mut act.stack[d - 1]);
                act.stack[d - 1] = ops::get_slot(cx, op, &object, index)?;
                Ok(Flow::Next)
            }),
            SetSlot => step(move |cx, act| {
                let value = take(&mut act.stack[d - 1]);
                let object = take(&mut act.stack[d - 2]);
                ops::set_slot(cx, op, &object, index, value)?;
                Ok(Flow::Next)
            }),
            GetGlobalSlot => step(move |cx, act| {
                let global = act.saved_scope().global_object().clone();
                act.stack[d] = ops::get_slot(cx, op, &global, index)?;
                Ok(Flow::Next)
            }),
            SetGlobalSlot => step(move |cx, act| {
                let value = take(&mut act.stack[d - 1]);
                let global = act.saved_scope().global_object().clone();
                ops::set_slot(cx, op, &global, index, value)?;
                Ok(Flow::Next)
            }),

            // ---- enumeration ----
            HasNext | NextName | NextValue => step(move |cx, act| {
                let position = take(&mut act.stack[d - 1]);
                let object = take(&mut act.stack[d - 2]);
                act.stack[d - 2] = match op {
                    HasNext => ops::has_next(cx, &object, &position)?,
                    NextName => ops::next_name(cx, &object, &position)?,
                    _ => ops::next_value(cx, &object, &position)?,
                };
                Ok(Flow::Next)
            }),
            HasNext2 => {
                let (object_reg, index_reg) = (index as usize, argc);
                step(move |cx, act| {
                    let (object, position, more) =
                        ops::has_next2(cx, &act.locals[object_reg], &act.locals[index_reg])?;
                    act.locals[object_reg] = object;
                    act.locals[index_reg] = position;
                    act.stack[d] = Value::Boolean(more);
                    Ok(Flow::Next)
                })
            }

            // ---- calls ----
            Call => {
                let n = index as usize;
                step(move |cx, act| {
                    let args = act.take_range(d - n, d);
                    let receiver = take(&mut act.stack[d - n - 1]);
                    let callee = take(&mut act.stack[d - n - 2]);
                    act.stack[d - n - 2] = ops::call(cx, &callee, receiver, &args)?;
                    Ok(Flow::Next)
                })
            }
            Construct | ApplyType => {
                let n = index as usize;
                step(move |cx, act| {
                    let args = act.take_range(d - n, d);
                    let target = take(&mut act.stack[d - n - 1]);
                    act.stack[d - n - 1] = if op == Construct {
                        ops::construct(cx, &target, &args)?
                    } else {
                        ops::apply_type(cx, &target, &args)?
                    };
                    Ok(Flow::Next)
                })
            }
            ConstructSuper => {
                let n = index as usize;
                step(move |cx, act| {
                    let args = act.take_range(d - n, d);
                    let receiver = take(&mut act.stack[d - n - 1]);
                    ops::construct_super(cx, act.scopes.parent(), &receiver, &args)?;
                    Ok(Flow::Next)
                })
            }
            CallStatic => {
                self.abc.method(index)?;
                let receiver_at = d - argc - 1;
                step(move |cx, act| {
                    let args = act.take_range(d - argc, d);
                    let receiver = take(&mut act.stack[receiver_at]);
                    let scope = Rc::clone(act.saved_scope());
                    act.stack[receiver_at] = ops::call_static(cx, &act.abc, index, &scope, receiver, &args)?;
                    Ok(Flow::Next)
                })
            }
            CallProperty | CallPropLex | CallPropVoid | CallSuper | CallSuperVoid | ConstructProp => {
                let name = self.name(index)?;
                let top = d - argc;
                let receiver_at = top - name.arity() - 1;
                let keep = !matches!(op, CallPropVoid | CallSuperVoid);
                step(move |cx, act| {
                    let args = act.take_range(top, d);
                    let rn = name.resolve(cx, &mut act.stack, top, &mut act.rn)?;
                    let receiver = take(&mut act.stack[receiver_at]);
                    let result = match op {
                        CallSuper | CallSuperVoid => ops::call_super(cx, op, act.scopes.parent(), &receiver, rn, &args)?,
                        ConstructProp => ops::construct_property(cx, &receiver, rn, &args)?,
                        _ => ops::call_property(cx, op, &receiver, rn, &args)?,
                    };
                    if keep {
                        act.stack[receiver_at] = result;
                    }
                    Ok(Flow::Next)
                })
            }
            ReturnVoid => step(|_, _| Ok(Flow::Return(Value::Undefined))),
            ReturnValue => step(move |cx, act| {
                let value = take(&mut act.stack[d - 1]);
                let scope = Rc::clone(act.saved_scope());
                Ok(Flow::Return(ops::coerce_return(cx, &act.method, &scope, value)?))
            }),

            // ---- creation ----
            NewObject => {
                let n = 2 * index as usize;
                step(move |cx, act| {
                    let pairs = act.take_range(d - n, d);
                    act.stack[d - n] = ops::new_object(cx, pairs)?;
                    Ok(Flow::Next)
                })
            }
            NewArray => {
                let n = index as usize;
                step(move |cx, act| {
                    let values = act.take_range(d - n, d);
                    act.stack[d - n] = ops::new_array(cx, values);
                    Ok(Flow::Next)
                })
            }
            NewFunction => {
                self.abc.method(index)?;
                step(move |cx, act| {
                    let scope = act.scopes.top_scope();
                    act.stack[d] = ops::new_function(cx, &act.abc, index, &scope)?;
                    Ok(Flow::Next)
                })
            }
            NewClass => {
                self.abc.class(index)?;
                step(move |cx, act| {
                    let base = take(&mut act.stack[d - 1]);
                    let scope = act.scopes.top_scope();
                    act.stack[d - 1] = ops::new_class(cx, &act.abc, index, &base, &scope)?;
                    Ok(Flow::Next)
                })
            }
            NewActivation => step(move |cx, act| {
                let scope = act.scopes.top_scope();
                act.stack[d] = ops::new_activation(cx, &act.method, &scope)?;
                Ok(Flow::Next)
            }),
            NewCatch => step(move |cx, act| {
                let scope = act.scopes.top_scope();
                act.stack[d] = ops::new_catch(cx, &act.method, index, &scope)?;
                Ok(Flow::Next)
            }),

            // ---- named types ----
            Coerce | AsType | IsType => {
                let rn = ResolvedName::from_static(self.multiname(index)?);
                step(move |cx, act| {
                    let value = take(&mut act.stack[d - 1]);
                    let scope = act.scopes.top_scope();
                    act.stack[d - 1] = ops::named_type(cx, op, &scope, &rn, value)?;
                    Ok(Flow::Next)
                })
            }

            other => {
                return Err(CompileError::Unsupported {
                    opcode: other,
                    position: ins.position,
                })
            }
        };
        Ok(exec)
    }
}

fn bad_target(ins: &IrInstruction) -> CompileError {
    CompileError::BadTarget {
        position: ins.position,
        target: -1,
    }
}

fn branch_target(ins: &IrInstruction) -> Result<usize, CompileError> {
    match ins.operands {
        Operands::Branch(target) => Ok(target),
        _ => Err(bad_target(ins)),
    }
}
