//! Instruction dispatch loop
//!
//! Decodes one instruction at a time from the method body and executes it
//! against an [`InterpreterFrame`]. Failures are classified at the failing
//! instruction and routed to the innermost matching exception region.

use std::rc::Rc;

use bytecode_system::{offset_target, AbcFile, ExceptionInfo, InstructionStream, MethodInfo, Opcode, ResolvedName};
use core_types::{Fault, Value, VmError};

use crate::context::ExecutionContext;
use crate::frame::InterpreterFrame;
use crate::hooks::HookPlace;
use crate::normalize::{classify, FaultSite};
use crate::operations as ops;
use crate::scope::Scope;

/// Region index handling `exception`, trying `candidates` in order.
///
/// A region without a type catches everything; a typed region catches
/// values that are of its type. Types that do not resolve to a class never
/// match.
pub fn select_handler(
    cx: &ExecutionContext,
    regions: &[ExceptionInfo],
    candidates: impl IntoIterator<Item = usize>,
    exception: &Value,
) -> Result<Option<usize>, VmError> {
    let host = cx.host();
    for index in candidates {
        let Some(region) = regions.get(index) else {
            continue;
        };
        let Some(type_name) = &region.type_name else {
            return Ok(Some(index));
        };
        if type_name.is_any_name() {
            return Ok(Some(index));
        }
        if let Some(class) = host.get_class(cx, type_name)? {
            if host.is_type(cx, &class, exception)? {
                return Ok(Some(index));
            }
        }
    }
    Ok(None)
}

/// Regions covering `site`, in declaration order
pub fn covering_regions(regions: &[ExceptionInfo], site: usize) -> impl Iterator<Item = usize> + '_ {
    regions
        .iter()
        .enumerate()
        .filter(move |(_, region)| region.covers(site))
        .map(|(index, _)| index)
}

/// Exception value and handler target for a failure at `site`, or the
/// error to propagate when no region catches it
#[inline(never)]
fn catch(cx: &ExecutionContext, regions: &[ExceptionInfo], site: usize, err: VmError) -> Result<(Value, usize), VmError> {
    let exception = match classify(cx, err, &FaultSite::unknown()) {
        VmError::Throw(value) => value,
        other => return Err(other),
    };
    match select_handler(cx, regions, covering_regions(regions, site), &exception)? {
        Some(index) => {
            let target = regions[index].target;
            tracing::trace!(site, handler = target, "exception caught");
            Ok((exception, target))
        }
        None => Err(VmError::Throw(exception)),
    }
}

/// Bytecode interpreter
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

enum Step {
    Continue,
    Return(Value),
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new() -> Self {
        Self
    }

    /// Interpret `method` to completion
    pub fn run(
        &self,
        cx: &ExecutionContext,
        method: &Rc<MethodInfo>,
        scope: &Rc<Scope>,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let Some(body) = method.body.as_ref() else {
            return Ok(Value::Undefined);
        };
        let _guard = cx.enter_frame()?;
        let abc = method.abc()?;
        let mut frame = InterpreterFrame::new(cx, method, scope, receiver, args)?;
        let path = method.hook_path();
        cx.hooks().fire(&path, HookPlace::Begin, &frame.locals[0]);

        let code = Rc::clone(&body.code);
        let mut stream = InstructionStream::new(&code);
        let mut rn = ResolvedName::default();
        loop {
            let site = stream.pc();
            if stream.is_at_end() {
                return Err(Fault::Verify(format!("fell off the end of {}", method.display_name())).into());
            }
            match self.step(cx, &abc, &mut frame, &mut stream, &mut rn) {
                Ok(Step::Continue) => {}
                Ok(Step::Return(value)) => {
                    cx.hooks().fire(&path, HookPlace::Return, &frame.locals[0]);
                    return Ok(value);
                }
                Err(err) if err.is_verify() => return Err(err),
                Err(err) => {
                    let (exception, target) = catch(cx, &body.exceptions, site, err)?;
                    frame.enter_handler(exception);
                    stream.set_pc(target);
                }
            }
        }
    }

    fn step(
        &self,
        cx: &ExecutionContext,
        abc: &Rc<AbcFile>,
        frame: &mut InterpreterFrame,
        stream: &mut InstructionStream<'_>,
        rn: &mut ResolvedName,
    ) -> Result<Step, VmError> {
        let position = stream.pc();
        let op = stream.read_opcode()?;
        tracing::trace!(position, opcode = op.name(), depth = frame.stack.len(), "interpret");
        self.execute(cx, abc, frame, op, position, stream, rn)
            .map_err(|err| if err.is_verify() { err } else { classify(cx, err, &FaultSite::new(op)) })
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        cx: &ExecutionContext,
        abc: &Rc<AbcFile>,
        frame: &mut InterpreterFrame,
        op: Opcode,
        position: usize,
        stream: &mut InstructionStream<'_>,
        rn: &mut ResolvedName,
    ) -> Result<Step, VmError> {
        use Opcode::*;

        if !op.is_supported() {
            return Err(Fault::Verify(format!("unsupported opcode {} at {}", op, position)).into());
        }
        if let Some(step) = operator(cx, frame, op, stream)? {
            return Ok(step);
        }
        // Each family runs in its own frame so that a nested call only pays
        // for the call family's locals.
        match op {
            Nop | Label | Bkpt | Timestamp | DebugLine | DebugFile | BkptLine | Debug | Throw | Jump | IfTrue
            | IfFalse | LookupSwitch => control(cx, frame, op, position, stream),
            _ if op.is_compare_branch() => control(cx, frame, op, position, stream),
            PushNull | PushUndefined | PushTrue | PushFalse | PushNaN | PushByte | PushShort | PushString | PushInt
            | PushUInt | PushDouble | PushNamespace | Pop | Dup | Swap | GetLocal | SetLocal | GetLocal0 | GetLocal1
            | GetLocal2 | GetLocal3 | SetLocal0 | SetLocal1 | SetLocal2 | SetLocal3 | Kill => {
                stack(cx, abc, frame, op, stream)
            }
            PushScope | PushWith | PopScope | GetGlobalScope | GetScopeObject | Dxns | DxnsLate => {
                scopes(cx, abc, frame, op, stream)
            }
            GetProperty | SetProperty | InitProperty | DeleteProperty | GetSuper | SetSuper | FindProperty
            | FindPropStrict | GetLex | GetSlot | SetSlot | GetGlobalSlot | SetGlobalSlot | HasNext | HasNext2
            | NextName | NextValue => properties(cx, abc, frame, op, stream, rn),
            Call | Construct | CallProperty | CallPropLex | CallPropVoid | CallSuper | CallSuperVoid | ConstructProp
            | ConstructSuper | ApplyType | CallStatic | ReturnVoid | ReturnValue => calls(cx, abc, frame, op, stream, rn),
            NewObject | NewArray | NewFunction | NewClass | NewActivation | NewCatch | Coerce | AsType | IsType => {
                creation(cx, abc, frame, op, stream, rn)
            }
            other => Err(unhandled(other, position)),
        }
    }
}

fn unhandled(op: Opcode, position: usize) -> VmError {
    Fault::Verify(format!("unhandled opcode {} at {}", op, position)).into()
}

/// Operators looked up in the shared operation tables
#[inline(never)]
fn operator(
    cx: &ExecutionContext,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
) -> Result<Option<Step>, VmError> {
    if let Some(f) = ops::unary(op) {
        let value = frame.pop()?;
        frame.push(f(cx, value)?)?;
    } else if let Some(f) = ops::binary(op) {
        let b = frame.pop()?;
        let a = frame.pop()?;
        frame.push(f(cx, a, b)?)?;
    } else if let Some(f) = ops::local_update(op) {
        let index = stream.read_u30()?;
        let value = frame.local(index)?;
        frame.set_local(index, f(cx, value)?)?;
    } else {
        return Ok(None);
    }
    Ok(Some(Step::Continue))
}

#[inline(never)]
fn control(
    cx: &ExecutionContext,
    frame: &mut InterpreterFrame,
    op: Opcode,
    position: usize,
    stream: &mut InstructionStream<'_>,
) -> Result<Step, VmError> {
    use Opcode::*;

    match op {
        Nop | Label | Bkpt | Timestamp => {}
        DebugLine | DebugFile | BkptLine => {
            stream.read_u30()?;
        }
        Debug => {
            stream.read_u8()?;
            stream.read_u30()?;
            stream.read_u8()?;
            stream.read_u30()?;
        }
        Throw => {
            let value = frame.pop()?;
            return Err(VmError::Throw(value));
        }
        Jump => {
            let offset = stream.read_s24()?;
            stream.jump_relative(offset)?;
        }
        IfTrue | IfFalse => {
            let offset = stream.read_s24()?;
            let value = frame.pop()?;
            if value.is_truthy() == (op == IfTrue) {
                stream.jump_relative(offset)?;
            }
        }
        _ if op.is_compare_branch() => {
            let offset = stream.read_s24()?;
            let b = frame.pop()?;
            let a = frame.pop()?;
            if ops::branch_taken(cx, op, &a, &b)? {
                stream.jump_relative(offset)?;
            }
        }
        LookupSwitch => {
            let default = stream.read_s24()?;
            let case_count = stream.read_u30()?;
            let index = frame.pop()?;
            let selected = ops::switch_case(&index, case_count);
            let mut offset = default;
            for case in 0..=case_count as usize {
                let case_offset = stream.read_s24()?;
                if selected == Some(case) {
                    offset = case_offset;
                }
            }
            let target = offset_target(position, offset)
                .ok_or_else(|| Fault::Verify(format!("switch target before start at {}", position)))?;
            stream.set_pc(target);
        }
        other => return Err(unhandled(other, position)),
    }
    Ok(Step::Continue)
}

/// Constants, operand stack shuffles and locals
#[inline(never)]
fn stack(
    cx: &ExecutionContext,
    abc: &Rc<AbcFile>,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
) -> Result<Step, VmError> {
    use Opcode::*;

    match op {
        PushNull => frame.push(Value::Null)?,
        PushUndefined => frame.push(Value::Undefined)?,
        PushTrue => frame.push(Value::Boolean(true))?,
        PushFalse => frame.push(Value::Boolean(false))?,
        PushNaN => frame.push(Value::Number(f64::NAN))?,
        PushByte => {
            let byte = stream.read_u8()? as i8;
            frame.push(Value::Int(byte as i32))?;
        }
        PushShort => {
            let raw = stream.read_u30()?;
            frame.push(Value::Int(raw as u16 as i16 as i32))?;
        }
        PushString => {
            let s = abc.string(stream.read_u30()?)?;
            frame.push(Value::String(Rc::clone(s)))?;
        }
        PushInt => {
            let n = abc.int(stream.read_u30()?)?;
            frame.push(Value::Int(n))?;
        }
        PushUInt => {
            let n = abc.uint(stream.read_u30()?)?;
            frame.push(Value::UInt(n))?;
        }
        PushDouble => {
            let n = abc.double(stream.read_u30()?)?;
            frame.push(Value::Number(n))?;
        }
        PushNamespace => {
            let value = ops::push_namespace(cx, abc, stream.read_u30()?)?;
            frame.push(value)?;
        }
        Pop => {
            frame.pop()?;
        }
        Dup => {
            let top = frame.peek()?.clone();
            frame.push(top)?;
        }
        Swap => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(b)?;
            frame.push(a)?;
        }
        GetLocal => {
            let value = frame.local(stream.read_u30()?)?;
            frame.push(value)?;
        }
        SetLocal => {
            let index = stream.read_u30()?;
            let value = frame.pop()?;
            frame.set_local(index, value)?;
        }
        GetLocal0 | GetLocal1 | GetLocal2 | GetLocal3 => {
            let value = frame.local((op as u8 - GetLocal0 as u8) as u32)?;
            frame.push(value)?;
        }
        SetLocal0 | SetLocal1 | SetLocal2 | SetLocal3 => {
            let value = frame.pop()?;
            frame.set_local((op as u8 - SetLocal0 as u8) as u32, value)?;
        }
        Kill => {
            let index = stream.read_u30()?;
            frame.set_local(index, Value::Undefined)?;
        }
        other => return Err(unhandled(other, stream.pc())),
    }
    Ok(Step::Continue)
}

#[inline(never)]
fn scopes(
    cx: &ExecutionContext,
    abc: &Rc<AbcFile>,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
) -> Result<Step, VmError> {
    use Opcode::*;

    match op {
        PushScope | PushWith => {
            let value = frame.pop()?;
            let object = ops::scope_object(cx, op, &value)?;
            frame.push_scope(object, op == PushWith)?;
        }
        PopScope => frame.pop_scope()?,
        GetGlobalScope => {
            let global = frame.saved_scope().global_object().clone();
            frame.push(global)?;
        }
        GetScopeObject => {
            let index = stream.read_u8()?;
            let object = frame
                .scopes
                .get(index as usize)
                .cloned()
                .ok_or_else(|| Fault::Verify(format!("scope index {} out of range", index)))?;
            frame.push(object)?;
        }
        Dxns => {
            let uri = Rc::clone(abc.string(stream.read_u30()?)?);
            frame.scopes.top_scope().set_default_namespace(uri);
        }
        DxnsLate => {
            let value = frame.pop()?;
            ops::dxns_late(cx, &frame.scopes.top_scope(), &value)?;
        }
        other => return Err(unhandled(other, stream.pc())),
    }
    Ok(Step::Continue)
}

/// Properties, slots and enumeration
#[inline(never)]
fn properties(
    cx: &ExecutionContext,
    abc: &Rc<AbcFile>,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
    rn: &mut ResolvedName,
) -> Result<Step, VmError> {
    use Opcode::*;

    match op {
        GetProperty => {
            let mn = abc.multiname(stream.read_u30()?)?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            frame.push(ops::get_property(cx, &receiver, rn)?)?;
        }
        SetProperty | InitProperty => {
            let mn = abc.multiname(stream.read_u30()?)?;
            let value = frame.pop()?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            ops::set_property(cx, op, &receiver, rn, value)?;
        }
        DeleteProperty => {
            let mn = abc.multiname(stream.read_u30()?)?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            frame.push(ops::delete_property(cx, &receiver, rn)?)?;
        }
        GetSuper => {
            let mn = abc.multiname(stream.read_u30()?)?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            let value = ops::get_super(cx, frame.saved_scope(), &receiver, rn)?;
            frame.push(value)?;
        }
        SetSuper => {
            let mn = abc.multiname(stream.read_u30()?)?;
            let value = frame.pop()?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            ops::set_super(cx, frame.saved_scope(), &receiver, rn, value)?;
        }
        FindProperty | FindPropStrict => {
            let mn = abc.multiname(stream.read_u30()?)?;
            frame.pop_name(cx, mn, rn)?;
            let object = ops::find_property(cx, op, &frame.scopes.top_scope(), rn)?;
            frame.push(object)?;
        }
        GetLex => {
            let mn = abc.multiname(stream.read_u30()?)?;
            frame.pop_name(cx, mn, rn)?;
            let value = ops::get_lex(cx, &frame.scopes.top_scope(), rn)?;
            frame.push(value)?;
        }
        GetSlot => {
            let index = stream.read_u30()?;
            let object = frame.pop()?;
            frame.push(ops::get_slot(cx, op, &object, index)?)?;
        }
        SetSlot => {
            let index = stream.read_u30()?;
            let value = frame.pop()?;
            let object = frame.pop()?;
            ops::set_slot(cx, op, &object, index, value)?;
        }
        GetGlobalSlot => {
            let index = stream.read_u30()?;
            let global = frame.saved_scope().global_object().clone();
            frame.push(ops::get_slot(cx, op, &global, index)?)?;
        }
        SetGlobalSlot => {
            let index = stream.read_u30()?;
            let value = frame.pop()?;
            let global = frame.saved_scope().global_object().clone();
            ops::set_slot(cx, op, &global, index, value)?;
        }
        HasNext => {
            let index = frame.pop()?;
            let object = frame.pop()?;
            frame.push(ops::has_next(cx, &object, &index)?)?;
        }
        HasNext2 => {
            let object_reg = stream.read_u30()?;
            let index_reg = stream.read_u30()?;
            let (object, index, more) = ops::has_next2(cx, &frame.local(object_reg)?, &frame.local(index_reg)?)?;
            frame.set_local(object_reg, object)?;
            frame.set_local(index_reg, index)?;
            frame.push(Value::Boolean(more))?;
        }
        NextName | NextValue => {
            let index = frame.pop()?;
            let object = frame.pop()?;
            let value = if op == NextName {
                ops::next_name(cx, &object, &index)?
            } else {
                ops::next_value(cx, &object, &index)?
            };
            frame.push(value)?;
        }
        other => return Err(unhandled(other, stream.pc())),
    }
    Ok(Step::Continue)
}

/// Calls and returns. This is the only family on the path of a nested
/// invocation, so it keeps its locals few.
#[inline(never)]
fn calls(
    cx: &ExecutionContext,
    abc: &Rc<AbcFile>,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
    rn: &mut ResolvedName,
) -> Result<Step, VmError> {
    use Opcode::*;

    let result = match op {
        Call => {
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            let receiver = frame.pop()?;
            let callee = frame.pop()?;
            ops::call(cx, &callee, receiver, &args)?
        }
        Construct => {
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            let class = frame.pop()?;
            ops::construct(cx, &class, &args)?
        }
        ApplyType => {
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            let factory = frame.pop()?;
            ops::apply_type(cx, &factory, &args)?
        }
        CallStatic => {
            let index = stream.read_u30()?;
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            let receiver = frame.pop()?;
            ops::call_static(cx, abc, index, frame.saved_scope(), receiver, &args)?
        }
        CallProperty | CallPropLex | CallPropVoid | CallSuper | CallSuperVoid | ConstructProp => {
            let mn = abc.multiname(stream.read_u30()?)?;
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            frame.pop_name(cx, mn, rn)?;
            let receiver = frame.pop()?;
            let result = match op {
                CallSuper | CallSuperVoid => ops::call_super(cx, op, frame.saved_scope(), &receiver, rn, &args)?,
                ConstructProp => ops::construct_property(cx, &receiver, rn, &args)?,
                _ => ops::call_property(cx, op, &receiver, rn, &args)?,
            };
            if matches!(op, CallPropVoid | CallSuperVoid) {
                return Ok(Step::Continue);
            }
            result
        }
        ConstructSuper => {
            let argc = stream.read_u30()? as usize;
            let args = frame.pop_args(argc)?;
            let receiver = frame.pop()?;
            ops::construct_super(cx, frame.saved_scope(), &receiver, &args)?;
            return Ok(Step::Continue);
        }
        ReturnVoid => return Ok(Step::Return(Value::Undefined)),
        ReturnValue => {
            let value = frame.pop()?;
            return Ok(Step::Return(ops::coerce_return(cx, &frame.method, frame.saved_scope(), value)?));
        }
        other => return Err(unhandled(other, stream.pc())),
    };
    frame.push(result)?;
    Ok(Step::Continue)
}

/// Object creation and named type operations
#[inline(never)]
fn creation(
    cx: &ExecutionContext,
    abc: &Rc<AbcFile>,
    frame: &mut InterpreterFrame,
    op: Opcode,
    stream: &mut InstructionStream<'_>,
    rn: &mut ResolvedName,
) -> Result<Step, VmError> {
    use Opcode::*;

    let value = match op {
        NewObject => {
            let argc = stream.read_u30()? as usize;
            let pairs = frame.pop_args(argc * 2)?;
            ops::new_object(cx, pairs)?
        }
        NewArray => {
            let argc = stream.read_u30()? as usize;
            let values = frame.pop_args(argc)?;
            ops::new_array(cx, values)
        }
        NewFunction => {
            let index = stream.read_u30()?;
            ops::new_function(cx, abc, index, &frame.scopes.top_scope())?
        }
        NewClass => {
            let index = stream.read_u30()?;
            let base = frame.pop()?;
            ops::new_class(cx, abc, index, &base, &frame.scopes.top_scope())?
        }
        NewActivation => {
            let method = Rc::clone(&frame.method);
            ops::new_activation(cx, &method, &frame.scopes.top_scope())?
        }
        NewCatch => {
            let index = stream.read_u30()?;
            let method = Rc::clone(&frame.method);
            ops::new_catch(cx, &method, index, &frame.scopes.top_scope())?
        }
        Coerce | AsType | IsType => {
            let mn = abc.multiname(stream.read_u30()?)?;
            rn.reset(mn);
            let value = frame.pop()?;
            ops::named_type(cx, op, &frame.scopes.top_scope(), rn, value)?
        }
        other => return Err(unhandled(other, stream.pc())),
    };
    frame.push(value)?;
    Ok(Step::Continue)
}
