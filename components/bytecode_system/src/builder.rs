//! Programmatic assembly of method bodies and ABC files
//!
//! [`CodeBuilder`] emits AVM2 instructions with label-based branches.
//! [`AbcBuilder`] collects constant pools, methods and classes into an
//! [`AbcFile`].
//!
//! # Example
//!
//! ```
//! use bytecode_system::{AbcBuilder, CodeBuilder, MethodBody, MethodInfo, Opcode};
//!
//! let mut code = CodeBuilder::new();
//! code.push_byte(2).push_byte(3).op(Opcode::Add).op(Opcode::ReturnValue);
//!
//! let mut abc = AbcBuilder::new();
//! let index = abc.method(
//!     MethodInfo::new(0).with_body(MethodBody::new(code.finish().unwrap(), 2, 1)),
//! );
//! let file = abc.build();
//! assert_eq!(file.method(index).unwrap().body.as_ref().unwrap().code.len(), 6);
//! ```

use std::rc::Rc;

use thiserror::Error;

use crate::abc::{AbcFile, ConstantPool};
use crate::method::{ClassInfo, MethodInfo};
use crate::multiname::{Multiname, Namespace};
use crate::opcode::Opcode;

/// Failure while finishing a code buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A branch refers to a label that was never bound
    #[error("label {0} was never bound")]
    UnboundLabel(usize),
    /// Branch distance does not fit in 24 bits
    #[error("branch offset {0} does not fit in 24 bits")]
    OffsetOverflow(i64),
}

/// Branch target handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
struct Fixup {
    field: usize,
    base: usize,
    label: Label,
}

/// Append a u30 to a buffer
pub fn encode_u30(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Instruction emitter with label fixups
#[derive(Debug, Clone, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl CodeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the next emitted byte
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Emit an opcode byte
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    /// Emit a raw byte
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.code.push(value);
        self
    }

    /// Emit a u30
    pub fn u30(&mut self, value: u32) -> &mut Self {
        encode_u30(value, &mut self.code);
        self
    }

    /// Emit a raw s24
    pub fn s24(&mut self, value: i32) -> &mut Self {
        let bytes = value.to_le_bytes();
        self.code.extend_from_slice(&bytes[..3]);
        self
    }

    /// Emit an opcode with one u30 operand
    pub fn op_u30(&mut self, op: Opcode, operand: u32) -> &mut Self {
        self.op(op).u30(operand)
    }

    /// Emit an opcode with two u30 operands
    pub fn op_u30x2(&mut self, op: Opcode, first: u32, second: u32) -> &mut Self {
        self.op(op).u30(first).u30(second)
    }

    /// `PUSHBYTE`
    pub fn push_byte(&mut self, value: i8) -> &mut Self {
        self.op(Opcode::PushByte).u8(value as u8)
    }

    /// `PUSHSHORT`
    pub fn push_short(&mut self, value: i16) -> &mut Self {
        self.op(Opcode::PushShort).u30(value as u16 as u32)
    }

    /// Shortest `GETLOCAL` form
    pub fn get_local(&mut self, index: u32) -> &mut Self {
        match index {
            0 => self.op(Opcode::GetLocal0),
            1 => self.op(Opcode::GetLocal1),
            2 => self.op(Opcode::GetLocal2),
            3 => self.op(Opcode::GetLocal3),
            n => self.op_u30(Opcode::GetLocal, n),
        }
    }

    /// Shortest `SETLOCAL` form
    pub fn set_local(&mut self, index: u32) -> &mut Self {
        match index {
            0 => self.op(Opcode::SetLocal0),
            1 => self.op(Opcode::SetLocal1),
            2 => self.op(Opcode::SetLocal2),
            3 => self.op(Opcode::SetLocal3),
            n => self.op_u30(Opcode::SetLocal, n),
        }
    }

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Emit a branch instruction targeting `label`
    pub fn branch(&mut self, op: Opcode, label: Label) -> &mut Self {
        self.op(op);
        let field = self.code.len();
        self.s24(0);
        self.fixups.push(Fixup {
            field,
            base: field + 3,
            label,
        });
        self
    }

    /// Emit `LOOKUPSWITCH`; offsets are relative to the opcode position
    pub fn lookup_switch(&mut self, default: Label, cases: &[Label]) -> &mut Self {
        let base = self.code.len();
        self.op(Opcode::LookupSwitch);
        let emit_case = |builder: &mut Self, label: Label| {
            let field = builder.code.len();
            builder.s24(0);
            builder.fixups.push(Fixup { field, base, label });
        };
        emit_case(self, default);
        self.u30(cases.len().saturating_sub(1) as u32);
        for &label in cases {
            emit_case(self, label);
        }
        self
    }

    /// Resolve labels and return the code buffer
    pub fn finish(&self) -> Result<Vec<u8>, BuildError> {
        let mut code = self.code.clone();
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].ok_or(BuildError::UnboundLabel(fixup.label.0))?;
            let offset = target as i64 - fixup.base as i64;
            if !(-(1 << 23)..(1 << 23)).contains(&offset) {
                return Err(BuildError::OffsetOverflow(offset));
            }
            let bytes = (offset as i32).to_le_bytes();
            code[fixup.field..fixup.field + 3].copy_from_slice(&bytes[..3]);
        }
        Ok(code)
    }
}

/// Collects pools, methods and classes into an [`AbcFile`]
#[derive(Debug, Default)]
pub struct AbcBuilder {
    pool: ConstantPool,
    methods: Vec<MethodInfo>,
    classes: Vec<ClassInfo>,
}

impl AbcBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string constant
    pub fn string(&mut self, value: &str) -> u32 {
        intern(&mut self.pool.strings, value.into(), |a, b| a == b)
    }

    /// Intern an int constant
    pub fn int(&mut self, value: i32) -> u32 {
        intern(&mut self.pool.ints, value, |a, b| a == b)
    }

    /// Intern a uint constant
    pub fn uint(&mut self, value: u32) -> u32 {
        intern(&mut self.pool.uints, value, |a, b| a == b)
    }

    /// Intern a double constant (bitwise, so NaN and -0 are kept apart)
    pub fn double(&mut self, value: f64) -> u32 {
        intern(&mut self.pool.doubles, value, |a, b| a.to_bits() == b.to_bits())
    }

    /// Intern a namespace constant
    pub fn namespace(&mut self, ns: Namespace) -> u32 {
        intern(&mut self.pool.namespaces, ns, |a, b| a == b)
    }

    /// Add a multiname constant, assigning its id
    pub fn multiname(&mut self, mut mn: Multiname) -> u32 {
        let index = self.pool.multinames.len() as u32;
        mn.id = index;
        self.pool.multinames.push(Rc::new(mn));
        index
    }

    /// Add a public qualified name
    pub fn public_name(&mut self, name: &str) -> u32 {
        if let Some(existing) = self.pool.multinames.iter().position(|mn| {
            mn.kind == crate::MultinameKind::QName
                && mn.name.as_deref() == Some(name)
                && mn.namespaces.len() == 1
                && mn.namespaces[0] == Namespace::public()
        }) {
            return existing as u32;
        }
        self.multiname(Multiname::public_qname(name))
    }

    /// Shared handle to a multiname already added
    pub fn multiname_ref(&self, index: u32) -> Option<Rc<Multiname>> {
        self.pool.multinames.get(index as usize).cloned()
    }

    /// Index the next added method will get
    pub fn next_method_index(&self) -> u32 {
        self.methods.len() as u32
    }

    /// Add a method, assigning its index
    pub fn method(&mut self, mut method: MethodInfo) -> u32 {
        let index = self.methods.len() as u32;
        method.index = index;
        self.methods.push(method);
        index
    }

    /// Add a class, assigning its index
    pub fn class(&mut self, mut class: ClassInfo) -> u32 {
        let index = self.classes.len() as u32;
        class.index = index;
        self.classes.push(class);
        index
    }

    /// Finish the file
    pub fn build(self) -> Rc<AbcFile> {
        AbcFile::new(self.pool, self.methods, self.classes)
    }
}

fn intern<T>(pool: &mut Vec<T>, value: T, same: impl Fn(&T, &T) -> bool) -> u32 {
    if let Some(index) = pool.iter().position(|existing| same(existing, &value)) {
        return index as u32;
    }
    pool.push(value);
    (pool.len() - 1) as u32
}
