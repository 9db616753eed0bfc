//! Instruction stream reader
//!
//! Decodes opcodes and their variable-length operands from a method's code
//! buffer. One stream belongs to one execution frame at a time.

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// Cursor over an immutable code buffer.
///
/// # Example
///
/// ```
/// use bytecode_system::{InstructionStream, Opcode};
///
/// let code = [0x24, 0x02, 0x10, 0xFD, 0xFF, 0xFF];
/// let mut stream = InstructionStream::new(&code);
/// assert_eq!(stream.read_opcode().unwrap(), Opcode::PushByte);
/// assert_eq!(stream.read_u8().unwrap(), 2);
/// assert_eq!(stream.read_opcode().unwrap(), Opcode::Jump);
/// assert_eq!(stream.read_s24().unwrap(), -3);
/// assert!(stream.is_at_end());
/// ```
#[derive(Debug, Clone)]
pub struct InstructionStream<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> InstructionStream<'a> {
    /// Create a stream positioned at the start of `code`
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }

    /// Current program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Move the program counter
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Length of the underlying code buffer
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether the code buffer is empty
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Whether every byte has been consumed
    pub fn is_at_end(&self) -> bool {
        self.pc >= self.code.len()
    }

    /// Next raw byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or(DecodeError::UnexpectedEnd(self.pc))?;
        self.pc += 1;
        Ok(byte)
    }

    /// Next opcode byte
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let position = self.pc;
        let byte = self.read_u8()?;
        Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, position })
    }

    /// Next unsigned 30-bit variable-length integer.
    ///
    /// Each byte carries seven payload bits; bit `0x80` marks continuation.
    /// A fifth byte may only contribute bits 28 and 29.
    pub fn read_u30(&mut self) -> Result<u32, DecodeError> {
        let start = self.pc;
        let mut result: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            if i == 4 && byte > 0x03 {
                return Err(DecodeError::MalformedU30(start));
            }
            result |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(DecodeError::MalformedU30(start))
    }

    /// Next signed 24-bit little-endian branch offset.
    ///
    /// Branch targets are relative to the position right after these three
    /// bytes.
    pub fn read_s24(&mut self) -> Result<i32, DecodeError> {
        let b0 = self.read_u8()? as u32;
        let b1 = self.read_u8()? as u32;
        let b2 = self.read_u8()? as u32;
        let raw = b0 | (b1 << 8) | (b2 << 16);
        Ok(((raw << 8) as i32) >> 8)
    }

    /// Add a signed offset to the program counter.
    pub fn jump_relative(&mut self, offset: i32) -> Result<(), DecodeError> {
        self.pc = offset_target(self.pc, offset).ok_or(DecodeError::UnexpectedEnd(self.pc))?;
        Ok(())
    }
}

/// `base + offset`, or `None` when that lands before the start of the code.
pub fn offset_target(base: usize, offset: i32) -> Option<usize> {
    let target = base as i64 + offset as i64;
    usize::try_from(target).ok()
}
