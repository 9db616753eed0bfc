//! Tests for InstructionStream and CodeBuilder working together

use bytecode_system::{encode_u30, CodeBuilder, DecodeError, InstructionStream, Opcode};

#[test]
fn test_u30_values_survive_encoding() {
    for value in [0u32, 1, 127, 128, 16_383, 16_384, 1 << 21, (1 << 30) - 1] {
        let mut bytes = Vec::new();
        encode_u30(value, &mut bytes);
        let mut stream = InstructionStream::new(&bytes);
        assert_eq!(stream.read_u30().unwrap(), value);
        assert!(stream.is_at_end());
    }
}

#[test]
fn test_jump_target_is_past_the_offset_field() {
    // JUMP at p=0 with offset o=4: the target is p + 1 + 3 + o = 8.
    let mut code = CodeBuilder::new();
    code.op(Opcode::Jump).s24(4);
    let bytes = code.finish().unwrap();
    let mut stream = InstructionStream::new(&bytes);
    stream.read_opcode().unwrap();
    let offset = stream.read_s24().unwrap();
    stream.jump_relative(offset).unwrap();
    assert_eq!(stream.pc(), 8);
}

#[test]
fn test_lookup_switch_encoding() {
    let mut code = CodeBuilder::new();
    code.op(Opcode::Nop);
    let default = code.new_label();
    let first = code.new_label();
    let second = code.new_label();
    code.lookup_switch(default, &[first, second]);
    code.bind(first).op(Opcode::Nop);
    code.bind(second).op(Opcode::Nop);
    code.bind(default).op(Opcode::ReturnVoid);
    let bytes = code.finish().unwrap();

    let mut stream = InstructionStream::new(&bytes);
    assert_eq!(stream.read_opcode().unwrap(), Opcode::Nop);
    let base = stream.pc();
    assert_eq!(stream.read_opcode().unwrap(), Opcode::LookupSwitch);
    let default_offset = stream.read_s24().unwrap();
    assert_eq!(stream.read_u30().unwrap(), 1);
    let first_offset = stream.read_s24().unwrap();
    let second_offset = stream.read_s24().unwrap();
    let end_of_switch = stream.pc();

    assert_eq!(base as i32 + first_offset, end_of_switch as i32);
    assert_eq!(base as i32 + second_offset, end_of_switch as i32 + 1);
    assert_eq!(base as i32 + default_offset, end_of_switch as i32 + 2);
}

#[test]
fn test_push_short_sign_bits_are_kept_in_16_bits() {
    let mut code = CodeBuilder::new();
    code.push_short(-2);
    let bytes = code.finish().unwrap();
    let mut stream = InstructionStream::new(&bytes);
    stream.read_opcode().unwrap();
    assert_eq!(stream.read_u30().unwrap(), 0xFFFE);
}

#[test]
fn test_truncated_u30() {
    let mut stream = InstructionStream::new(&[0x80, 0x80]);
    assert_eq!(stream.read_u30(), Err(DecodeError::UnexpectedEnd(2)));
}

#[test]
fn test_local_shortcuts() {
    let mut code = CodeBuilder::new();
    code.get_local(2).get_local(9).set_local(0).set_local(4);
    let bytes = code.finish().unwrap();
    assert_eq!(
        bytes,
        vec![
            Opcode::GetLocal2 as u8,
            Opcode::GetLocal as u8,
            9,
            Opcode::SetLocal0 as u8,
            Opcode::SetLocal as u8,
            4
        ]
    );
}
