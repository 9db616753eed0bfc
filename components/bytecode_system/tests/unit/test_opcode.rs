//! Tests for the opcode table

use bytecode_system::{OperandLayout, Opcode};

#[test]
fn test_every_known_byte_decodes_to_itself() {
    for byte in 0u8..=255 {
        if let Some(op) = Opcode::from_byte(byte) {
            assert_eq!(op as u8, byte, "{} encodes differently", op);
        }
    }
}

#[test]
fn test_mnemonics() {
    assert_eq!(Opcode::CoerceS.name(), "coerce_s");
    assert_eq!(Opcode::LookupSwitch.to_string(), "lookupswitch");
}

#[test]
fn test_terminators() {
    for op in [
        Opcode::Jump,
        Opcode::LookupSwitch,
        Opcode::Throw,
        Opcode::ReturnVoid,
        Opcode::ReturnValue,
    ] {
        assert!(op.is_terminator());
    }
    assert!(!Opcode::IfTrue.is_terminator());
}

#[test]
fn test_compare_branches_take_offsets() {
    for byte in 0u8..=255 {
        if let Some(op) = Opcode::from_byte(byte) {
            if op.is_compare_branch() {
                assert_eq!(op.operands(), OperandLayout::S24);
            }
        }
    }
}

#[test]
fn test_lookup_switch_and_debug_layouts() {
    assert_eq!(Opcode::LookupSwitch.operands(), OperandLayout::LookupSwitch);
    assert_eq!(Opcode::Debug.operands(), OperandLayout::Debug);
    assert_eq!(Opcode::HasNext2.operands(), OperandLayout::U30x2);
    assert_eq!(Opcode::GetScopeObject.operands(), OperandLayout::U8);
}
