//! Unit tests for bytecode_system

mod test_abc;
mod test_opcode;
mod test_reader;
