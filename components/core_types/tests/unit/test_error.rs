//! Tests for error types

use core_types::{error_codes, ErrorKind, Fault, Value, VmError};

#[test]
fn test_error_kind_variants() {
    let kinds = [
        ErrorKind::VerifyError,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::RangeError,
        ErrorKind::ArgumentError,
        ErrorKind::InternalError,
    ];
    let names: Vec<_> = kinds.iter().map(|k| k.class_name()).collect();
    assert_eq!(
        names,
        [
            "VerifyError",
            "TypeError",
            "ReferenceError",
            "RangeError",
            "ArgumentError",
            "Error"
        ]
    );
}

#[test]
fn test_error_codes_are_distinct() {
    let mut codes = vec![
        error_codes::INTERNAL_ERROR,
        error_codes::INVALID_RADIX,
        error_codes::CALL_OF_NON_FUNCTION,
        error_codes::CONSTRUCT_OF_NON_FUNCTION,
        error_codes::CONVERT_NULL,
        error_codes::CONVERT_UNDEFINED,
        error_codes::ILLEGAL_OPCODE,
        error_codes::CLASS_NOT_FOUND,
        error_codes::INVALID_BASE_CLASS,
        error_codes::STACK_OVERFLOW,
        error_codes::STACK_UNDERFLOW,
        error_codes::FRAME_STACK_OVERFLOW,
        error_codes::CHECK_TYPE_FAILED,
        error_codes::CANT_USE_INSTANCEOF,
        error_codes::IS_TYPE_MUST_BE_CLASS,
        error_codes::CONVERT_TO_PRIMITIVE,
        error_codes::WRITE_SEALED,
        error_codes::WRONG_ARGUMENT_COUNT,
        error_codes::UNDEFINED_VAR,
        error_codes::READ_SEALED,
        error_codes::CONST_WRITE,
    ];
    let total = codes.len();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), total);
}

#[test]
fn test_throw_carries_value() {
    let err = VmError::Throw(Value::string("boom"));
    assert_eq!(err.thrown(), Some(&Value::string("boom")));
    assert!(err.as_fault().is_none());
}

#[test]
fn test_fault_display_is_transparent() {
    let err = VmError::from(Fault::ClassNotFound("Foo".into()));
    assert_eq!(err.to_string(), "class Foo could not be found");
}

#[test]
fn test_message_substitutes_every_argument() {
    let message = error_codes::format_message(
        error_codes::WRONG_ARGUMENT_COUNT,
        &["__root__/f".to_string(), "2".to_string(), "0".to_string()],
    );
    assert_eq!(
        message,
        "Error #1063: Argument count mismatch on __root__/f. Expected 2, got 0."
    );
}

#[test]
fn test_unknown_code_falls_back_to_internal_template() {
    let message = error_codes::format_message(4242, &["boom".to_string()]);
    assert_eq!(message, "Error #4242: Internal error: boom");
}
