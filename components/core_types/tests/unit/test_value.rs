//! Tests for Value

use core_types::{ObjectId, Value};

#[test]
fn test_default_is_undefined() {
    assert_eq!(Value::default(), Value::Undefined);
}

#[test]
fn test_truthiness_table() {
    let falsy = [
        Value::Undefined,
        Value::Null,
        Value::Boolean(false),
        Value::Int(0),
        Value::UInt(0),
        Value::Number(-0.0),
        Value::Number(f64::NAN),
        Value::string(""),
    ];
    for v in falsy {
        assert!(!v.is_truthy(), "{:?} should be falsy", v);
    }

    let truthy = [
        Value::Boolean(true),
        Value::Int(-3),
        Value::Number(0.1),
        Value::string("0"),
        Value::Object(ObjectId(0)),
    ];
    for v in truthy {
        assert!(v.is_truthy(), "{:?} should be truthy", v);
    }
}

#[test]
fn test_conversions_from_rust_types() {
    assert_eq!(Value::from(3), Value::Int(3));
    assert_eq!(Value::from(3u32), Value::UInt(3));
    assert_eq!(Value::from("x"), Value::string("x"));
    assert_eq!(Value::from(String::from("y")).as_str(), Some("y"));
    assert_eq!(Value::from(ObjectId(9)).as_object(), Some(ObjectId(9)));
}

#[test]
fn test_nullish_and_numeric_predicates() {
    assert!(Value::Null.is_nullish());
    assert!(Value::Undefined.is_nullish());
    assert!(!Value::Int(0).is_nullish());
    assert!(Value::UInt(1).is_number());
    assert!(!Value::string("1").is_number());
    assert_eq!(Value::UInt(7).as_number(), Some(7.0));
}

#[test]
fn test_display_uses_number_formatting() {
    assert_eq!(Value::Number(1e21).to_string(), "1e+21");
    assert_eq!(Value::Int(-4).to_string(), "-4");
    assert_eq!(Value::Boolean(false).to_string(), "false");
    assert_eq!(Value::Null.to_string(), "null");
}
