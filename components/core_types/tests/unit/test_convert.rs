//! Tests for numeric and string coercion helpers

use core_types::convert::{primitive_to_number, primitive_to_string};
use core_types::{
    number_to_string, parse_numeric_name, string_to_number, to_int32, to_radix_string, to_uint32,
    Fault, Value,
};

#[test]
fn test_int32_wrapping() {
    assert_eq!(to_int32(4294967295.0), -1);
    assert_eq!(to_int32(-2147483649.0), 2147483647);
    assert_eq!(to_int32(3.99), 3);
    assert_eq!(to_int32(f64::INFINITY), 0);
}

#[test]
fn test_uint32_wrapping() {
    assert_eq!(to_uint32(-2.0), 4294967294);
    assert_eq!(to_uint32(1.5), 1);
}

#[test]
fn test_number_formatting_matches_script_rules() {
    assert_eq!(number_to_string(100.0), "100");
    assert_eq!(number_to_string(1.25), "1.25");
    assert_eq!(number_to_string(123e-20), "1.23e-18");
    assert_eq!(number_to_string(2e21), "2e+21");
    assert_eq!(number_to_string(f64::INFINITY), "Infinity");
}

#[test]
fn test_radix_formatting_and_range() {
    assert_eq!(to_radix_string(10.0, 2), Ok("1010".to_string()));
    assert_eq!(to_radix_string(0.5, 2), Ok("0.1".to_string()));
    assert_eq!(to_radix_string(35.0, 36), Ok("z".to_string()));
    assert_eq!(to_radix_string(1.0, 1), Err(Fault::InvalidRadix(1)));
}

#[test]
fn test_string_to_number_edge_cases() {
    assert_eq!(string_to_number("\t7\n"), 7.0);
    assert_eq!(string_to_number("1e3"), 1000.0);
    assert!(string_to_number("abc").is_nan());
    assert!(string_to_number("0xZZ").is_nan());
}

#[test]
fn test_numeric_names() {
    assert_eq!(parse_numeric_name("0"), Some(0.0));
    assert_eq!(parse_numeric_name("3.25"), Some(3.25));
    assert_eq!(parse_numeric_name("1E2"), Some(100.0));
    assert_eq!(parse_numeric_name("1e"), None);
    assert_eq!(parse_numeric_name("12 "), None);
    assert_eq!(parse_numeric_name("--1"), None);
}

#[test]
fn test_primitive_helpers() {
    assert_eq!(primitive_to_number(&Value::Boolean(true)), 1.0);
    assert_eq!(primitive_to_number(&Value::string(" 8 ")), 8.0);
    assert_eq!(&*primitive_to_string(&Value::Undefined), "undefined");
    assert_eq!(&*primitive_to_string(&Value::Number(-1.5)), "-1.5");
}
