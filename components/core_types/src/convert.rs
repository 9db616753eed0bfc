//! Number and string coercion helpers.
//!
//! These cover the primitive half of the AVM2 conversion rules. Anything
//! involving objects (`valueOf`, `toString`) goes through the object model
//! first and lands here once a primitive is available.

use std::rc::Rc;

use crate::{Fault, Value};

/// ECMAScript `ToInt32`.
///
/// ```
/// use core_types::to_int32;
///
/// assert_eq!(to_int32(2147483648.0), -2147483648);
/// assert_eq!(to_int32(-1.5), -1);
/// assert_eq!(to_int32(f64::NAN), 0);
/// ```
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ECMAScript `ToUint32`.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32
}

/// Format a number the way `Number.prototype.toString()` does.
///
/// ```
/// use core_types::number_to_string;
///
/// assert_eq!(number_to_string(5.0), "5");
/// assert_eq!(number_to_string(0.1), "0.1");
/// assert_eq!(number_to_string(1e21), "1e+21");
/// assert_eq!(number_to_string(1.5e-7), "1.5e-7");
/// assert_eq!(number_to_string(-0.0), "0");
/// ```
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let formatted = buffer.format_finite(n.abs());
    let (mantissa, exponent) = match formatted.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (formatted, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let mut digits: String = format!("{int_part}{frac_part}");
    let mut point = int_part.len() as i32 + exponent;
    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    point -= leading as i32;
    let trimmed = digits.trim_end_matches('0').len();
    digits.truncate(trimmed);

    let k = digits.len() as i32;
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((point - k) as usize));
    } else if 0 < point && point <= 21 {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(&digits);
    } else {
        let e = point - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    }
    out
}

/// Format a number in the given radix (`Number.prototype.toString(radix)`).
///
/// Radixes outside `2..=36` are rejected with [`Fault::InvalidRadix`].
///
/// ```
/// use core_types::to_radix_string;
///
/// assert_eq!(to_radix_string(255.0, 16).unwrap(), "ff");
/// assert_eq!(to_radix_string(-5.0, 2).unwrap(), "-101");
/// assert!(to_radix_string(1.0, 37).is_err());
/// ```
pub fn to_radix_string(n: f64, radix: i32) -> Result<String, Fault> {
    if !(2..=36).contains(&radix) {
        return Err(Fault::InvalidRadix(radix));
    }
    if radix == 10 || !n.is_finite() {
        return Ok(number_to_string(n));
    }

    let radix_f = radix as f64;
    let mut int_part = n.abs().trunc();
    let mut frac = n.abs() - int_part;

    let mut int_digits = Vec::new();
    loop {
        let d = (int_part % radix_f) as u32;
        int_digits.push(std::char::from_digit(d, radix as u32).unwrap_or('0'));
        int_part = (int_part / radix_f).trunc();
        if int_part < 1.0 {
            break;
        }
    }

    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    out.extend(int_digits.iter().rev());
    if frac > 0.0 {
        out.push('.');
        let mut count = 0;
        while frac > 0.0 && count < 20 {
            frac *= radix_f;
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix as u32).unwrap_or('0'));
            frac -= d as f64;
            count += 1;
        }
    }
    Ok(out)
}

/// String to number conversion (`Number("...")`).
///
/// Surrounding whitespace is ignored, the empty string is `0`, hex literals
/// are accepted, and anything else unparseable is `NaN`.
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let plausible = s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !plausible {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Decide whether a runtime property name is numeric.
///
/// Accepts an optional `-`, decimal digits, an optional fraction and an
/// optional exponent, with no surrounding whitespace, parsing to a finite
/// number. Hex, `Infinity`, `NaN` and a leading `+` are not numeric names.
///
/// ```
/// use core_types::parse_numeric_name;
///
/// assert_eq!(parse_numeric_name("12"), Some(12.0));
/// assert_eq!(parse_numeric_name("-1.5e2"), Some(-150.0));
/// assert_eq!(parse_numeric_name(" 12"), None);
/// assert_eq!(parse_numeric_name("0x10"), None);
/// assert_eq!(parse_numeric_name("Infinity"), None);
/// ```
pub fn parse_numeric_name(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }

    let digits = |i: &mut usize| {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > start
    };

    if !digits(&mut i) {
        return None;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        if !digits(&mut i) {
            return None;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return None;
        }
    }
    if i != bytes.len() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Number conversion for primitives. Objects yield `NaN`; convert them to a
/// primitive through the object model first.
pub fn primitive_to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Int(n) => *n as f64,
        Value::UInt(n) => *n as f64,
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Object(_) => f64::NAN,
    }
}

/// String conversion for primitives (`String(value)`).
pub fn primitive_to_string(value: &Value) -> Rc<str> {
    match value {
        Value::Undefined => "undefined".into(),
        Value::Null => "null".into(),
        Value::Boolean(true) => "true".into(),
        Value::Boolean(false) => "false".into(),
        Value::Int(n) => n.to_string().into(),
        Value::UInt(n) => n.to_string().into(),
        Value::Number(n) => number_to_string(*n).into(),
        Value::String(s) => Rc::clone(s),
        Value::Object(_) => "[object Object]".into(),
    }
}
