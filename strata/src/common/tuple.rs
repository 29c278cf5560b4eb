//! Order-preserving tuple encoding.
//!
//! A tuple is packed element by element into a byte string whose
//! lexicographic order matches the element-wise order of the tuples. Every
//! element is self-delimiting, so packing `a ++ b` yields `pack(a) ++ pack(b)`
//! and the packed form of a prefix is a byte prefix of every extension.
//!
//! | element | encoding |
//! |---------|----------|
//! | `Null`  | `0x00` |
//! | `Bytes` | `0x01`, bytes with `0x00` escaped as `0x00 0xFF`, `0x00` |
//! | `String`| `0x02`, UTF-8 escaped like bytes, `0x00` |
//! | `Int`   | `0x14`, 8 bytes big endian with the sign bit flipped |
//! | `Float` | `0x21`, 8 bytes of order-preserving IEEE-754 bits |
//! | `Bool`  | `0x26` (false) / `0x27` (true) |

use crate::common::Value;
use crate::errors::{ErrorKind, StrataError, StrataResult};

/// An ordered sequence of values, e.g. a group key or a primary key.
pub type Tuple = Vec<Value>;

const NULL_CODE: u8 = 0x00;
const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_CODE: u8 = 0x14;
const FLOAT_CODE: u8 = 0x21;
const FALSE_CODE: u8 = 0x26;
const TRUE_CODE: u8 = 0x27;
const ESCAPE: u8 = 0xFF;

const SIGN_BIT: u64 = 1 << 63;

/// Builds a [`Tuple`] from a list of expressions convertible into [`Value`].
///
/// ```rust,ignore
/// let key = tuple![Value::Null, "business", 42i64];
/// ```
#[macro_export]
macro_rules! tuple {
    () => { ::std::vec::Vec::<$crate::common::Value>::new() };
    ($($x:expr),+ $(,)?) => {
        vec![$($crate::common::Value::from($x)),+]
    };
}

/// Packs a tuple into its order-preserving byte form.
pub fn pack(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 9);
    for value in values {
        encode_into(&mut out, value);
    }
    out
}

/// Appends the encoding of a single element.
pub fn encode_into(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(NULL_CODE),
        Value::Bytes(bytes) => encode_escaped(out, BYTES_CODE, bytes),
        Value::String(s) => encode_escaped(out, STRING_CODE, s.as_bytes()),
        Value::Int(v) => {
            out.push(INT_CODE);
            out.extend_from_slice(&encode_i64(*v));
        }
        Value::Float(v) => {
            out.push(FLOAT_CODE);
            out.extend_from_slice(&encode_f64(*v));
        }
        Value::Bool(false) => out.push(FALSE_CODE),
        Value::Bool(true) => out.push(TRUE_CODE),
    }
}

/// Unpacks a byte string produced by [`pack`].
pub fn unpack(bytes: &[u8]) -> StrataResult<Tuple> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (value, next) = decode_at(bytes, pos)?;
        values.push(value);
        pos = next;
    }
    Ok(values)
}

/// Returns the first key that sorts after every key starting with `prefix`,
/// or `None` if no such key exists (empty prefix or all `0xFF`).
pub fn strinc(prefix: &[u8]) -> Option<Vec<u8>> {
    let trimmed_len = prefix.iter().rposition(|b| *b != 0xFF)? + 1;
    let mut out = prefix[..trimmed_len].to_vec();
    if let Some(last) = out.last_mut() {
        *last += 1;
    }
    Some(out)
}

#[inline]
fn encode_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ SIGN_BIT).to_be_bytes()
}

#[inline]
fn decode_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
}

#[inline]
fn encode_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if bits & SIGN_BIT != 0 { !bits } else { bits ^ SIGN_BIT };
    ordered.to_be_bytes()
}

#[inline]
fn decode_f64(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & SIGN_BIT != 0 {
        ordered ^ SIGN_BIT
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

fn encode_escaped(out: &mut Vec<u8>, code: u8, bytes: &[u8]) {
    out.push(code);
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(ESCAPE);
        }
    }
    out.push(0x00);
}

fn decode_at(bytes: &[u8], pos: usize) -> StrataResult<(Value, usize)> {
    let code = bytes[pos];
    match code {
        NULL_CODE => Ok((Value::Null, pos + 1)),
        BYTES_CODE => {
            let (raw, next) = decode_escaped(bytes, pos + 1)?;
            Ok((Value::Bytes(raw), next))
        }
        STRING_CODE => {
            let (raw, next) = decode_escaped(bytes, pos + 1)?;
            let s = String::from_utf8(raw)?;
            Ok((Value::String(s), next))
        }
        INT_CODE => {
            let fixed = fixed_width(bytes, pos + 1)?;
            Ok((Value::Int(decode_i64(fixed)), pos + 9))
        }
        FLOAT_CODE => {
            let fixed = fixed_width(bytes, pos + 1)?;
            Ok((Value::Float(decode_f64(fixed)), pos + 9))
        }
        FALSE_CODE => Ok((Value::Bool(false), pos + 1)),
        TRUE_CODE => Ok((Value::Bool(true), pos + 1)),
        other => Err(StrataError::new(
            &format!("Unknown tuple type code 0x{:02x} at offset {}", other, pos),
            ErrorKind::EncodingError,
        )),
    }
}

fn decode_escaped(bytes: &[u8], start: usize) -> StrataResult<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == 0x00 {
            if i + 1 < bytes.len() && bytes[i + 1] == ESCAPE {
                out.push(0x00);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(bytes[i]);
        i += 1;
    }
    Err(StrataError::new(
        "Unterminated byte string in packed tuple",
        ErrorKind::EncodingError,
    ))
}

fn fixed_width(bytes: &[u8], start: usize) -> StrataResult<[u8; 8]> {
    bytes
        .get(start..start + 8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            StrataError::new(
                "Truncated fixed-width element in packed tuple",
                ErrorKind::EncodingError,
            )
        })
}
