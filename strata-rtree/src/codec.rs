//! Dimensional key codec.
//!
//! A point is a sequence of per-dimension coordinates, each either a present
//! `i64` or absent. Absent is represented as `None`, which sorts before every
//! present value (`Option<i64>` orders `None` first), so the null sentinel
//! behaves as minus infinity in every comparison the tree makes.
//!
//! [`encode_key`] turns a point into a persisted, order-preserving byte key.
//! [`hilbert_value`](crate::hilbert::hilbert_value) turns it into a position
//! on a space-filling curve, used only to keep nearby points together.

use crate::definition::DimensionType;
use crate::rtree::{RTreeError, RTreeResult};
use strata::common::{pack, unpack, Value};

/// One dimension of a point. `None` is the null sentinel.
pub type Coordinate = Option<i64>;

/// Encodes a point as a packed tuple of `Null`/`Int` elements.
///
/// The encoding is order-preserving (dimension by dimension, nulls first),
/// injective and stable across releases.
pub fn encode_key(point: &[Coordinate]) -> Vec<u8> {
    let values: Vec<Value> = point
        .iter()
        .map(|c| match c {
            Some(v) => Value::Int(*v),
            None => Value::Null,
        })
        .collect();
    pack(&values)
}

/// Inverse of [`encode_key`].
pub fn decode_key(bytes: &[u8]) -> RTreeResult<Vec<Coordinate>> {
    unpack(bytes)?
        .into_iter()
        .map(|value| match value {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(v)),
            other => Err(RTreeError::Serialization(format!(
                "Unexpected {} element in an encoded point",
                other.type_name()
            ))),
        })
        .collect()
}

/// Maps a float onto an `i64` so that integer order equals float order.
///
/// Negative floats have their magnitude bits flipped; the transform is its
/// own inverse.
#[inline]
pub fn f64_to_ordered_i64(value: f64) -> i64 {
    let bits = value.to_bits() as i64;
    if bits < 0 {
        bits ^ i64::MAX
    } else {
        bits
    }
}

#[inline]
pub fn ordered_i64_to_f64(value: i64) -> f64 {
    let bits = if value < 0 { value ^ i64::MAX } else { value };
    f64::from_bits(bits as u64)
}

/// Converts a record value into a coordinate of a dimension.
///
/// # Arguments
/// * `value` - The record's value for the dimension
/// * `dimension_type` - The declared type of the dimension
///
/// # Returns
/// The coordinate, `None` for a null value.
///
/// # Errors
/// `Validation` if the value does not fit the dimension type.
pub fn to_coordinate(value: &Value, dimension_type: DimensionType) -> RTreeResult<Coordinate> {
    match (value, dimension_type) {
        (Value::Null, _) => Ok(None),
        (Value::Int(v), DimensionType::Int64) => Ok(Some(*v)),
        (Value::Float(v), DimensionType::Float64) => Ok(Some(f64_to_ordered_i64(*v))),
        (Value::Int(v), DimensionType::Float64) => Ok(Some(f64_to_ordered_i64(*v as f64))),
        (other, expected) => Err(RTreeError::Validation(format!(
            "Value {} of type {} does not fit a {} dimension",
            other,
            other.type_name(),
            expected
        ))),
    }
}

/// Converts a coordinate back into the value it was derived from.
pub fn to_value(coordinate: Coordinate, dimension_type: DimensionType) -> Value {
    match (coordinate, dimension_type) {
        (None, _) => Value::Null,
        (Some(v), DimensionType::Float64) => Value::Float(ordered_i64_to_f64(v)),
        (Some(v), _) => Value::Int(v),
    }
}
