//! Hilbert curve utilities for spatial locality.
//!
//! The Hilbert curve is a continuous space-filling curve that maps an
//! N-dimensional grid onto a line while keeping neighbouring cells close.
//! The tree uses the curve position of a point to order leaf entries and to
//! split overflowing nodes. Query correctness never depends on it.
//!
//! ## Coordinate Mapping
//! A coordinate is mapped onto the unsigned grid by flipping its sign bit, so
//! `i64::MIN` lands on cell 0 and `i64::MAX` on the last cell. The null
//! sentinel maps to cell 0 as well. Only the top `bits` bits of each mapped
//! coordinate take part, and at most 128 bits fit in the result.

use crate::codec::Coordinate;

/// Largest number of bits the interleaved index can hold.
pub const MAX_HILBERT_BITS: u32 = 128;

const SIGN_BIT: u64 = 1 << 63;

/// Default precision per dimension for a point of `dimensions` coordinates.
pub fn default_bits_per_dimension(dimensions: usize) -> u32 {
    let dimensions = dimensions.max(1) as u32;
    (MAX_HILBERT_BITS / dimensions).clamp(1, 64)
}

/// Position of a point along the N-dimensional Hilbert curve.
///
/// # Arguments
/// * `point` - The coordinates; absent coordinates map to the curve's minimum
/// * `bits` - Precision per dimension (1-64, `bits * dims <= 128`)
///
/// # Returns
/// The Hilbert index as `u128`.
///
/// # Example
/// ```rust,ignore
/// use strata_rtree::hilbert::hilbert_value;
///
/// let a = hilbert_value(&[Some(10), Some(20)], 64);
/// let b = hilbert_value(&[None, Some(20)], 64);
/// assert_ne!(a, b);
/// ```
pub fn hilbert_value(point: &[Coordinate], bits: u32) -> u128 {
    if point.is_empty() {
        return 0;
    }
    let bits = effective_bits(point.len(), bits);
    let shift = 64 - bits;
    let mut axes: Vec<u64> = point
        .iter()
        .map(|c| match c {
            Some(v) => ((*v as u64) ^ SIGN_BIT) >> shift,
            None => 0,
        })
        .collect();
    axes_to_transpose(&mut axes, bits);
    interleave(&axes, bits)
}

fn effective_bits(dimensions: usize, bits: u32) -> u32 {
    let cap = (MAX_HILBERT_BITS / dimensions as u32).clamp(1, 64);
    bits.clamp(1, cap)
}

/// Skilling's in-place transform from grid axes to the transposed Hilbert index.
fn axes_to_transpose(x: &mut [u64], bits: u32) {
    let n = x.len();
    let m: u64 = 1 << (bits - 1);

    // inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for axis in x.iter_mut() {
        *axis ^= t;
    }
}

fn interleave(transposed: &[u64], bits: u32) -> u128 {
    let mut index = 0u128;
    for bit in (0..bits).rev() {
        for axis in transposed {
            index = (index << 1) | ((axis >> bit) & 1) as u128;
        }
    }
    index
}
