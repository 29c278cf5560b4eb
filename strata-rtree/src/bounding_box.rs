use crate::codec::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// An axis-aligned N-dimensional box with inclusive bounds.
///
/// `BoundingBox` keeps one `[low, high]` interval per dimension. A leaf
/// entry's box is degenerate (`low == high` in every dimension), an interior
/// entry's box is the union of everything below it. The null sentinel
/// (`None`) is the smallest coordinate of every dimension, so a box whose
/// `low` is `None` extends down to and includes the sentinel.
///
/// # Examples
///
/// ```rust,ignore
/// use strata_rtree::BoundingBox;
///
/// let mut bbox = BoundingBox::point(&[Some(1), Some(10)]);
/// bbox.expand(&BoundingBox::point(&[None, Some(12)]));
///
/// assert!(bbox.contains_point(&[Some(0), Some(11)]));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Lower corner, one coordinate per dimension.
    pub lows: Vec<Coordinate>,
    /// Upper corner, one coordinate per dimension.
    pub highs: Vec<Coordinate>,
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundingBox[")?;
        for (i, (low, high)) in self.lows.iter().zip(&self.highs).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..{}", fmt_coordinate(low), fmt_coordinate(high))?;
        }
        write!(f, "]")
    }
}

fn fmt_coordinate(c: &Coordinate) -> String {
    match c {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

// the null sentinel occupies one cell below i64::MIN
#[inline]
fn numeric(c: &Coordinate) -> i128 {
    match c {
        Some(v) => *v as i128,
        None => i64::MIN as i128 - 1,
    }
}

impl BoundingBox {
    /// Creates a box from explicit corners.
    ///
    /// # Arguments
    ///
    /// * `lows` - Lower corner
    /// * `highs` - Upper corner, same arity as `lows`
    pub fn new(lows: Vec<Coordinate>, highs: Vec<Coordinate>) -> BoundingBox {
        BoundingBox { lows, highs }
    }

    /// Degenerate box covering exactly one point.
    pub fn point(point: &[Coordinate]) -> BoundingBox {
        BoundingBox {
            lows: point.to_vec(),
            highs: point.to_vec(),
        }
    }

    #[inline]
    pub fn dimensions(&self) -> usize {
        self.lows.len()
    }

    /// Grows this box to cover `other`.
    pub fn expand(&mut self, other: &BoundingBox) {
        for (low, other_low) in self.lows.iter_mut().zip(&other.lows) {
            if other_low < low {
                *low = *other_low;
            }
        }
        for (high, other_high) in self.highs.iter_mut().zip(&other.highs) {
            if other_high > high {
                *high = *other_high;
            }
        }
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut result = self.clone();
        result.expand(other);
        result
    }

    /// Union of a sequence of boxes, `None` for an empty sequence.
    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let mut result = iter.next()?.clone();
        for bbox in iter {
            result.expand(bbox);
        }
        Some(result)
    }

    /// Returns `true` if `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.lows.iter().zip(&other.lows).all(|(a, b)| a <= b)
            && self.highs.iter().zip(&other.highs).all(|(a, b)| a >= b)
    }

    pub fn contains_point(&self, point: &[Coordinate]) -> bool {
        self.lows
            .iter()
            .zip(&self.highs)
            .zip(point)
            .all(|((low, high), c)| low <= c && c <= high)
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        (0..self.dimensions()).all(|d| {
            self.lows[d] <= other.highs[d] && other.lows[d] <= self.highs[d]
        })
    }

    /// Volume in grid cells. Saturates to infinity for very wide boxes.
    pub fn area(&self) -> f64 {
        self.lows
            .iter()
            .zip(&self.highs)
            .map(|(low, high)| (numeric(high) - numeric(low) + 1) as f64)
            .product()
    }

    /// Area growth needed to also cover `other`.
    pub fn enlargement(&self, other: &BoundingBox) -> f64 {
        let grown = self.union(other).area();
        let current = self.area();
        if grown.is_infinite() && current.is_infinite() {
            0.0
        } else {
            grown - current
        }
    }

    /// Volume of the intersection with `other`, zero if disjoint.
    pub fn overlap(&self, other: &BoundingBox) -> f64 {
        let mut volume = 1.0;
        for d in 0..self.dimensions() {
            let low = numeric(&self.lows[d]).max(numeric(&other.lows[d]));
            let high = numeric(&self.highs[d]).min(numeric(&other.highs[d]));
            if high < low {
                return 0.0;
            }
            volume *= (high - low + 1) as f64;
        }
        volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(lows: &[Coordinate], highs: &[Coordinate]) -> BoundingBox {
        BoundingBox::new(lows.to_vec(), highs.to_vec())
    }

    #[test]
    fn test_point_box_is_degenerate() {
        let b = BoundingBox::point(&[Some(3), None]);
        assert_eq!(b.lows, b.highs);
        assert_eq!(b.area(), 1.0);
        assert!(b.contains_point(&[Some(3), None]));
        assert!(!b.contains_point(&[Some(3), Some(i64::MIN)]));
    }

    #[test]
    fn test_expand_and_union() {
        let mut b = BoundingBox::point(&[Some(5), Some(5)]);
        b.expand(&BoundingBox::point(&[Some(1), Some(9)]));
        assert_eq!(b, bbox(&[Some(1), Some(5)], &[Some(5), Some(9)]));

        let u = b.union(&BoundingBox::point(&[None, Some(0)]));
        assert_eq!(u, bbox(&[None, Some(0)], &[Some(5), Some(9)]));
        assert!(u.contains(&b));
        assert!(!b.contains(&u));
    }

    #[test]
    fn test_union_all() {
        assert!(BoundingBox::union_all(std::iter::empty()).is_none());
        let boxes = [
            BoundingBox::point(&[Some(2)]),
            BoundingBox::point(&[Some(-4)]),
            BoundingBox::point(&[Some(7)]),
        ];
        assert_eq!(
            BoundingBox::union_all(boxes.iter()),
            Some(bbox(&[Some(-4)], &[Some(7)]))
        );
    }

    #[test]
    fn test_intersects_and_overlap() {
        let a = bbox(&[Some(0), Some(0)], &[Some(9), Some(9)]);
        let b = bbox(&[Some(5), Some(5)], &[Some(14), Some(14)]);
        let c = bbox(&[Some(10), Some(0)], &[Some(12), Some(3)]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.overlap(&b), 25.0);
        assert_eq!(a.overlap(&c), 0.0);
    }

    #[test]
    fn test_null_counts_as_one_cell_below_minimum() {
        let b = bbox(&[None], &[Some(i64::MIN)]);
        assert_eq!(b.area(), 2.0);
        assert!(b.contains_point(&[None]));
        assert!(b.contains_point(&[Some(i64::MIN)]));
    }

    #[test]
    fn test_enlargement() {
        let a = bbox(&[Some(0), Some(0)], &[Some(1), Some(1)]);
        assert_eq!(a.enlargement(&BoundingBox::point(&[Some(1), Some(0)])), 0.0);
        assert_eq!(a.enlargement(&BoundingBox::point(&[Some(2), Some(0)])), 2.0);

        let huge = bbox(&[None; 3], &[Some(i64::MAX); 3]);
        assert_eq!(huge.enlargement(&BoundingBox::point(&[Some(0); 3])), 0.0);
    }

    #[test]
    fn test_display() {
        let b = bbox(&[None, Some(1)], &[Some(2), Some(3)]);
        assert_eq!(b.to_string(), "BoundingBox[null..2, 1..3]");
    }
}
