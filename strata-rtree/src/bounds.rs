//! Scan bounds: a predicate tree over hyperrectangles.
//!
//! A [`ScanBounds`] is evaluated against bounding boxes while the tree is
//! walked. The outcome of [`ScanBounds::intersects`] tells the cursor
//! whether a subtree can be skipped ([`Intersection::Disjoint`]), must be
//! searched ([`Intersection::Partial`]) or lies entirely inside the bounds
//! ([`Intersection::Contained`]).
//!
//! ## Null Semantics
//! The null sentinel is the smallest coordinate of every dimension:
//! - an unbounded or null low end admits the sentinel
//! - a concrete low end `v` excludes it
//! - a null high end admits *only* the sentinel (an "is null" probe)
//! - a concrete high end `v` admits the sentinel and everything up to `v`

use crate::bounding_box::BoundingBox;
use crate::codec::Coordinate;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// One end of a dimension range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeBound {
    /// No restriction on this end.
    Unbounded,
    /// The null sentinel.
    Null,
    /// A concrete, inclusive coordinate.
    Value(i64),
}

impl RangeBound {
    fn as_coordinate(&self) -> Coordinate {
        match self {
            RangeBound::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for RangeBound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeBound::Unbounded => write!(f, "*"),
            RangeBound::Null => write!(f, "null"),
            RangeBound::Value(v) => write!(f, "{}", v),
        }
    }
}

/// An inclusive range over one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionRange {
    pub low: RangeBound,
    pub high: RangeBound,
}

impl DimensionRange {
    pub fn new(low: RangeBound, high: RangeBound) -> Self {
        DimensionRange { low, high }
    }

    /// Matches every coordinate, the sentinel included.
    pub fn all() -> Self {
        DimensionRange::new(RangeBound::Unbounded, RangeBound::Unbounded)
    }

    /// Matches only the null sentinel.
    pub fn is_null() -> Self {
        DimensionRange::new(RangeBound::Unbounded, RangeBound::Null)
    }

    pub fn point(value: i64) -> Self {
        DimensionRange::new(RangeBound::Value(value), RangeBound::Value(value))
    }

    /// `[low, high]` with either end optional.
    pub fn between(low: Option<i64>, high: Option<i64>) -> Self {
        DimensionRange::new(
            low.map_or(RangeBound::Unbounded, RangeBound::Value),
            high.map_or(RangeBound::Unbounded, RangeBound::Value),
        )
    }

    /// Everything at least `low`; the sentinel is excluded.
    pub fn at_least(low: i64) -> Self {
        DimensionRange::new(RangeBound::Value(low), RangeBound::Unbounded)
    }

    /// Everything up to `high`; the sentinel is included.
    pub fn at_most(high: i64) -> Self {
        DimensionRange::new(RangeBound::Unbounded, RangeBound::Value(high))
    }

    fn admits_low(&self, c: Coordinate) -> bool {
        match self.low {
            RangeBound::Unbounded | RangeBound::Null => true,
            RangeBound::Value(v) => c >= Some(v),
        }
    }

    fn admits_high(&self, c: Coordinate) -> bool {
        match self.high {
            RangeBound::Unbounded => true,
            RangeBound::Null => c.is_none(),
            RangeBound::Value(v) => c <= Some(v),
        }
    }

    /// Returns `true` if the coordinate lies in the range.
    pub fn matches(&self, c: Coordinate) -> bool {
        self.admits_low(c) && self.admits_high(c)
    }

    /// Relation between the range and the interval `[low, high]`.
    pub fn intersects(&self, low: Coordinate, high: Coordinate) -> Intersection {
        // the interval ends inside each admitted half-line
        let overlaps = self.admits_low(high) && self.admits_high(low);
        if !overlaps {
            return Intersection::Disjoint;
        }
        if self.admits_low(low) && self.admits_high(high) {
            Intersection::Contained
        } else {
            Intersection::Partial
        }
    }

    /// Intersection of two ranges, `None` if it is empty.
    pub fn meet(&self, other: &DimensionRange) -> Option<DimensionRange> {
        let low = match (self.low, other.low) {
            (RangeBound::Value(a), RangeBound::Value(b)) => RangeBound::Value(a.max(b)),
            (RangeBound::Value(a), _) | (_, RangeBound::Value(a)) => RangeBound::Value(a),
            _ => RangeBound::Unbounded,
        };
        let high = match high_order(&self.high, &other.high) {
            Ordering::Greater => other.high,
            _ => self.high,
        };
        let range = DimensionRange::new(low, high);
        let empty = match (low, high) {
            (RangeBound::Value(_), RangeBound::Null) => true,
            (RangeBound::Value(l), RangeBound::Value(h)) => l > h,
            _ => false,
        };
        (!empty).then_some(range)
    }
}

// high ends order by how much they admit: Null < Value < Unbounded
fn high_order(a: &RangeBound, b: &RangeBound) -> Ordering {
    fn rank(bound: &RangeBound) -> (u8, i64) {
        match bound {
            RangeBound::Null => (0, 0),
            RangeBound::Value(v) => (1, *v),
            RangeBound::Unbounded => (2, 0),
        }
    }
    rank(a).cmp(&rank(b))
}

impl Display for DimensionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// How a bounding box relates to scan bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Intersection {
    /// Nothing inside the box can match.
    Disjoint,
    /// Some of the box may match.
    Partial,
    /// Everything inside the box matches.
    Contained,
}

/// Predicate tree evaluated against bounding boxes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanBounds {
    /// Conjunction of one range per dimension.
    Hypercube(Vec<DimensionRange>),
    /// Every child must match.
    And(Vec<ScanBounds>),
    /// At least one child must match.
    Or(Vec<ScanBounds>),
}

impl ScanBounds {
    /// A hypercube matching everything in `dimensions` dimensions.
    pub fn all(dimensions: usize) -> ScanBounds {
        ScanBounds::Hypercube(vec![DimensionRange::all(); dimensions])
    }

    /// Bounds matching nothing.
    pub fn none() -> ScanBounds {
        ScanBounds::Or(Vec::new())
    }

    /// Evaluates the bounds against a box.
    ///
    /// # Arguments
    /// * `bbox` - Box with one interval per dimension of the index
    ///
    /// # Returns
    /// `Disjoint` if nothing in the box can match, `Contained` if
    /// everything matches, `Partial` otherwise. `And` takes the weakest
    /// result of its children and `Or` the strongest.
    pub fn intersects(&self, bbox: &BoundingBox) -> Intersection {
        match self {
            ScanBounds::Hypercube(ranges) => {
                // a box of another arity cannot be compared
                if ranges.len() != bbox.lows.len() || ranges.len() != bbox.highs.len() {
                    return Intersection::Disjoint;
                }
                let mut result = Intersection::Contained;
                for ((range, low), high) in ranges.iter().zip(&bbox.lows).zip(&bbox.highs) {
                    match range.intersects(*low, *high) {
                        Intersection::Disjoint => return Intersection::Disjoint,
                        Intersection::Partial => result = Intersection::Partial,
                        Intersection::Contained => {}
                    }
                }
                result
            }
            ScanBounds::And(children) => children
                .iter()
                .map(|c| c.intersects(bbox))
                .min()
                .unwrap_or(Intersection::Contained),
            ScanBounds::Or(children) => children
                .iter()
                .map(|c| c.intersects(bbox))
                .max()
                .unwrap_or(Intersection::Disjoint),
        }
    }

    /// Returns `true` if the point satisfies the bounds.
    pub fn matches_point(&self, point: &[Coordinate]) -> bool {
        match self {
            ScanBounds::Hypercube(ranges) => {
                ranges.len() == point.len()
                    && ranges.iter().zip(point).all(|(range, c)| range.matches(*c))
            }
            ScanBounds::And(children) => children.iter().all(|c| c.matches_point(point)),
            ScanBounds::Or(children) => children.iter().any(|c| c.matches_point(point)),
        }
    }

    /// Returns `true` if every hypercube has exactly `dimensions` ranges.
    pub fn has_dimensions(&self, dimensions: usize) -> bool {
        match self {
            ScanBounds::Hypercube(ranges) => ranges.len() == dimensions,
            ScanBounds::And(children) | ScanBounds::Or(children) => {
                children.iter().all(|c| c.has_dimensions(dimensions))
            }
        }
    }

    /// Conjunction of two bounds; hypercubes are merged dimension by dimension.
    pub fn and(self, other: ScanBounds) -> ScanBounds {
        match (self, other) {
            (ScanBounds::Hypercube(a), ScanBounds::Hypercube(b)) if a.len() == b.len() => {
                let mut merged = Vec::with_capacity(a.len());
                for (x, y) in a.iter().zip(&b) {
                    match x.meet(y) {
                        Some(range) => merged.push(range),
                        None => return ScanBounds::none(),
                    }
                }
                ScanBounds::Hypercube(merged)
            }
            (ScanBounds::And(mut a), ScanBounds::And(b)) => {
                a.extend(b);
                ScanBounds::And(a)
            }
            (ScanBounds::And(mut a), other) => {
                a.push(other);
                ScanBounds::And(a)
            }
            (this, other) => ScanBounds::And(vec![this, other]),
        }
    }

    /// Disjunction of two bounds.
    pub fn or(self, other: ScanBounds) -> ScanBounds {
        match (self, other) {
            (ScanBounds::Or(mut a), ScanBounds::Or(b)) => {
                a.extend(b);
                ScanBounds::Or(a)
            }
            (ScanBounds::Or(mut a), other) => {
                a.push(other);
                ScanBounds::Or(a)
            }
            (this, other) => ScanBounds::Or(vec![this, other]),
        }
    }
}

impl Display for ScanBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanBounds::Hypercube(ranges) => {
                let parts: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
                write!(f, "Hypercube({})", parts.join(" x "))
            }
            ScanBounds::And(children) | ScanBounds::Or(children) => {
                let name = if matches!(self, ScanBounds::And(_)) {
                    "And"
                } else {
                    "Or"
                };
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "{}({})", name, parts.join(", "))
            }
        }
    }
}
