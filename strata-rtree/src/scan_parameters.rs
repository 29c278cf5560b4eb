//! What a scan of a multidimensional index covers.
//!
//! A scan is described by a [`MultidimensionalScanBounds`]: a range of
//! groups plus the [`ScanBounds`] every returned point must satisfy.
//! [`IndexScanParameters`] is the unbound form handed over by a query plan;
//! binding it against an index definition and an [`EvaluationContext`]
//! yields the concrete bounds.

use crate::bounds::{DimensionRange, RangeBound, ScanBounds};
use crate::codec::to_coordinate;
use crate::definition::IndexDefinition;
use crate::predicate::{bind, EvaluationContext, Predicate};
use crate::rtree::{RTreeError, RTreeResult};
use std::fmt::{Display, Formatter};
use std::ops::Bound;
use strata::common::{pack, strinc, Tuple, Value};
use strata::store::KeyRange;

/// Groups a scan visits.
///
/// Bounds compare packed group tuples. A tuple covers itself and every
/// group it is a prefix of, so an inclusive high end `("b")` includes
/// `("b", 7)` while an exclusive one does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupRange {
    /// Every group of the index.
    All,
    /// Every group starting with the tuple; the full group tuple selects
    /// exactly one group.
    Prefix(Tuple),
    /// Every group between two tuples.
    Between { low: Bound<Tuple>, high: Bound<Tuple> },
    /// Every group starting with one of the probes ("IN" semantics).
    Probes(Vec<Tuple>),
}

impl GroupRange {
    /// Groups from `low` to `high`, both inclusive; `None` is unbounded.
    pub fn between_inclusive(low: Option<Tuple>, high: Option<Tuple>) -> GroupRange {
        GroupRange::Between {
            low: low.map_or(Bound::Unbounded, Bound::Included),
            high: high.map_or(Bound::Unbounded, Bound::Included),
        }
    }

    /// Sorted, disjoint ranges of packed group keys.
    pub(crate) fn key_ranges(&self) -> Vec<KeyRange> {
        match self {
            GroupRange::All => vec![KeyRange::all()],
            GroupRange::Prefix(prefix) => vec![KeyRange::prefix(&pack(prefix))],
            GroupRange::Between { low, high } => {
                let begin = match low {
                    Bound::Unbounded => Vec::new(),
                    Bound::Included(t) => pack(t),
                    Bound::Excluded(t) => match strinc(&pack(t)) {
                        Some(next) => next,
                        None => return Vec::new(),
                    },
                };
                let end = match high {
                    Bound::Unbounded => None,
                    Bound::Included(t) => strinc(&pack(t)),
                    Bound::Excluded(t) => Some(pack(t)),
                };
                let range = KeyRange::new(begin, end);
                if range.is_empty() {
                    Vec::new()
                } else {
                    vec![range]
                }
            }
            GroupRange::Probes(probes) => {
                let mut packed: Vec<Vec<u8>> = probes.iter().map(|p| pack(p)).collect();
                packed.sort();
                packed.dedup();
                let mut ranges: Vec<KeyRange> = Vec::with_capacity(packed.len());
                for key in packed {
                    // a probe extending an earlier probe is already covered
                    if ranges.last().is_some_and(|r| r.contains(&key)) {
                        continue;
                    }
                    ranges.push(KeyRange::prefix(&key));
                }
                ranges
            }
        }
    }

    /// Returns `true` if the group lies in the range.
    pub fn contains(&self, group: &[Value]) -> bool {
        let key = pack(group);
        self.key_ranges().iter().any(|r| r.contains(&key))
    }
}

impl Display for GroupRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn tuple(t: &Tuple) -> String {
            let parts: Vec<String> = t.iter().map(|v| v.to_string()).collect();
            format!("({})", parts.join(", "))
        }
        match self {
            GroupRange::All => write!(f, "all"),
            GroupRange::Prefix(t) => write!(f, "prefix {}", tuple(t)),
            GroupRange::Between { low, high } => {
                match low {
                    Bound::Unbounded => write!(f, "(*")?,
                    Bound::Included(t) => write!(f, "[{}", tuple(t))?,
                    Bound::Excluded(t) => write!(f, "({}", tuple(t))?,
                }
                match high {
                    Bound::Unbounded => write!(f, ", *)"),
                    Bound::Included(t) => write!(f, ", {}]", tuple(t)),
                    Bound::Excluded(t) => write!(f, ", {})", tuple(t)),
                }
            }
            GroupRange::Probes(probes) => {
                let parts: Vec<String> = probes.iter().map(tuple).collect();
                write!(f, "in [{}]", parts.join(", "))
            }
        }
    }
}

/// Bound scan of a multidimensional index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultidimensionalScanBounds {
    pub group_range: GroupRange,
    pub bounds: ScanBounds,
}

impl MultidimensionalScanBounds {
    pub fn new(group_range: GroupRange, bounds: ScanBounds) -> Self {
        MultidimensionalScanBounds {
            group_range,
            bounds,
        }
    }
}

impl Display for MultidimensionalScanBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "groups {} where {}", self.group_range, self.bounds)
    }
}

/// Scan parameters as produced by a query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexScanParameters {
    /// A group range from `min_group` to `max_group` (inclusive) and one
    /// inclusive `[min, max]` per value dimension. `None` leaves an end
    /// open; a `Null` maximum selects only absent values.
    Hypercube {
        min_group: Option<Tuple>,
        max_group: Option<Tuple>,
        mins: Vec<Option<Value>>,
        maxs: Vec<Option<Value>>,
    },
    /// Bounds built by the caller.
    Composite(MultidimensionalScanBounds),
    /// A boolean predicate over the index's dimensions.
    Predicate(Predicate),
}

impl IndexScanParameters {
    /// Hypercube parameters over a single group.
    pub fn hypercube(group: Tuple, mins: Vec<Option<Value>>, maxs: Vec<Option<Value>>) -> Self {
        IndexScanParameters::Hypercube {
            min_group: Some(group.clone()),
            max_group: Some(group),
            mins,
            maxs,
        }
    }

    /// Resolves the parameters into concrete bounds.
    ///
    /// # Arguments
    /// * `definition` - The index being scanned
    /// * `context` - Values of the parameters referenced by a predicate
    ///
    /// # Errors
    /// * `Validation` if the hypercube does not have one range per value dimension
    /// * `InvalidDimensionType` if a bound does not fit its dimension
    /// * `UnsupportedTranslation` if a predicate holds correlated operands
    pub fn bind(
        &self,
        definition: &IndexDefinition,
        context: &EvaluationContext,
    ) -> RTreeResult<MultidimensionalScanBounds> {
        match self {
            IndexScanParameters::Hypercube {
                min_group,
                max_group,
                mins,
                maxs,
            } => {
                let dims = definition.value_dimensions();
                if mins.len() != dims.len() || maxs.len() != dims.len() {
                    return Err(RTreeError::Validation(format!(
                        "Hypercube has {}/{} bounds for {} dimensions",
                        mins.len(),
                        maxs.len(),
                        dims.len()
                    )));
                }
                let mut ranges = Vec::with_capacity(dims.len());
                for ((dim, min), max) in dims.iter().zip(mins).zip(maxs) {
                    let convert = |value: &Value| {
                        to_coordinate(value, dim.dimension_type).map_err(|e| {
                            RTreeError::InvalidDimensionType(format!("{} ({})", e, dim.name))
                        })
                    };
                    let low = match min {
                        None => RangeBound::Unbounded,
                        Some(value) => match convert(value)? {
                            Some(c) => RangeBound::Value(c),
                            None => RangeBound::Null,
                        },
                    };
                    let high = match max {
                        None => RangeBound::Unbounded,
                        Some(value) => match convert(value)? {
                            Some(c) => RangeBound::Value(c),
                            None => RangeBound::Null,
                        },
                    };
                    ranges.push(DimensionRange::new(low, high));
                }
                let group_range = match (min_group, max_group) {
                    (None, None) => GroupRange::All,
                    (low, high) => GroupRange::between_inclusive(low.clone(), high.clone()),
                };
                Ok(MultidimensionalScanBounds::new(
                    group_range,
                    ScanBounds::Hypercube(ranges),
                ))
            }
            IndexScanParameters::Composite(bounds) => Ok(bounds.clone()),
            IndexScanParameters::Predicate(predicate) => bind(definition, predicate, context),
        }
    }

    /// Rewrites correlated references; these parameters never carry any
    /// that can be rewritten.
    pub fn translate_correlations(&self, aliases: &[(String, String)]) -> RTreeResult<Self> {
        log::debug!(
            "Rejecting translation of {} aliases for {} scan",
            aliases.len(),
            self.scan_details()
        );
        Err(RTreeError::UnsupportedTranslation("not supported".to_string()))
    }

    pub fn rebase(&self) -> Self {
        self.clone()
    }

    pub fn scan_details(&self) -> &'static str {
        "multidimensional"
    }
}
