//! Boolean predicates over index dimensions and their translation into
//! scan bounds.
//!
//! Predicates follow the usual comparison semantics: a comparison with an
//! absent value is false, only [`Predicate::IsNull`] matches absent values.
//! [`bind`] turns a predicate into a [`MultidimensionalScanBounds`] whose
//! scan returns exactly the records the predicate accepts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_rtree::predicate::{field, Predicate};
//!
//! let predicate = Predicate::and(vec![
//!     field("calendar_name").eq("business"),
//!     Predicate::or(vec![
//!         field("start_epoch").is_null(),
//!         field("start_epoch").le(1690378647i64),
//!     ]),
//!     field("end_epoch").ge(1690364247i64),
//! ]);
//! ```

use crate::bounds::{DimensionRange, ScanBounds};
use crate::codec::{to_coordinate, Coordinate};
use crate::definition::{DimensionDef, DimensionRef, DimensionType, IndexDefinition};
use crate::rtree::{RTreeError, RTreeResult};
use crate::scan_parameters::{GroupRange, MultidimensionalScanBounds};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Bound;
use strata::common::{Tuple, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Right hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Literal(Value),
    /// A named parameter, resolved from the [`EvaluationContext`].
    Parameter(String),
    /// A value of an outer query; cannot be bound by the index.
    Correlated(String),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(value: $t) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_operand!(i64, i32, f64, bool, &str, String, Vec<u8>);

/// Boolean predicate over named dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Compare {
        dimension: String,
        op: CompareOp,
        operand: Operand,
    },
    /// Inclusive on both ends.
    Between {
        dimension: String,
        low: Operand,
        high: Operand,
    },
    IsNull {
        dimension: String,
    },
    In {
        dimension: String,
        operands: Vec<Operand>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn and(children: Vec<Predicate>) -> Predicate {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Predicate {
        Predicate::Or(children)
    }

    /// Evaluates the predicate against one record.
    ///
    /// # Arguments
    /// * `lookup` - Returns the record's value of a dimension, `Null` if absent
    /// * `context` - Values of named parameters
    pub fn evaluate<F>(&self, lookup: &F, context: &EvaluationContext) -> RTreeResult<bool>
    where
        F: Fn(&str) -> Value,
    {
        match self {
            Predicate::Compare {
                dimension,
                op,
                operand,
            } => {
                let ordering = compare_values(&lookup(dimension.as_str()), &context.resolve(operand)?);
                Ok(match (ordering, op) {
                    (None, _) => false,
                    (Some(o), CompareOp::Eq) => o == Ordering::Equal,
                    (Some(o), CompareOp::Lt) => o == Ordering::Less,
                    (Some(o), CompareOp::Le) => o != Ordering::Greater,
                    (Some(o), CompareOp::Gt) => o == Ordering::Greater,
                    (Some(o), CompareOp::Ge) => o != Ordering::Less,
                })
            }
            Predicate::Between {
                dimension,
                low,
                high,
            } => {
                let value = lookup(dimension.as_str());
                let above = compare_values(&value, &context.resolve(low)?);
                let below = compare_values(&value, &context.resolve(high)?);
                Ok(matches!(above, Some(Ordering::Greater | Ordering::Equal))
                    && matches!(below, Some(Ordering::Less | Ordering::Equal)))
            }
            Predicate::IsNull { dimension } => Ok(lookup(dimension.as_str()).is_null()),
            Predicate::In {
                dimension,
                operands,
            } => {
                let value = lookup(dimension.as_str());
                for operand in operands {
                    if compare_values(&value, &context.resolve(operand)?) == Some(Ordering::Equal) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::And(children) => {
                for child in children {
                    if !child.evaluate(lookup, context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(children) => {
                for child in children {
                    if child.evaluate(lookup, context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn references_any(&self, names: &[DimensionDef]) -> bool {
        let hit = |dimension: &String| names.iter().any(|d| &d.name == dimension);
        match self {
            Predicate::Compare { dimension, .. }
            | Predicate::Between { dimension, .. }
            | Predicate::IsNull { dimension }
            | Predicate::In { dimension, .. } => hit(dimension),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().any(|c| c.references_any(names))
            }
        }
    }
}

/// Starts a predicate on a named dimension.
pub fn field(name: &str) -> FieldPredicate {
    FieldPredicate {
        name: name.to_string(),
    }
}

/// Builder for predicates on one dimension.
pub struct FieldPredicate {
    name: String,
}

impl FieldPredicate {
    fn compare(self, op: CompareOp, operand: impl Into<Operand>) -> Predicate {
        Predicate::Compare {
            dimension: self.name,
            op,
            operand: operand.into(),
        }
    }

    pub fn eq(self, operand: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Eq, operand)
    }

    pub fn lt(self, operand: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Lt, operand)
    }

    pub fn le(self, operand: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Le, operand)
    }

    pub fn gt(self, operand: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Gt, operand)
    }

    pub fn ge(self, operand: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Ge, operand)
    }

    pub fn between(self, low: impl Into<Operand>, high: impl Into<Operand>) -> Predicate {
        Predicate::Between {
            dimension: self.name,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull {
            dimension: self.name,
        }
    }

    pub fn in_values<T: Into<Operand>>(self, operands: Vec<T>) -> Predicate {
        Predicate::In {
            dimension: self.name,
            operands: operands.into_iter().map(Into::into).collect(),
        }
    }
}

/// Named parameter values available while binding and evaluating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    parameters: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn empty() -> Self {
        EvaluationContext::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Resolves an operand to a value.
    ///
    /// # Errors
    /// * `Validation` for a parameter missing from the context
    /// * `UnsupportedTranslation` for a correlated operand
    pub fn resolve(&self, operand: &Operand) -> RTreeResult<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Parameter(name) => self.get(name).cloned().ok_or_else(|| {
                RTreeError::Validation(format!("Parameter {} is not bound", name))
            }),
            Operand::Correlated(alias) => Err(RTreeError::UnsupportedTranslation(format!(
                "Correlated reference {} cannot be bound by the index",
                alias
            ))),
        }
    }
}

// Null compares with nothing; numbers compare across int and float.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(x), Value::Float(y)) => Some((*x as f64).total_cmp(y)),
        (Value::Float(x), Value::Int(y)) => Some(x.total_cmp(&(*y as f64))),
        (x, y) if std::mem::discriminant(x) == std::mem::discriminant(y) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Translates a predicate into scan bounds.
///
/// Terms on group dimensions must be top-level conjuncts. Equalities on the
/// leading group dimensions form a prefix; the next group dimension may
/// carry an `In` list (a probe set) or a range. Every other term must only
/// reference value dimensions and becomes part of the [`ScanBounds`].
///
/// # Errors
/// * `InvalidDimensionType` if an operand does not fit its dimension
/// * `UnsupportedTranslation` if an operand is correlated
/// * `Validation` for unknown dimensions, unbound parameters or group terms
///   that do not form a prefix
pub fn bind(
    definition: &IndexDefinition,
    predicate: &Predicate,
    context: &EvaluationContext,
) -> RTreeResult<MultidimensionalScanBounds> {
    let mut conjuncts = Vec::new();
    flatten_and(predicate, &mut conjuncts);

    let mut group_terms: Vec<Option<GroupConstraint>> =
        vec![None; definition.group_dimensions().len()];
    let mut bounds = ScanBounds::all(definition.dimensions());

    for term in conjuncts {
        match group_position(definition, term)? {
            Some((pos, dim)) => {
                let constraint = group_constraint(dim, term, context)?;
                group_terms[pos] = Some(match group_terms[pos].take() {
                    None => constraint,
                    Some(existing) => existing.merge(constraint, &dim.name)?,
                });
            }
            None => bounds = bounds.and(value_bounds(definition, term, context)?),
        }
    }

    let group_range = group_range(definition, group_terms)?;
    log::debug!(
        "Bound predicate on index {} to groups {} where {}",
        definition.name(),
        group_range,
        bounds
    );
    Ok(MultidimensionalScanBounds::new(group_range, bounds))
}

fn flatten_and<'p>(predicate: &'p Predicate, out: &mut Vec<&'p Predicate>) {
    match predicate {
        Predicate::And(children) => children.iter().for_each(|c| flatten_and(c, out)),
        other => out.push(other),
    }
}

fn unknown_dimension(definition: &IndexDefinition, name: &str) -> RTreeError {
    RTreeError::Validation(format!(
        "Index {} has no dimension {}",
        definition.name(),
        name
    ))
}

// The group dimension a conjunct constrains, `None` for value terms.
fn group_position<'d>(
    definition: &'d IndexDefinition,
    term: &Predicate,
) -> RTreeResult<Option<(usize, &'d DimensionDef)>> {
    match term {
        Predicate::Compare { dimension, .. }
        | Predicate::Between { dimension, .. }
        | Predicate::IsNull { dimension }
        | Predicate::In { dimension, .. } => match definition.find(dimension) {
            Some(DimensionRef::Group(pos, dim)) => Ok(Some((pos, dim))),
            Some(DimensionRef::Value(..)) => Ok(None),
            None => Err(unknown_dimension(definition, dimension)),
        },
        Predicate::And(_) | Predicate::Or(_) => {
            if term.references_any(definition.group_dimensions()) {
                Err(RTreeError::Validation(
                    "Group dimensions can only be constrained by top-level conjuncts".to_string(),
                ))
            } else {
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum GroupConstraint {
    Eq(Value),
    In(Vec<Value>),
    Range { low: Bound<Value>, high: Bound<Value> },
}

impl GroupConstraint {
    fn merge(self, other: GroupConstraint, name: &str) -> RTreeResult<GroupConstraint> {
        match (self, other) {
            (GroupConstraint::Eq(a), GroupConstraint::Eq(b)) if a == b => Ok(GroupConstraint::Eq(a)),
            (
                GroupConstraint::Range { low: l1, high: h1 },
                GroupConstraint::Range { low: l2, high: h2 },
            ) => Ok(GroupConstraint::Range {
                low: tighter(l1, l2, Ordering::Greater),
                high: tighter(h1, h2, Ordering::Less),
            }),
            _ => Err(RTreeError::Validation(format!(
                "Group dimension {} is constrained more than once",
                name
            ))),
        }
    }
}

// Picks the bound that restricts more; `wanted` is the direction of a
// stricter value (greater for low ends, less for high ends).
fn tighter(a: Bound<Value>, b: Bound<Value>, wanted: Ordering) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (a, b) => {
            let (va, vb) = match (&a, &b) {
                (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
                    (x.clone(), y.clone())
                }
                _ => return a,
            };
            match va.cmp(&vb) {
                Ordering::Equal => {
                    if matches!(a, Bound::Excluded(_)) {
                        a
                    } else {
                        b
                    }
                }
                o if o == wanted => a,
                _ => b,
            }
        }
    }
}

fn group_value(dim: &DimensionDef, value: Value) -> RTreeResult<Value> {
    match (&value, dim.dimension_type) {
        (Value::Null, _)
        | (Value::Int(_), DimensionType::Int64)
        | (Value::Float(_), DimensionType::Float64)
        | (Value::String(_), DimensionType::String)
        | (Value::Bytes(_), DimensionType::Bytes)
        | (Value::Bool(_), DimensionType::Boolean) => Ok(value),
        (Value::Int(i), DimensionType::Float64) => Ok(Value::Float(*i as f64)),
        _ => Err(RTreeError::InvalidDimensionType(format!(
            "Value {} of type {} does not fit {} dimension {}",
            value,
            value.type_name(),
            dim.dimension_type,
            dim.name
        ))),
    }
}

fn group_constraint(
    dim: &DimensionDef,
    term: &Predicate,
    context: &EvaluationContext,
) -> RTreeResult<GroupConstraint> {
    let resolve = |operand: &Operand| -> RTreeResult<Value> {
        let value = group_value(dim, context.resolve(operand)?)?;
        if value.is_null() {
            return Err(RTreeError::Validation(format!(
                "Group dimension {} is compared with null; use is_null",
                dim.name
            )));
        }
        Ok(value)
    };
    match term {
        Predicate::Compare { op, operand, .. } => {
            let value = resolve(operand)?;
            Ok(match op {
                CompareOp::Eq => GroupConstraint::Eq(value),
                // null groups never satisfy a comparison
                CompareOp::Lt => GroupConstraint::Range {
                    low: Bound::Excluded(Value::Null),
                    high: Bound::Excluded(value),
                },
                CompareOp::Le => GroupConstraint::Range {
                    low: Bound::Excluded(Value::Null),
                    high: Bound::Included(value),
                },
                CompareOp::Gt => GroupConstraint::Range {
                    low: Bound::Excluded(value),
                    high: Bound::Unbounded,
                },
                CompareOp::Ge => GroupConstraint::Range {
                    low: Bound::Included(value),
                    high: Bound::Unbounded,
                },
            })
        }
        Predicate::Between { low, high, .. } => Ok(GroupConstraint::Range {
            low: Bound::Included(resolve(low)?),
            high: Bound::Included(resolve(high)?),
        }),
        Predicate::IsNull { .. } => Ok(GroupConstraint::Eq(Value::Null)),
        Predicate::In { operands, .. } => {
            let mut values = Vec::with_capacity(operands.len());
            for operand in operands {
                let value = group_value(dim, context.resolve(operand)?)?;
                if !value.is_null() {
                    values.push(value);
                }
            }
            Ok(GroupConstraint::In(values))
        }
        Predicate::And(_) | Predicate::Or(_) => Err(RTreeError::InvalidOperation(
            "Composite predicate is not a group term".to_string(),
        )),
    }
}

fn extend(prefix: &Tuple, value: Value) -> Tuple {
    let mut tuple = prefix.clone();
    tuple.push(value);
    tuple
}

fn group_range(
    definition: &IndexDefinition,
    terms: Vec<Option<GroupConstraint>>,
) -> RTreeResult<GroupRange> {
    let mut prefix: Tuple = Vec::new();
    let mut range = None;
    let mut terms = terms.into_iter().enumerate();

    for (pos, term) in terms.by_ref() {
        match term {
            Some(GroupConstraint::Eq(value)) => prefix.push(value),
            None => break,
            Some(GroupConstraint::In(values)) => {
                range = Some(GroupRange::Probes(
                    values.into_iter().map(|v| extend(&prefix, v)).collect(),
                ));
                break;
            }
            Some(GroupConstraint::Range { low, high }) => {
                let open = |prefix: &Tuple| {
                    if prefix.is_empty() {
                        Bound::Unbounded
                    } else {
                        Bound::Included(prefix.clone())
                    }
                };
                let low = match low {
                    Bound::Unbounded => open(&prefix),
                    Bound::Included(v) => Bound::Included(extend(&prefix, v)),
                    Bound::Excluded(v) => Bound::Excluded(extend(&prefix, v)),
                };
                let high = match high {
                    Bound::Unbounded => open(&prefix),
                    Bound::Included(v) => Bound::Included(extend(&prefix, v)),
                    Bound::Excluded(v) => Bound::Excluded(extend(&prefix, v)),
                };
                log::trace!("Group dimension {} bounds the group range", pos);
                range = Some(GroupRange::Between { low, high });
                break;
            }
        }
    }

    if let Some((pos, _)) = terms.find(|(_, term)| term.is_some()) {
        return Err(RTreeError::Validation(format!(
            "Group dimension {} is constrained but an earlier one is not fixed by equality",
            definition.group_dimensions()[pos].name
        )));
    }

    Ok(match range {
        Some(range) => range,
        None if prefix.is_empty() => GroupRange::All,
        None => GroupRange::Prefix(prefix),
    })
}

fn value_coordinate(dim: &DimensionDef, value: &Value) -> RTreeResult<Coordinate> {
    to_coordinate(value, dim.dimension_type).map_err(|e| {
        log::error!("Cannot bind {} to dimension {}: {}", value, dim.name, e);
        RTreeError::InvalidDimensionType(format!("{} ({})", e, dim.name))
    })
}

fn cube(dimensions: usize, pos: usize, range: DimensionRange) -> ScanBounds {
    let mut ranges = vec![DimensionRange::all(); dimensions];
    ranges[pos] = range;
    ScanBounds::Hypercube(ranges)
}

fn value_bounds(
    definition: &IndexDefinition,
    term: &Predicate,
    context: &EvaluationContext,
) -> RTreeResult<ScanBounds> {
    let dims = definition.dimensions();
    let locate = |name: &str| match definition.find(name) {
        Some(DimensionRef::Value(pos, dim)) => Ok((pos, dim)),
        Some(DimensionRef::Group(..)) => Err(RTreeError::Validation(format!(
            "Group dimension {} can only be constrained by a top-level conjunct",
            name
        ))),
        None => Err(unknown_dimension(definition, name)),
    };

    match term {
        Predicate::Compare {
            dimension,
            op,
            operand,
        } => {
            let (pos, dim) = locate(dimension)?;
            let Some(c) = value_coordinate(dim, &context.resolve(operand)?)? else {
                return Ok(ScanBounds::none());
            };
            let range = match op {
                CompareOp::Eq => Some(DimensionRange::point(c)),
                CompareOp::Lt => c
                    .checked_sub(1)
                    .map(|h| DimensionRange::between(Some(i64::MIN), Some(h))),
                CompareOp::Le => Some(DimensionRange::between(Some(i64::MIN), Some(c))),
                CompareOp::Gt => c.checked_add(1).map(DimensionRange::at_least),
                CompareOp::Ge => Some(DimensionRange::at_least(c)),
            };
            Ok(range.map_or_else(ScanBounds::none, |r| cube(dims, pos, r)))
        }
        Predicate::Between {
            dimension,
            low,
            high,
        } => {
            let (pos, dim) = locate(dimension)?;
            let low = value_coordinate(dim, &context.resolve(low)?)?;
            let high = value_coordinate(dim, &context.resolve(high)?)?;
            match (low, high) {
                (Some(l), Some(h)) if l <= h => {
                    Ok(cube(dims, pos, DimensionRange::between(Some(l), Some(h))))
                }
                _ => Ok(ScanBounds::none()),
            }
        }
        Predicate::IsNull { dimension } => {
            let (pos, _) = locate(dimension)?;
            Ok(cube(dims, pos, DimensionRange::is_null()))
        }
        Predicate::In {
            dimension,
            operands,
        } => {
            let (pos, dim) = locate(dimension)?;
            let mut points = Vec::with_capacity(operands.len());
            for operand in operands {
                if let Some(c) = value_coordinate(dim, &context.resolve(operand)?)? {
                    points.push(c);
                }
            }
            points.sort_unstable();
            points.dedup();
            Ok(ScanBounds::Or(
                points
                    .into_iter()
                    .map(|c| cube(dims, pos, DimensionRange::point(c)))
                    .collect(),
            ))
        }
        Predicate::And(children) => {
            let mut bounds = ScanBounds::all(dims);
            for child in children {
                bounds = bounds.and(value_bounds(definition, child, context)?);
            }
            Ok(bounds)
        }
        Predicate::Or(children) => {
            let mut bounds = ScanBounds::none();
            for child in children {
                bounds = bounds.or(value_bounds(definition, child, context)?);
            }
            Ok(bounds)
        }
    }
}
