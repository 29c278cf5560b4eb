//! # Strata R-Tree - Multidimensional Secondary Index
//!
//! This crate provides a multidimensional secondary index for the strata
//! key-value store: an R-tree whose nodes live in the store itself and are
//! read and written through the caller's optimistic transaction, so index
//! maintenance commits or aborts together with the record change.
//!
//! ## Features
//!
//! - **Grouped Trees**: one independent tree per distinct group tuple
//! - **Two Layouts**: a node per key (`BY_NODE`) or an entry per key (`BY_SLOT`)
//! - **Hilbert Ordering**: leaves kept in space-filling-curve order, Hilbert or quadratic splits
//! - **Null-Aware Bounds**: absent values are indexed and can be searched for
//! - **Resumable Scans**: paginated depth-first scans with opaque continuations
//! - **Skip-Scan**: jumps between the groups selected by a group range
//! - **Predicate Binding**: comparisons, ranges, `IN` lists and null tests to scan bounds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::store::memory::InMemoryStore;
//! use strata::transaction::Database;
//! use strata::{common::Subspace, tuple};
//! use strata_rtree::{field, DimensionType, EvaluationContext, IndexDefinition, IndexKey,
//!     MultidimensionalIndex, Predicate};
//!
//! let db = Database::builder().store(InMemoryStore::default()).open()?;
//! let definition = IndexDefinition::builder("EventIntervals")
//!     .group("calendar_name", DimensionType::String)
//!     .dimension("start_epoch", DimensionType::Int64)
//!     .dimension("end_epoch", DimensionType::Int64)
//!     .build()?;
//! let subspace = Subspace::from_tuple(&tuple!["events", "by_interval"]);
//!
//! db.run(|tx| {
//!     let index = MultidimensionalIndex::open(tx, definition.clone(), &subspace)?;
//!     let key = IndexKey::new(tuple!["business"], tuple![1690360647i64, 1690364247i64]);
//!     index.maintain(tx, None, Some(&key), &tuple![1i64])?;
//!
//!     let predicate = Predicate::and(vec![
//!         field("calendar_name").eq("business"),
//!         field("start_epoch").le(1690363000i64),
//!         field("end_epoch").ge(1690361000i64),
//!     ]);
//!     let bounds = index.bind(&predicate, &EvaluationContext::empty())?;
//!     let page = index.scan(tx, &bounds, None, Some(100))?;
//!     Ok(page.results)
//! })?;
//! ```
//!
//! ## Module Organization
//!
//! - [`definition`] / [`options`] - Index structure and layout options
//! - [`bounds`] - Per-dimension ranges and scan bounds
//! - [`predicate`] / [`scan_parameters`] - Query predicates and plan parameters
//! - [`index`] - The index facade
//! - [`rtree`] - Storage layouts, maintenance and search of the tree

pub mod bounding_box;
pub mod bounds;
pub mod codec;
pub mod continuation;
pub mod definition;
pub mod hilbert;
pub mod index;
pub mod options;
pub mod predicate;
pub mod rtree;
pub mod scan_parameters;
mod skip_scan;

pub use bounding_box::BoundingBox;
pub use bounds::{DimensionRange, Intersection, RangeBound, ScanBounds};
pub use codec::Coordinate;
pub use continuation::Continuation;
pub use definition::{DimensionDef, DimensionType, IndexDefinition, IndexDefinitionBuilder};
pub use index::{IndexCursor, IndexEntry, IndexKey, MultidimensionalIndex, ScanPage};
pub use options::{IndexOptions, SplitStrategy, StorageVariant};
pub use predicate::{field, CompareOp, EvaluationContext, FieldPredicate, Operand, Predicate};
pub use rtree::{IndexStats, RTreeError, RTreeResult};
pub use scan_parameters::{GroupRange, IndexScanParameters, MultidimensionalScanBounds};
