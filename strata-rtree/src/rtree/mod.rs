//! Transactional R-tree engine.
//!
//! This module holds the tree itself, stored inside the caller's
//! transactions:
//! - Two physical node layouts (one value per node, one key per entry)
//!   behind a single storage facade
//! - Insert and delete with splits, merges, redistribution and root
//!   growth/collapse
//! - A resumable depth-first cursor driven by scan bounds
//! - Structural validation used by tests and diagnostics
//!
//! Nodes reference their children by id only; the group's root record is
//! the single entry point into a tree.

pub mod rtree_constants;
pub mod rtree_types;
mod by_node;
mod by_slot;
pub(crate) mod cursor;
pub(crate) mod integrity;
pub(crate) mod maintainer;
pub(crate) mod split;
pub(crate) mod storage;

pub use rtree_constants::{
    CONTINUATION_VERSION, DEFAULT_MAX_FANOUT, DEFAULT_MIN_FANOUT, FORMAT_VERSION,
    MAX_VALUE_DIMENSIONS,
};
pub use rtree_types::{
    ChildEntry, IndexStats, LeafEntry, Node, NodeId, RTreeError, RTreeResult, RootRecord,
};
