//! Core types and data structures of the transactional R-tree.
//!
//! This module defines the fundamental types used throughout the tree:
//! - Error types and result types
//! - Node types (Leaf and Internal) and their entries
//! - Persisted forms of nodes, roots and index metadata
//! - Structural statistics

use crate::bounding_box::BoundingBox;
use crate::codec::Coordinate;
use crate::options::{SplitStrategy, StorageVariant};
use serde::{Deserialize, Serialize};
use strata::errors::{ErrorKind, StrataError};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in multidimensional index operations
#[derive(Debug, Error)]
pub enum RTreeError {
    /// A node referenced by the tree is missing from storage.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Invalid dimension type: {0}")]
    InvalidDimensionType(String),

    #[error("Unsupported translation: {0}")]
    UnsupportedTranslation(String),

    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{0}")]
    Store(StrataError),
}

impl RTreeError {
    /// Returns `true` if re-running the enclosing transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RTreeError::TransactionConflict(_) => true,
            RTreeError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<RTreeError> for StrataError {
    fn from(err: RTreeError) -> Self {
        match err {
            RTreeError::CorruptIndex(msg) => StrataError::new(&msg, ErrorKind::IndexCorrupted),
            RTreeError::InvalidDimensionType(msg) => {
                StrataError::new(&msg, ErrorKind::InvalidDimensionType)
            }
            RTreeError::UnsupportedTranslation(msg) => {
                StrataError::new(&msg, ErrorKind::UnsupportedTranslation)
            }
            RTreeError::TransactionConflict(msg) => {
                StrataError::new(&msg, ErrorKind::TransactionConflict)
            }
            RTreeError::Serialization(msg) => StrataError::new(&msg, ErrorKind::EncodingError),
            RTreeError::Validation(msg) => StrataError::new(&msg, ErrorKind::ValidationError),
            RTreeError::InvalidOperation(msg) => {
                StrataError::new(&msg, ErrorKind::InvalidOperation)
            }
            RTreeError::Store(err) => err,
        }
    }
}

impl From<StrataError> for RTreeError {
    fn from(err: StrataError) -> Self {
        let message = err.message().to_string();
        match err.kind() {
            ErrorKind::TransactionConflict => RTreeError::TransactionConflict(message),
            ErrorKind::IndexCorrupted => RTreeError::CorruptIndex(message),
            ErrorKind::InvalidDimensionType => RTreeError::InvalidDimensionType(message),
            ErrorKind::UnsupportedTranslation => RTreeError::UnsupportedTranslation(message),
            ErrorKind::EncodingError => RTreeError::Serialization(message),
            ErrorKind::ValidationError => RTreeError::Validation(message),
            ErrorKind::InvalidOperation => RTreeError::InvalidOperation(message),
            _ => RTreeError::Store(err),
        }
    }
}

impl From<bincode::error::EncodeError> for RTreeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RTreeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for RTreeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        RTreeError::Serialization(err.to_string())
    }
}

/// Result type for index operations
pub type RTreeResult<T> = Result<T, RTreeError>;

/// Node identifier, unique within an index and never reused.
pub type NodeId = u64;

// ============================================================================
// Statistics
// ============================================================================

/// Structural statistics gathered by a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of groups holding a tree
    pub groups: u64,
    pub nodes: u64,
    /// Number of leaf entries, i.e. indexed records
    pub entries: u64,
    /// Height of the tallest tree (a lone leaf root has height 1)
    pub height: u32,
}

// ============================================================================
// Node Types
// ============================================================================

/// An entry in a leaf node: one indexed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub point: Vec<Coordinate>,
    /// Position of `point` on the Hilbert curve
    pub hilbert: u128,
    /// Packed primary key tuple of the record
    pub primary_key: Vec<u8>,
}

impl LeafEntry {
    pub fn new(point: Vec<Coordinate>, hilbert: u128, primary_key: Vec<u8>) -> Self {
        LeafEntry {
            point,
            hilbert,
            primary_key,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::point(&self.point)
    }
}

/// A child reference in an internal node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Union of every box below the child
    pub bbox: BoundingBox,
    pub child_id: NodeId,
    /// Smallest Hilbert value found below the child
    pub smallest_hilbert: u128,
    /// Largest Hilbert value found below the child
    pub largest_hilbert: u128,
}

/// Node types in the R-tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Leaf node containing record entries
    Leaf { id: NodeId, entries: Vec<LeafEntry> },
    /// Internal node containing child references
    Internal {
        id: NodeId,
        /// Height from leaf level (leaves are 0)
        level: u32,
        children: Vec<ChildEntry>,
    },
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Leaf { id, .. } | Node::Internal { id, .. } => *id,
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { level, .. } => *level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries, .. } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the bounding box enclosing all children/entries
    pub fn compute_bbox(&self) -> Option<BoundingBox> {
        match self {
            Node::Leaf { entries, .. } => {
                let mut iter = entries.iter();
                let mut bbox = iter.next()?.bbox();
                for entry in iter {
                    bbox.expand(&BoundingBox::point(&entry.point));
                }
                Some(bbox)
            }
            Node::Internal { children, .. } => {
                BoundingBox::union_all(children.iter().map(|c| &c.bbox))
            }
        }
    }

    pub fn smallest_hilbert(&self) -> u128 {
        match self {
            Node::Leaf { entries, .. } => entries.iter().map(|e| e.hilbert).min(),
            Node::Internal { children, .. } => children.iter().map(|c| c.smallest_hilbert).min(),
        }
        .unwrap_or(0)
    }

    pub fn largest_hilbert(&self) -> u128 {
        match self {
            Node::Leaf { entries, .. } => entries.iter().map(|e| e.hilbert).max(),
            Node::Internal { children, .. } => children.iter().map(|c| c.largest_hilbert).max(),
        }
        .unwrap_or(0)
    }

    /// The entry a parent keeps for this node, `None` while the node is empty.
    pub fn summary(&self) -> Option<ChildEntry> {
        Some(ChildEntry {
            bbox: self.compute_bbox()?,
            child_id: self.id(),
            smallest_hilbert: self.smallest_hilbert(),
            largest_hilbert: self.largest_hilbert(),
        })
    }
}

// ============================================================================
// Persisted Types
// ============================================================================

/// Leaf entry as stored by the by-node layout.
///
/// The Hilbert value is only persisted when the index is configured to
/// store it; otherwise it is recomputed from the point on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredLeafEntry {
    pub point: Vec<Coordinate>,
    pub hilbert: Option<u128>,
    pub primary_key: Vec<u8>,
}

/// A whole node as stored by the by-node layout. The id lives in the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum StoredNode {
    Leaf { entries: Vec<StoredLeafEntry> },
    Internal { level: u32, children: Vec<ChildEntry> },
}

/// Per-group pointer to the tree root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub node_id: NodeId,
    pub level: u32,
}

/// Layout-relevant options persisted with the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredMeta {
    pub format_version: u8,
    pub storage: StorageVariant,
    pub store_hilbert_values: bool,
    pub min_fanout: u32,
    pub max_fanout: u32,
    pub split_strategy: SplitStrategy,
    pub bits_per_dimension: u32,
    pub dimensions: u32,
}
