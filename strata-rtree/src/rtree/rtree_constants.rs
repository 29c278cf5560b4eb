//! Constants for the transactional R-tree layout.

/// Subspace tag of the index metadata keys
pub const META_TAG: u8 = 0x00;

/// Subspace tag of the group -> root records
pub const ROOTS_TAG: u8 = 0x01;

/// Subspace tag of whole nodes (by-node layout)
pub const NODES_TAG: u8 = 0x02;

/// Subspace tag of node slots (by-slot layout)
pub const SLOTS_TAG: u8 = 0x03;

/// Meta key holding the persisted options
pub const META_OPTIONS_KEY: &[u8] = b"options";

/// Meta key prefix of the per-group node id counters
pub const META_NEXT_NODE_KEY: &[u8] = b"next_node";

/// Slot marker of a by-slot node header
pub const SLOT_HEADER: u8 = 0x00;

/// Slot marker of a by-slot node entry
pub const SLOT_ENTRY: u8 = 0x01;

/// Node ids start here; 0 is never allocated
pub const FIRST_NODE_ID: u64 = 1;

/// On-disk format version
pub const FORMAT_VERSION: u8 = 2;

/// Continuation token format version
pub const CONTINUATION_VERSION: u8 = 2;

pub const DEFAULT_MIN_FANOUT: usize = 16;

pub const DEFAULT_MAX_FANOUT: usize = 32;

/// Most value dimensions an index may declare
pub const MAX_VALUE_DIMENSIONS: usize = 16;
