//! Transactional storage layer of the R-tree.
//!
//! Everything the tree persists lives under the index subspace, split into
//! tagged regions:
//!
//! | tag    | key suffix                       | value |
//! |--------|----------------------------------|-------|
//! | `0x00` | `"options"` / `"next_node"` ++ packed group | persisted options / node id counter of the group |
//! | `0x01` | packed group                     | [`RootRecord`] |
//! | `0x02` | packed group, node id            | whole node (by-node layout) |
//! | `0x03` | packed group, node id, slot      | node header or one entry (by-slot layout) |
//!
//! Node reads and writes go through [`NodeStorage`], implemented once per
//! layout. The tree algorithms only ever see [`Node`] values, so the layout
//! is invisible to them.

use super::by_node::ByNodeStorage;
use super::by_slot::BySlotStorage;
use super::rtree_constants::*;
use super::rtree_types::{Node, NodeId, RTreeError, RTreeResult, RootRecord, StoredMeta};
use crate::codec::Coordinate;
use crate::hilbert::hilbert_value;
use crate::options::StorageVariant;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata::common::Subspace;
use strata::store::KeyRange;
use strata::transaction::Transaction;

/// Serializes a persisted value.
pub(crate) fn encode_value<T: Serialize>(value: &T) -> RTreeResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::legacy(),
    )?)
}

/// Deserializes a persisted value.
pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> RTreeResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| RTreeError::Serialization(e.to_string()))
}

/// Decides whether leaf Hilbert values are persisted or recomputed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HilbertSettings {
    pub store: bool,
    pub bits: u32,
}

impl HilbertSettings {
    pub fn persist(&self, hilbert: u128) -> Option<u128> {
        self.store.then_some(hilbert)
    }

    pub fn restore(&self, stored: Option<u128>, point: &[Coordinate]) -> u128 {
        stored.unwrap_or_else(|| hilbert_value(point, self.bits))
    }
}

/// Node persistence of one physical layout.
///
/// `group` is always the packed group tuple. Implementations must return
/// nodes in their native entry order and must accept nodes in any order.
pub(crate) trait NodeStorage: Send + Sync {
    /// Reads a node, `None` if no node is stored under `id`.
    fn read_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<Option<Node>>;

    /// Writes a node, replacing whatever was stored under its id.
    fn write_node(&self, tx: &Transaction, group: &[u8], node: &Node) -> RTreeResult<()>;

    fn delete_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<()>;

    fn variant(&self) -> StorageVariant;
}

/// Builds the key of a node (or the key prefix of its slots).
pub(crate) fn node_key(space: &Subspace, group: &[u8], id: NodeId) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(group.len() + 8);
    suffix.extend_from_slice(group);
    suffix.extend_from_slice(&id.to_be_bytes());
    space.key(&suffix)
}

/// Storage facade shared by the maintainer, the cursor and the skip-scan.
pub(crate) struct RTreeStorage {
    meta: Subspace,
    roots: Subspace,
    by_node: Subspace,
    by_slot: Subspace,
    nodes: Box<dyn NodeStorage>,
}

impl RTreeStorage {
    pub fn new(
        subspace: &Subspace,
        variant: StorageVariant,
        hilbert: HilbertSettings,
        dimensions: usize,
    ) -> RTreeStorage {
        let tagged = |tag: u8| Subspace::new(subspace.key(&[tag]));
        let by_node = tagged(NODES_TAG);
        let by_slot = tagged(SLOTS_TAG);
        let nodes: Box<dyn NodeStorage> = match variant {
            StorageVariant::ByNode => Box::new(ByNodeStorage::new(by_node.clone(), hilbert)),
            StorageVariant::BySlot => {
                Box::new(BySlotStorage::new(by_slot.clone(), hilbert, dimensions))
            }
        };
        RTreeStorage {
            meta: tagged(META_TAG),
            roots: tagged(ROOTS_TAG),
            by_node,
            by_slot,
            nodes,
        }
    }

    pub fn variant(&self) -> StorageVariant {
        self.nodes.variant()
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn read_meta(&self, tx: &Transaction) -> RTreeResult<Option<StoredMeta>> {
        match tx.get(&self.meta.key(META_OPTIONS_KEY))? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn write_meta(&self, tx: &Transaction, meta: &StoredMeta) -> RTreeResult<()> {
        tx.set(&self.meta.key(META_OPTIONS_KEY), &encode_value(meta)?)?;
        Ok(())
    }

    /// Returns `true` if at least one group holds a tree.
    pub fn has_data(&self, tx: &Transaction) -> RTreeResult<bool> {
        Ok(!tx.get_range(&self.roots.range(), Some(1), false)?.is_empty())
    }

    fn counter_key(&self, group: &[u8]) -> Vec<u8> {
        let mut suffix = Vec::with_capacity(META_NEXT_NODE_KEY.len() + group.len());
        suffix.extend_from_slice(META_NEXT_NODE_KEY);
        suffix.extend_from_slice(group);
        self.meta.key(&suffix)
    }

    /// Hands out the next node id of `group`. Ids are never reused while
    /// the group holds a tree.
    ///
    /// Each group counts on its own key, so writers of different groups
    /// never touch a shared key.
    pub fn allocate_node_id(&self, tx: &Transaction, group: &[u8]) -> RTreeResult<NodeId> {
        let key = self.counter_key(group);
        let next = match tx.get(&key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    RTreeError::Serialization(format!(
                        "Node counter holds {} bytes instead of 8",
                        bytes.len()
                    ))
                })?;
                u64::from_be_bytes(raw)
            }
            None => FIRST_NODE_ID,
        };
        tx.set(&key, &(next + 1).to_be_bytes())?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    pub fn read_root(&self, tx: &Transaction, group: &[u8]) -> RTreeResult<Option<RootRecord>> {
        match tx.get(&self.roots.key(group))? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_root(&self, tx: &Transaction, group: &[u8], root: RootRecord) -> RTreeResult<()> {
        log::trace!("Root of group {:?} is node {} at level {}", group, root.node_id, root.level);
        tx.set(&self.roots.key(group), &encode_value(&root)?)?;
        Ok(())
    }

    pub fn clear_root(&self, tx: &Transaction, group: &[u8]) -> RTreeResult<()> {
        tx.clear(&self.roots.key(group))?;
        Ok(())
    }

    /// Reads the first root record whose group key lies in `[begin, end)`.
    ///
    /// # Returns
    /// The packed group and its root, or `None` when the range holds no tree.
    pub fn next_root(
        &self,
        tx: &Transaction,
        begin: &[u8],
        end: Option<&[u8]>,
    ) -> RTreeResult<Option<(Vec<u8>, RootRecord)>> {
        let range = KeyRange::new(
            self.roots.key(begin),
            match end {
                Some(end) => Some(self.roots.key(end)),
                None => self.roots.range().end().map(|e| e.to_vec()),
            },
        );
        match tx.get_range(&range, Some(1), false)?.into_iter().next() {
            Some((key, value)) => {
                let group = self.roots.strip(&key)?.to_vec();
                Ok(Some((group, decode_value(&value)?)))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn read_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<Option<Node>> {
        log::trace!("Reading node {} of group {:?}", id, group);
        self.nodes.read_node(tx, group, id)
    }

    /// Reads a node the tree references; a missing node is corruption.
    pub fn require_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<Node> {
        match self.read_node(tx, group, id)? {
            Some(node) => Ok(node),
            None => {
                log::error!("Node {} of group {:?} is referenced but missing", id, group);
                Err(RTreeError::CorruptIndex(format!(
                    "Node {} is referenced by the tree but not stored",
                    id
                )))
            }
        }
    }

    pub fn write_node(&self, tx: &Transaction, group: &[u8], node: &Node) -> RTreeResult<()> {
        log::trace!(
            "Writing node {} of group {:?} ({} entries, level {})",
            node.id(),
            group,
            node.len(),
            node.level()
        );
        self.nodes.write_node(tx, group, node)
    }

    pub fn delete_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<()> {
        log::trace!("Deleting node {} of group {:?}", id, group);
        self.nodes.delete_node(tx, group, id)
    }

    // ------------------------------------------------------------------
    // Bulk removal
    // ------------------------------------------------------------------

    /// Drops the trees of every group whose packed key lies in `[begin, end)`.
    pub fn clear_groups(&self, tx: &Transaction, begin: &[u8], end: Option<&[u8]>) -> RTreeResult<()> {
        for space in [&self.roots, &self.by_node, &self.by_slot] {
            let range = KeyRange::new(
                space.key(begin),
                match end {
                    Some(end) => Some(space.key(end)),
                    None => space.range().end().map(|e| e.to_vec()),
                },
            );
            tx.clear_range(&range)?;
        }
        let counters = KeyRange::new(
            self.counter_key(begin),
            match end {
                Some(end) => Some(self.counter_key(end)),
                None => KeyRange::prefix(&self.counter_key(&[])).end().map(|e| e.to_vec()),
            },
        );
        tx.clear_range(&counters)?;
        Ok(())
    }
}
