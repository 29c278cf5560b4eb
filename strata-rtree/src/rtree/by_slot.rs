//! By-slot layout: every entry of a node is its own key.
//!
//! A node occupies the key prefix `group ++ node id`. Under it, a header
//! slot records the level and one entry slot exists per entry:
//!
//! - leaf entry: slot key `encode_key(point) ++ primary key`, value the
//!   optional Hilbert value
//! - child entry: slot key `child id`, value the child's box and Hilbert
//!   range
//!
//! The native order of a node is therefore the slot key order.

use super::rtree_constants::{SLOT_ENTRY, SLOT_HEADER};
use super::rtree_types::{ChildEntry, LeafEntry, Node, NodeId, RTreeError, RTreeResult};
use super::storage::{decode_value, encode_value, node_key, HilbertSettings, NodeStorage};
use crate::bounding_box::BoundingBox;
use crate::codec::{encode_key, Coordinate};
use crate::options::StorageVariant;
use serde::{Deserialize, Serialize};
use strata::common::{pack, unpack, Subspace, Value};
use strata::store::KeyRange;
use strata::transaction::Transaction;

#[derive(Debug, Serialize, Deserialize)]
struct SlotHeader {
    level: u32,
}

pub(crate) struct BySlotStorage {
    slots: Subspace,
    hilbert: HilbertSettings,
    dimensions: usize,
}

impl BySlotStorage {
    pub fn new(slots: Subspace, hilbert: HilbertSettings, dimensions: usize) -> Self {
        BySlotStorage {
            slots,
            hilbert,
            dimensions,
        }
    }

    fn node_prefix(&self, group: &[u8], id: NodeId) -> Vec<u8> {
        node_key(&self.slots, group, id)
    }

    fn decode_leaf_slot(&self, suffix: &[u8], value: &[u8]) -> RTreeResult<LeafEntry> {
        let mut elements = unpack(suffix)?;
        if elements.len() < self.dimensions {
            return Err(RTreeError::Serialization(format!(
                "Leaf slot holds {} elements for {} dimensions",
                elements.len(),
                self.dimensions
            )));
        }
        let primary_key = pack(&elements.split_off(self.dimensions));
        let point = elements
            .into_iter()
            .map(|v| match v {
                Value::Null => Ok(None),
                Value::Int(i) => Ok(Some(i)),
                other => Err(RTreeError::Serialization(format!(
                    "Unexpected {} coordinate in a leaf slot",
                    other.type_name()
                ))),
            })
            .collect::<RTreeResult<Vec<Coordinate>>>()?;
        let stored: Option<u128> = decode_value(value)?;
        let hilbert = self.hilbert.restore(stored, &point);
        Ok(LeafEntry::new(point, hilbert, primary_key))
    }

    fn decode_child_slot(suffix: &[u8], value: &[u8]) -> RTreeResult<ChildEntry> {
        let raw: [u8; 8] = suffix.try_into().map_err(|_| {
            RTreeError::Serialization(format!("Child slot key has {} bytes", suffix.len()))
        })?;
        let (bbox, smallest_hilbert, largest_hilbert): (BoundingBox, u128, u128) =
            decode_value(value)?;
        Ok(ChildEntry {
            bbox,
            child_id: u64::from_be_bytes(raw),
            smallest_hilbert,
            largest_hilbert,
        })
    }
}

impl NodeStorage for BySlotStorage {
    fn read_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<Option<Node>> {
        let prefix = self.node_prefix(group, id);
        let rows = tx.get_range(&KeyRange::prefix(&prefix), None, false)?;
        let mut rows = rows.into_iter();
        let level = match rows.next() {
            None => return Ok(None),
            Some((key, value)) if key[prefix.len()..] == [SLOT_HEADER] => {
                decode_value::<SlotHeader>(&value)?.level
            }
            Some(_) => {
                log::error!("Node {} of group {:?} has slots but no header", id, group);
                return Err(RTreeError::CorruptIndex(format!(
                    "Node {} has no header slot",
                    id
                )));
            }
        };

        let mut slots = Vec::new();
        for (key, value) in rows {
            let slot = &key[prefix.len()..];
            match slot.split_first() {
                Some((&SLOT_ENTRY, suffix)) => slots.push((suffix.to_vec(), value)),
                _ => {
                    return Err(RTreeError::CorruptIndex(format!(
                        "Node {} holds an unknown slot",
                        id
                    )))
                }
            }
        }

        if level == 0 {
            let entries = slots
                .iter()
                .map(|(suffix, value)| self.decode_leaf_slot(suffix, value))
                .collect::<RTreeResult<Vec<_>>>()?;
            Ok(Some(Node::Leaf { id, entries }))
        } else {
            let children = slots
                .iter()
                .map(|(suffix, value)| Self::decode_child_slot(suffix, value))
                .collect::<RTreeResult<Vec<_>>>()?;
            Ok(Some(Node::Internal {
                id,
                level,
                children,
            }))
        }
    }

    fn write_node(&self, tx: &Transaction, group: &[u8], node: &Node) -> RTreeResult<()> {
        let prefix = self.node_prefix(group, node.id());
        tx.clear_range(&KeyRange::prefix(&prefix))?;

        let slot_key = |suffix: &[u8]| {
            let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
            key.extend_from_slice(&prefix);
            key.push(SLOT_ENTRY);
            key.extend_from_slice(suffix);
            key
        };

        let mut header_key = prefix.clone();
        header_key.push(SLOT_HEADER);
        tx.set(
            &header_key,
            &encode_value(&SlotHeader {
                level: node.level(),
            })?,
        )?;

        match node {
            Node::Leaf { entries, .. } => {
                for entry in entries {
                    let mut suffix = encode_key(&entry.point);
                    suffix.extend_from_slice(&entry.primary_key);
                    let value = encode_value(&self.hilbert.persist(entry.hilbert))?;
                    tx.set(&slot_key(&suffix), &value)?;
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    let value = encode_value(&(
                        &child.bbox,
                        child.smallest_hilbert,
                        child.largest_hilbert,
                    ))?;
                    tx.set(&slot_key(&child.child_id.to_be_bytes()), &value)?;
                }
            }
        }
        Ok(())
    }

    fn delete_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<()> {
        tx.clear_range(&KeyRange::prefix(&self.node_prefix(group, id)))?;
        Ok(())
    }

    fn variant(&self) -> StorageVariant {
        StorageVariant::BySlot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::hilbert_value;
    use strata::store::memory::InMemoryStore;
    use strata::transaction::Database;
    use strata::tuple;

    fn setup(store: bool) -> (Database, BySlotStorage) {
        let db = Database::builder()
            .store(InMemoryStore::default())
            .open()
            .unwrap();
        let storage = BySlotStorage::new(
            Subspace::from_tuple(&tuple!["slots"]),
            HilbertSettings { store, bits: 64 },
            2,
        );
        (db, storage)
    }

    #[test]
    fn test_leaf_entries_follow_key_order() {
        let (db, storage) = setup(false);
        let points: Vec<Vec<Coordinate>> = vec![
            vec![Some(9), Some(0)],
            vec![None, Some(5)],
            vec![Some(-2), None],
            vec![Some(9), Some(-1)],
        ];
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                LeafEntry::new(p.clone(), hilbert_value(p, 64), pack(&tuple!["pk", i as i64]))
            })
            .collect();
        let tx = db.begin().unwrap();
        storage
            .write_node(&tx, &[], &Node::Leaf { id: 5, entries })
            .unwrap();

        let read = storage.read_node(&tx, &[], 5).unwrap().unwrap();
        let Node::Leaf { entries, .. } = read else {
            panic!("expected leaf");
        };
        let read_points: Vec<Vec<Coordinate>> = entries.iter().map(|e| e.point.clone()).collect();
        let mut expected = points.clone();
        expected.sort();
        assert_eq!(read_points, expected);
        assert_eq!(entries[0].primary_key, pack(&tuple!["pk", 1i64]));
        assert_eq!(entries[0].hilbert, hilbert_value(&entries[0].point, 64));
    }

    #[test]
    fn test_rewrite_replaces_previous_slots() {
        let (db, storage) = setup(true);
        let tx = db.begin().unwrap();
        let big = Node::Leaf {
            id: 1,
            entries: (0..5)
                .map(|i| LeafEntry::new(vec![Some(i), Some(i)], i as u128, pack(&tuple![i])))
                .collect(),
        };
        storage.write_node(&tx, &[], &big).unwrap();
        let small = Node::Leaf {
            id: 1,
            entries: vec![LeafEntry::new(vec![Some(3), Some(3)], 3, pack(&tuple![3i64]))],
        };
        storage.write_node(&tx, &[], &small).unwrap();
        assert_eq!(storage.read_node(&tx, &[], 1).unwrap().unwrap(), small);
    }

    #[test]
    fn test_slots_without_header_are_corruption() {
        let (db, storage) = setup(true);
        let tx = db.begin().unwrap();
        let mut key = storage.node_prefix(&[], 8);
        key.push(SLOT_ENTRY);
        key.extend_from_slice(&7u64.to_be_bytes());
        tx.set(&key, b"junk").unwrap();
        assert!(matches!(
            storage.read_node(&tx, &[], 8),
            Err(RTreeError::CorruptIndex(_))
        ));
    }
}
