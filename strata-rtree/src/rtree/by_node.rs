//! By-node layout: a node is a single key holding all of its entries.
//!
//! Leaf entries are kept in Hilbert order (ties broken by encoded point,
//! then primary key) and child entries in order of their largest Hilbert
//! value, so a node's native order follows the curve.

use super::rtree_types::{
    LeafEntry, Node, NodeId, RTreeResult, StoredLeafEntry, StoredNode,
};
use super::storage::{decode_value, encode_value, node_key, HilbertSettings, NodeStorage};
use crate::codec::encode_key;
use crate::options::StorageVariant;
use strata::common::Subspace;
use strata::transaction::Transaction;

pub(crate) struct ByNodeStorage {
    nodes: Subspace,
    hilbert: HilbertSettings,
}

impl ByNodeStorage {
    pub fn new(nodes: Subspace, hilbert: HilbertSettings) -> Self {
        ByNodeStorage { nodes, hilbert }
    }

    fn to_stored(&self, node: &Node) -> StoredNode {
        match node {
            Node::Leaf { entries, .. } => {
                let mut keyed: Vec<(u128, Vec<u8>, &LeafEntry)> = entries
                    .iter()
                    .map(|e| (e.hilbert, encode_key(&e.point), e))
                    .collect();
                keyed.sort_by(|a, b| {
                    a.0.cmp(&b.0)
                        .then_with(|| a.1.cmp(&b.1))
                        .then_with(|| a.2.primary_key.cmp(&b.2.primary_key))
                });
                StoredNode::Leaf {
                    entries: keyed
                        .into_iter()
                        .map(|(_, _, e)| StoredLeafEntry {
                            point: e.point.clone(),
                            hilbert: self.hilbert.persist(e.hilbert),
                            primary_key: e.primary_key.clone(),
                        })
                        .collect(),
                }
            }
            Node::Internal {
                level, children, ..
            } => {
                let mut children = children.clone();
                children.sort_by(|a, b| {
                    a.largest_hilbert
                        .cmp(&b.largest_hilbert)
                        .then_with(|| a.child_id.cmp(&b.child_id))
                });
                StoredNode::Internal {
                    level: *level,
                    children,
                }
            }
        }
    }

    fn from_stored(&self, id: NodeId, stored: StoredNode) -> Node {
        match stored {
            StoredNode::Leaf { entries } => Node::Leaf {
                id,
                entries: entries
                    .into_iter()
                    .map(|e| {
                        let hilbert = self.hilbert.restore(e.hilbert, &e.point);
                        LeafEntry::new(e.point, hilbert, e.primary_key)
                    })
                    .collect(),
            },
            StoredNode::Internal { level, children } => Node::Internal {
                id,
                level,
                children,
            },
        }
    }
}

impl NodeStorage for ByNodeStorage {
    fn read_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<Option<Node>> {
        match tx.get(&node_key(&self.nodes, group, id))? {
            Some(bytes) => {
                let stored: StoredNode = decode_value(&bytes)?;
                Ok(Some(self.from_stored(id, stored)))
            }
            None => Ok(None),
        }
    }

    fn write_node(&self, tx: &Transaction, group: &[u8], node: &Node) -> RTreeResult<()> {
        let bytes = encode_value(&self.to_stored(node))?;
        tx.set(&node_key(&self.nodes, group, node.id()), &bytes)?;
        Ok(())
    }

    fn delete_node(&self, tx: &Transaction, group: &[u8], id: NodeId) -> RTreeResult<()> {
        tx.clear(&node_key(&self.nodes, group, id))?;
        Ok(())
    }

    fn variant(&self) -> StorageVariant {
        StorageVariant::ByNode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::hilbert_value;
    use crate::rtree::ChildEntry;
    use crate::BoundingBox;
    use strata::store::memory::InMemoryStore;
    use strata::transaction::Database;
    use strata::tuple;

    fn storage(store: bool) -> ByNodeStorage {
        ByNodeStorage::new(
            Subspace::from_tuple(&tuple!["nodes"]),
            HilbertSettings { store, bits: 64 },
        )
    }

    #[test]
    fn test_leaf_entries_follow_hilbert_order() {
        let db = Database::builder()
            .store(InMemoryStore::default())
            .open()
            .unwrap();
        let points: Vec<Vec<Option<i64>>> = vec![
            vec![Some(100), Some(-7)],
            vec![None, Some(3)],
            vec![Some(-50), Some(50)],
            vec![Some(4), Some(4)],
        ];
        let entries: Vec<LeafEntry> = points
            .iter()
            .enumerate()
            .map(|(i, p)| LeafEntry::new(p.clone(), hilbert_value(p, 64), vec![i as u8]))
            .collect();
        let node = Node::Leaf { id: 1, entries };

        for store in [true, false] {
            let storage = storage(store);
            let tx = db.begin().unwrap();
            storage.write_node(&tx, &[], &node).unwrap();
            let read = storage.read_node(&tx, &[], 1).unwrap().unwrap();
            match read {
                Node::Leaf { entries, .. } => {
                    assert_eq!(entries.len(), 4);
                    assert!(entries.windows(2).all(|w| w[0].hilbert <= w[1].hilbert));
                    for e in &entries {
                        assert_eq!(e.hilbert, hilbert_value(&e.point, 64));
                    }
                }
                _ => panic!("expected leaf"),
            }
        }
    }

    #[test]
    fn test_children_follow_largest_hilbert() {
        let child = |id: NodeId, lhv: u128| ChildEntry {
            bbox: BoundingBox::point(&[Some(id as i64)]),
            child_id: id,
            smallest_hilbert: lhv / 2,
            largest_hilbert: lhv,
        };
        let node = Node::Internal {
            id: 10,
            level: 2,
            children: vec![child(1, 90), child(2, 10), child(3, 50)],
        };
        match storage(true).to_stored(&node) {
            StoredNode::Internal { level, children } => {
                assert_eq!(level, 2);
                let ids: Vec<NodeId> = children.iter().map(|c| c.child_id).collect();
                assert_eq!(ids, vec![2, 3, 1]);
            }
            _ => panic!("expected internal node"),
        }
    }

    #[test]
    fn test_hilbert_not_persisted_when_disabled() {
        let node = Node::Leaf {
            id: 3,
            entries: vec![LeafEntry::new(vec![Some(1)], 5, vec![0])],
        };
        match storage(false).to_stored(&node) {
            StoredNode::Leaf { entries } => assert_eq!(entries[0].hilbert, None),
            _ => panic!("expected leaf"),
        }
        match storage(true).to_stored(&node) {
            StoredNode::Leaf { entries } => assert_eq!(entries[0].hilbert, Some(5)),
            _ => panic!("expected leaf"),
        }
    }
}
