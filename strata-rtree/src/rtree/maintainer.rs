//! Insert and delete algorithms of the R-tree.
//!
//! Every operation reads the nodes it needs through the enclosing
//! transaction, modifies them in memory and writes back only what changed.
//! Nothing is cached across calls, so re-running an operation after a
//! conflict always starts from the transaction's own view of the tree.

use super::rtree_types::{
    ChildEntry, LeafEntry, Node, NodeId, RTreeError, RTreeResult, RootRecord,
};
use super::split::split_entries;
use super::storage::RTreeStorage;
use crate::bounding_box::BoundingBox;
use crate::codec::Coordinate;
use crate::hilbert::hilbert_value;
use crate::options::SplitStrategy;
use strata::transaction::Transaction;

/// Balancing parameters of a tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub min_fanout: usize,
    pub max_fanout: usize,
    pub split_strategy: SplitStrategy,
    pub bits_per_dimension: u32,
}

/// Applies record changes to the trees of an index.
pub(crate) struct RTreeMaintainer<'a> {
    storage: &'a RTreeStorage,
    params: TreeParams,
}

type Path = Vec<(Node, usize)>;

impl<'a> RTreeMaintainer<'a> {
    pub fn new(storage: &'a RTreeStorage, params: TreeParams) -> Self {
        RTreeMaintainer { storage, params }
    }

    /// Inserts a record into the tree of `group`.
    ///
    /// # Arguments
    /// * `tx` - The record's transaction
    /// * `group` - Packed group tuple
    /// * `point` - The record's coordinates, `None` for absent values
    /// * `primary_key` - Packed primary key tuple
    pub fn insert(
        &self,
        tx: &Transaction,
        group: &[u8],
        point: Vec<Coordinate>,
        primary_key: Vec<u8>,
    ) -> RTreeResult<()> {
        let hilbert = hilbert_value(&point, self.params.bits_per_dimension);
        let entry = LeafEntry::new(point, hilbert, primary_key);

        let root = match self.storage.read_root(tx, group)? {
            Some(root) => root,
            None => {
                let id = self.storage.allocate_node_id(tx, group)?;
                let leaf = Node::Leaf {
                    id,
                    entries: vec![entry],
                };
                self.storage.write_node(tx, group, &leaf)?;
                self.storage
                    .set_root(tx, group, RootRecord { node_id: id, level: 0 })?;
                log::debug!("Created leaf root {} for group {:?}", id, group);
                return Ok(());
            }
        };

        let bbox = entry.bbox();
        let mut path: Path = Vec::new();
        let mut current = self.read_root_node(tx, group, &root)?;
        loop {
            let (idx, child_id) = match &current {
                Node::Leaf { .. } => break,
                Node::Internal { children, .. } => {
                    let idx = choose_subtree(children, &bbox, hilbert);
                    (idx, children[idx].child_id)
                }
            };
            let level = current.level();
            path.push((current, idx));
            current = self.read_child(tx, group, level, child_id)?;
        }

        if let Node::Leaf { entries, .. } = &mut current {
            entries.push(entry);
        }
        let mut sibling = self.split_if_overflowing(tx, group, &mut current)?;
        self.write_pair(tx, group, &current, sibling.as_ref())?;

        while let Some((mut parent, idx)) = path.pop() {
            let summary = summarize(&current)?;
            let children = children_mut(&mut parent)?;
            if sibling.is_none() && children[idx] == summary {
                return Ok(());
            }
            children[idx] = summary;
            if let Some(sibling) = sibling.take() {
                children.push(summarize(&sibling)?);
            }
            sibling = self.split_if_overflowing(tx, group, &mut parent)?;
            self.write_pair(tx, group, &parent, sibling.as_ref())?;
            current = parent;
        }

        if let Some(sibling) = sibling {
            let id = self.storage.allocate_node_id(tx, group)?;
            let level = current.level() + 1;
            let new_root = Node::Internal {
                id,
                level,
                children: vec![summarize(&current)?, summarize(&sibling)?],
            };
            self.storage.write_node(tx, group, &new_root)?;
            self.storage
                .set_root(tx, group, RootRecord { node_id: id, level })?;
            log::debug!("Tree of group {:?} grew to level {} (root {})", group, level, id);
        }
        Ok(())
    }

    /// Removes a record from the tree of `group`.
    ///
    /// # Returns
    /// `true` if the record was found and removed.
    pub fn delete(
        &self,
        tx: &Transaction,
        group: &[u8],
        point: &[Coordinate],
        primary_key: &[u8],
    ) -> RTreeResult<bool> {
        let root = match self.storage.read_root(tx, group)? {
            Some(root) => root,
            None => return Ok(false),
        };
        let root_node = self.read_root_node(tx, group, &root)?;

        let mut path: Path = Vec::new();
        let (mut current, pos) =
            match self.find_leaf(tx, group, root_node, point, primary_key, &mut path)? {
                Some(found) => found,
                None => return Ok(false),
            };
        if let Node::Leaf { entries, .. } = &mut current {
            entries.remove(pos);
        }

        while let Some((mut parent, idx)) = path.pop() {
            if current.len() >= self.params.min_fanout {
                let summary = summarize(&current)?;
                self.storage.write_node(tx, group, &current)?;
                let children = children_mut(&mut parent)?;
                if children[idx] == summary {
                    return Ok(true);
                }
                children[idx] = summary;
            } else {
                self.resolve_underflow(tx, group, &mut parent, idx, current)?;
            }
            current = parent;
        }

        self.settle_root(tx, group, current, &root)?;
        Ok(true)
    }

    fn read_root_node(&self, tx: &Transaction, group: &[u8], root: &RootRecord) -> RTreeResult<Node> {
        let node = self.storage.require_node(tx, group, root.node_id)?;
        if node.level() != root.level {
            log::error!(
                "Root {} of group {:?} is at level {}, expected {}",
                root.node_id,
                group,
                node.level(),
                root.level
            );
            return Err(RTreeError::CorruptIndex(format!(
                "Root node {} is at level {} but recorded at level {}",
                root.node_id,
                node.level(),
                root.level
            )));
        }
        Ok(node)
    }

    fn read_child(
        &self,
        tx: &Transaction,
        group: &[u8],
        parent_level: u32,
        child_id: NodeId,
    ) -> RTreeResult<Node> {
        let child = self.storage.require_node(tx, group, child_id)?;
        if child.level() + 1 != parent_level {
            log::error!("Node {} sits at level {} below level {}", child_id, child.level(), parent_level);
            return Err(RTreeError::CorruptIndex(format!(
                "Node {} is at level {} below a node at level {}",
                child_id,
                child.level(),
                parent_level
            )));
        }
        Ok(child)
    }

    /// Depth-first search for the leaf holding exactly `(point, primary_key)`.
    ///
    /// On success `path` holds every ancestor with the index of the child
    /// that was followed.
    fn find_leaf(
        &self,
        tx: &Transaction,
        group: &[u8],
        node: Node,
        point: &[Coordinate],
        primary_key: &[u8],
        path: &mut Path,
    ) -> RTreeResult<Option<(Node, usize)>> {
        let candidates: Vec<(usize, NodeId)> = match &node {
            Node::Leaf { entries, .. } => {
                let found = entries
                    .iter()
                    .position(|e| e.point == point && e.primary_key == primary_key);
                match found {
                    Some(pos) => return Ok(Some((node, pos))),
                    None => return Ok(None),
                }
            }
            Node::Internal { children, .. } => children
                .iter()
                .enumerate()
                .filter(|(_, c)| c.bbox.contains_point(point))
                .map(|(i, c)| (i, c.child_id))
                .collect(),
        };

        let level = node.level();
        path.push((node, 0));
        for (idx, child_id) in candidates {
            if let Some(last) = path.last_mut() {
                last.1 = idx;
            }
            let child = self.read_child(tx, group, level, child_id)?;
            if let Some(found) = self.find_leaf(tx, group, child, point, primary_key, path)? {
                return Ok(Some(found));
            }
        }
        path.pop();
        Ok(None)
    }

    fn split_if_overflowing(
        &self,
        tx: &Transaction,
        group: &[u8],
        node: &mut Node,
    ) -> RTreeResult<Option<Node>> {
        if node.len() <= self.params.max_fanout {
            return Ok(None);
        }
        let new_id = self.storage.allocate_node_id(tx, group)?;
        let (min, strategy) = (self.params.min_fanout, self.params.split_strategy);
        let sibling = match node {
            Node::Leaf { entries, .. } => {
                let (left, right) = split_entries(std::mem::take(entries), min, strategy);
                *entries = left;
                Node::Leaf {
                    id: new_id,
                    entries: right,
                }
            }
            Node::Internal {
                level, children, ..
            } => {
                let (left, right) = split_entries(std::mem::take(children), min, strategy);
                *children = left;
                Node::Internal {
                    id: new_id,
                    level: *level,
                    children: right,
                }
            }
        };
        log::debug!(
            "Split node {} at level {} into {} + {} entries (new node {})",
            node.id(),
            node.level(),
            node.len(),
            sibling.len(),
            new_id
        );
        Ok(Some(sibling))
    }

    fn write_pair(
        &self,
        tx: &Transaction,
        group: &[u8],
        node: &Node,
        sibling: Option<&Node>,
    ) -> RTreeResult<()> {
        self.storage.write_node(tx, group, node)?;
        if let Some(sibling) = sibling {
            self.storage.write_node(tx, group, sibling)?;
        }
        Ok(())
    }

    /// Restores the fanout of `child`, the `idx`-th child of `parent`, by
    /// merging it into a sibling or sharing a sibling's entries.
    fn resolve_underflow(
        &self,
        tx: &Transaction,
        group: &[u8],
        parent: &mut Node,
        idx: usize,
        mut child: Node,
    ) -> RTreeResult<()> {
        let parent_level = parent.level();
        let children = children_mut(parent)?;

        if child.is_empty() {
            self.storage.delete_node(tx, group, child.id())?;
            children.remove(idx);
            log::debug!("Removed empty node {} of group {:?}", child.id(), group);
            return Ok(());
        }

        let child_bbox = child.compute_bbox().unwrap_or_else(|| children[idx].bbox.clone());
        let sibling_idx = children
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .min_by(|(_, a), (_, b)| {
                a.bbox
                    .enlargement(&child_bbox)
                    .total_cmp(&b.bbox.enlargement(&child_bbox))
            })
            .map(|(i, _)| i);

        let sibling_idx = match sibling_idx {
            Some(i) => i,
            None => {
                // only child of its parent, the parent level resolves it
                self.storage.write_node(tx, group, &child)?;
                children[idx] = summarize(&child)?;
                return Ok(());
            }
        };

        let mut sibling = self.read_child(tx, group, parent_level, children[sibling_idx].child_id)?;
        if sibling.len() + child.len() <= self.params.max_fanout {
            log::debug!(
                "Merging node {} ({} entries) into node {} ({} entries)",
                child.id(),
                child.len(),
                sibling.id(),
                sibling.len()
            );
            let child_id = child.id();
            merge_into(&mut sibling, child)?;
            self.storage.write_node(tx, group, &sibling)?;
            self.storage.delete_node(tx, group, child_id)?;
            children[sibling_idx] = summarize(&sibling)?;
            children.remove(idx);
        } else {
            redistribute(
                &mut child,
                &mut sibling,
                self.params.min_fanout,
                self.params.split_strategy,
            )?;
            log::debug!(
                "Redistributed nodes {} and {} into {} + {} entries",
                child.id(),
                sibling.id(),
                child.len(),
                sibling.len()
            );
            self.write_pair(tx, group, &child, Some(&sibling))?;
            children[idx] = summarize(&child)?;
            children[sibling_idx] = summarize(&sibling)?;
        }
        Ok(())
    }

    /// Writes the final root after a delete, collapsing single-child levels
    /// and dropping the tree once it is empty.
    fn settle_root(
        &self,
        tx: &Transaction,
        group: &[u8],
        mut root: Node,
        previous: &RootRecord,
    ) -> RTreeResult<()> {
        loop {
            if root.is_empty() {
                self.storage.delete_node(tx, group, root.id())?;
                self.storage.clear_root(tx, group)?;
                log::debug!("Tree of group {:?} is now empty", group);
                return Ok(());
            }
            let only_child = match &root {
                Node::Internal { children, .. } if children.len() == 1 => {
                    Some(children[0].child_id)
                }
                _ => None,
            };
            match only_child {
                Some(child_id) => {
                    self.storage.delete_node(tx, group, root.id())?;
                    let child = self.read_child(tx, group, root.level(), child_id)?;
                    log::debug!(
                        "Collapsed root {} of group {:?} to node {} at level {}",
                        root.id(),
                        group,
                        child.id(),
                        child.level()
                    );
                    root = child;
                }
                None => break,
            }
        }

        self.storage.write_node(tx, group, &root)?;
        let record = RootRecord {
            node_id: root.id(),
            level: root.level(),
        };
        if record != *previous {
            self.storage.set_root(tx, group, record)?;
        }
        Ok(())
    }
}

/// Picks the child needing the least enlargement to cover `bbox`; ties go to
/// the smaller result, then to the closest largest Hilbert value.
fn choose_subtree(children: &[ChildEntry], bbox: &BoundingBox, hilbert: u128) -> usize {
    children
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let enlargement = c.bbox.enlargement(bbox);
            let area = c.bbox.union(bbox).area();
            (i, enlargement, area, c.largest_hilbert.abs_diff(hilbert))
        })
        .min_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.2.total_cmp(&b.2))
                .then(a.3.cmp(&b.3))
        })
        .map(|(i, ..)| i)
        .unwrap_or(0)
}

fn summarize(node: &Node) -> RTreeResult<ChildEntry> {
    node.summary().ok_or_else(|| {
        RTreeError::CorruptIndex(format!("Node {} is empty but still referenced", node.id()))
    })
}

fn children_mut(node: &mut Node) -> RTreeResult<&mut Vec<ChildEntry>> {
    match node {
        Node::Internal { children, .. } => Ok(children),
        Node::Leaf { id, .. } => Err(RTreeError::CorruptIndex(format!(
            "Leaf node {} found where an internal node was expected",
            id
        ))),
    }
}

fn merge_into(target: &mut Node, source: Node) -> RTreeResult<()> {
    match (target, source) {
        (Node::Leaf { entries: t, .. }, Node::Leaf { entries: s, .. }) => t.extend(s),
        (Node::Internal { children: t, .. }, Node::Internal { children: s, .. }) => t.extend(s),
        (target, source) => {
            return Err(RTreeError::CorruptIndex(format!(
                "Sibling nodes {} and {} are at different levels",
                target.id(),
                source.id()
            )))
        }
    }
    Ok(())
}

fn redistribute(
    a: &mut Node,
    b: &mut Node,
    min: usize,
    strategy: SplitStrategy,
) -> RTreeResult<()> {
    let ids = (a.id(), b.id());
    match (a, b) {
        (Node::Leaf { entries: x, .. }, Node::Leaf { entries: y, .. }) => {
            let mut pool = std::mem::take(x);
            pool.append(y);
            let (left, right) = split_entries(pool, min, strategy);
            *x = left;
            *y = right;
        }
        (Node::Internal { children: x, .. }, Node::Internal { children: y, .. }) => {
            let mut pool = std::mem::take(x);
            pool.append(y);
            let (left, right) = split_entries(pool, min, strategy);
            *x = left;
            *y = right;
        }
        _ => {
            return Err(RTreeError::CorruptIndex(format!(
                "Sibling nodes {} and {} are at different levels",
                ids.0, ids.1
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StorageVariant;
    use crate::rtree::storage::HilbertSettings;
    use crate::rtree::integrity::validate_group;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use strata::common::{pack, Subspace};
    use strata::store::memory::InMemoryStore;
    use strata::transaction::Database;
    use strata::tuple;

    fn params(strategy: SplitStrategy) -> TreeParams {
        TreeParams {
            min_fanout: 2,
            max_fanout: 4,
            split_strategy: strategy,
            bits_per_dimension: 64,
        }
    }

    fn setup(variant: StorageVariant) -> (Database, RTreeStorage) {
        let db = Database::builder()
            .store(InMemoryStore::default())
            .open()
            .unwrap();
        let storage = RTreeStorage::new(
            &Subspace::from_tuple(&tuple!["rt"]),
            variant,
            HilbertSettings {
                store: true,
                bits: 64,
            },
            2,
        );
        (db, storage)
    }

    fn random_points(seed: u64, n: usize) -> Vec<Vec<Coordinate>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                (0..2)
                    .map(|_| {
                        if rng.gen_bool(0.1) {
                            None
                        } else {
                            Some(rng.gen_range(-1000..1000))
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn collect_keys(tx: &Transaction, storage: &RTreeStorage, group: &[u8]) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let Some(root) = storage.read_root(tx, group).unwrap() else {
            return keys;
        };
        let mut stack = vec![root.node_id];
        while let Some(id) = stack.pop() {
            match storage.require_node(tx, group, id).unwrap() {
                Node::Leaf { entries, .. } => {
                    keys.extend(entries.into_iter().map(|e| e.primary_key))
                }
                Node::Internal { children, .. } => {
                    stack.extend(children.iter().map(|c| c.child_id))
                }
            }
        }
        keys.sort();
        keys
    }

    #[test]
    fn test_insert_grows_balanced_tree() {
        for variant in [StorageVariant::ByNode, StorageVariant::BySlot] {
            for strategy in [SplitStrategy::Hilbert, SplitStrategy::Quadratic] {
                let (db, storage) = setup(variant);
                let maintainer = RTreeMaintainer::new(&storage, params(strategy));
                let group = pack(&tuple!["g"]);
                let tx = db.begin().unwrap();
                for (i, point) in random_points(7, 200).into_iter().enumerate() {
                    maintainer
                        .insert(&tx, &group, point, pack(&tuple![i as i64]))
                        .unwrap();
                }
                let stats = validate_group(&tx, &storage, &group, 2, 4, 2).unwrap();
                assert_eq!(stats.entries, 200);
                assert!(stats.height >= 4, "height {}", stats.height);
                assert_eq!(collect_keys(&tx, &storage, &group).len(), 200);
                tx.commit().unwrap();
            }
        }
    }

    #[test]
    fn test_delete_condenses_tree() {
        for variant in [StorageVariant::ByNode, StorageVariant::BySlot] {
            for strategy in [SplitStrategy::Hilbert, SplitStrategy::Quadratic] {
                let (db, storage) = setup(variant);
                let maintainer = RTreeMaintainer::new(&storage, params(strategy));
                let group = pack(&tuple![]);
                let points = random_points(11, 120);
                let tx = db.begin().unwrap();
                for (i, point) in points.iter().enumerate() {
                    maintainer
                        .insert(&tx, &group, point.clone(), pack(&tuple![i as i64]))
                        .unwrap();
                }

                // remove every record with an odd key, validating as we go
                for (i, point) in points.iter().enumerate().filter(|(i, _)| i % 2 == 1) {
                    let removed = maintainer
                        .delete(&tx, &group, point, &pack(&tuple![i as i64]))
                        .unwrap();
                    assert!(removed);
                    if i % 10 == 1 {
                        validate_group(&tx, &storage, &group, 2, 4, 2).unwrap();
                    }
                }
                let stats = validate_group(&tx, &storage, &group, 2, 4, 2).unwrap();
                assert_eq!(stats.entries, 60);
                let expected: Vec<Vec<u8>> = {
                    let mut keys: Vec<Vec<u8>> = (0..120)
                        .filter(|i| i % 2 == 0)
                        .map(|i| pack(&tuple![i as i64]))
                        .collect();
                    keys.sort();
                    keys
                };
                assert_eq!(collect_keys(&tx, &storage, &group), expected);

                for (i, point) in points.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
                    assert!(maintainer
                        .delete(&tx, &group, point, &pack(&tuple![i as i64]))
                        .unwrap());
                }
                assert!(storage.read_root(&tx, &group).unwrap().is_none());
            }
        }
    }

    #[test]
    fn test_delete_missing_record() {
        let (db, storage) = setup(StorageVariant::ByNode);
        let maintainer = RTreeMaintainer::new(&storage, params(SplitStrategy::Hilbert));
        let tx = db.begin().unwrap();
        let group = pack(&tuple!["g"]);
        assert!(!maintainer
            .delete(&tx, &group, &[Some(1), Some(1)], &pack(&tuple![1i64]))
            .unwrap());

        maintainer
            .insert(&tx, &group, vec![Some(1), Some(1)], pack(&tuple![1i64]))
            .unwrap();
        // same point, other key
        assert!(!maintainer
            .delete(&tx, &group, &[Some(1), Some(1)], &pack(&tuple![2i64]))
            .unwrap());
        // same key, other point
        assert!(!maintainer
            .delete(&tx, &group, &[Some(1), None], &pack(&tuple![1i64]))
            .unwrap());
        assert!(maintainer
            .delete(&tx, &group, &[Some(1), Some(1)], &pack(&tuple![1i64]))
            .unwrap());
    }

    #[test]
    fn test_all_null_point() {
        let (db, storage) = setup(StorageVariant::BySlot);
        let maintainer = RTreeMaintainer::new(&storage, params(SplitStrategy::Hilbert));
        let tx = db.begin().unwrap();
        let group = pack(&tuple![]);
        for i in 0..10i64 {
            maintainer
                .insert(&tx, &group, vec![None, None], pack(&tuple![i]))
                .unwrap();
        }
        let stats = validate_group(&tx, &storage, &group, 2, 4, 2).unwrap();
        assert_eq!(stats.entries, 10);
        for i in 0..10i64 {
            assert!(maintainer
                .delete(&tx, &group, &[None, None], &pack(&tuple![i]))
                .unwrap());
        }
        assert!(storage.read_root(&tx, &group).unwrap().is_none());
    }

    #[test]
    fn test_dangling_child_is_corruption() {
        let (db, storage) = setup(StorageVariant::ByNode);
        let maintainer = RTreeMaintainer::new(&storage, params(SplitStrategy::Hilbert));
        let tx = db.begin().unwrap();
        let group = pack(&tuple![]);
        for (i, point) in random_points(3, 20).into_iter().enumerate() {
            maintainer
                .insert(&tx, &group, point, pack(&tuple![i as i64]))
                .unwrap();
        }
        let root = storage.read_root(&tx, &group).unwrap().unwrap();
        let Node::Internal { children, .. } = storage.require_node(&tx, &group, root.node_id).unwrap()
        else {
            panic!("expected an internal root");
        };
        for child in &children {
            storage.delete_node(&tx, &group, child.child_id).unwrap();
        }
        let result = maintainer.insert(&tx, &group, vec![Some(0), Some(0)], pack(&tuple![99i64]));
        assert!(matches!(result, Err(RTreeError::CorruptIndex(_))));
    }
}
