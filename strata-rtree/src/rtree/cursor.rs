//! Resumable traversal of one group's tree.
//!
//! Entries come out in the scan order of the layout. The by-node layout
//! orders by Hilbert value, then encoded point, then primary key; the
//! by-slot layout by encoded point, then primary key. Pending subtrees wait
//! in a min-heap under a lower bound of the entries below them, so the
//! order holds whatever shape inserts and deletes gave the tree.
//!
//! A position is the [`ScanKey`] of the last emitted entry. Resuming
//! descends from the current root and drops every subtree and entry at or
//! before that key, so splits, merges and deletes between pages neither
//! repeat nor lose an entry.

use super::rtree_types::{ChildEntry, LeafEntry, Node, NodeId, RTreeResult, RootRecord};
use super::storage::RTreeStorage;
use crate::bounds::{Intersection, ScanBounds};
use crate::codec::encode_key;
use crate::options::StorageVariant;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use strata::transaction::Transaction;

/// Position of a leaf entry in scan order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) struct ScanKey {
    /// Always 0 in key order
    pub hilbert: u128,
    pub point: Vec<u8>,
    pub primary_key: Vec<u8>,
}

/// The total order a layout emits its entries in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanOrder {
    Hilbert,
    Key,
}

impl ScanOrder {
    pub fn of(variant: StorageVariant) -> ScanOrder {
        match variant {
            StorageVariant::ByNode => ScanOrder::Hilbert,
            StorageVariant::BySlot => ScanOrder::Key,
        }
    }

    pub fn entry_key(&self, entry: &LeafEntry) -> ScanKey {
        ScanKey {
            hilbert: match self {
                ScanOrder::Hilbert => entry.hilbert,
                ScanOrder::Key => 0,
            },
            point: encode_key(&entry.point),
            primary_key: entry.primary_key.clone(),
        }
    }

    /// A key at or before every entry below `child`.
    ///
    /// The lower corner of a box sorts before every point inside it, and
    /// an empty byte string before every encoded point.
    fn lower_bound(&self, child: &ChildEntry) -> ScanKey {
        match self {
            ScanOrder::Hilbert => ScanKey {
                hilbert: child.smallest_hilbert,
                point: Vec::new(),
                primary_key: Vec::new(),
            },
            ScanOrder::Key => ScanKey {
                hilbert: 0,
                point: encode_key(&child.bbox.lows),
                primary_key: Vec::new(),
            },
        }
    }

    /// Returns `true` if every entry below `child` sorts strictly before `key`.
    fn precedes(&self, child: &ChildEntry, key: &ScanKey) -> bool {
        match self {
            ScanOrder::Hilbert => child.largest_hilbert < key.hilbert,
            ScanOrder::Key => encode_key(&child.bbox.highs) < key.point,
        }
    }
}

enum Pending {
    Entry(LeafEntry),
    Subtree {
        child_id: NodeId,
        // every entry below lies inside the bounds
        contained: bool,
    },
}

struct Queued {
    key: ScanKey,
    pending: Pending,
}

impl Queued {
    // entries before subtrees of the same key, subtrees by id
    fn rank(&self) -> (u8, NodeId) {
        match self.pending {
            Pending::Entry(_) => (0, 0),
            Pending::Subtree { child_id, .. } => (1, child_id),
        }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.rank().cmp(&other.rank()))
    }
}

/// Ordered search of one group's tree.
pub(crate) struct TreeCursor<'a> {
    storage: &'a RTreeStorage,
    bounds: &'a ScanBounds,
    order: ScanOrder,
    group: Vec<u8>,
    // entries at or before this key are consumed
    after: Option<ScanKey>,
    queue: BinaryHeap<Reverse<Queued>>,
}

impl<'a> TreeCursor<'a> {
    /// Opens a cursor over the tree rooted at `root`.
    ///
    /// # Arguments
    /// * `after` - Key of the last entry an earlier page returned, `None`
    ///   to start before the first entry
    pub fn start(
        tx: &Transaction,
        storage: &'a RTreeStorage,
        bounds: &'a ScanBounds,
        group: Vec<u8>,
        root: RootRecord,
        after: Option<ScanKey>,
    ) -> RTreeResult<Self> {
        let node = storage.require_node(tx, &group, root.node_id)?;
        let mut cursor = TreeCursor {
            storage,
            bounds,
            order: ScanOrder::of(storage.variant()),
            group,
            after,
            queue: BinaryHeap::new(),
        };
        cursor.expand(node, false);
        Ok(cursor)
    }

    pub fn group(&self) -> &[u8] {
        &self.group
    }

    /// Key of the last emitted entry, or of the position the cursor resumed
    /// from while it has not emitted anything.
    pub fn last_key(&self) -> Option<&ScanKey> {
        self.after.as_ref()
    }

    /// Returns the next leaf entry that is not disjoint from the bounds.
    ///
    /// # Errors
    /// `CorruptIndex` if a child referenced by a visited node is missing.
    pub fn next(&mut self, tx: &Transaction) -> RTreeResult<Option<LeafEntry>> {
        if !self.advance(tx)? {
            return Ok(None);
        }
        match self.queue.pop() {
            Some(Reverse(Queued {
                key,
                pending: Pending::Entry(entry),
            })) => {
                self.after = Some(key);
                Ok(Some(entry))
            }
            _ => Ok(None),
        }
    }

    /// Expands subtrees until the smallest queued item is a matching entry.
    ///
    /// # Returns
    /// `false` once the tree holds no further match.
    pub fn advance(&mut self, tx: &Transaction) -> RTreeResult<bool> {
        loop {
            let (child_id, contained) = match self.queue.peek() {
                None => return Ok(false),
                Some(Reverse(Queued {
                    pending: Pending::Entry(_),
                    ..
                })) => return Ok(true),
                Some(Reverse(Queued {
                    pending:
                        Pending::Subtree {
                            child_id,
                            contained,
                        },
                    ..
                })) => (*child_id, *contained),
            };
            self.queue.pop();
            let node = self.storage.require_node(tx, &self.group, child_id)?;
            self.expand(node, contained);
        }
    }

    fn expand(&mut self, node: Node, contained: bool) {
        match node {
            Node::Leaf { entries, .. } => {
                for entry in entries {
                    let key = self.order.entry_key(&entry);
                    if self.after.as_ref().is_some_and(|after| key <= *after) {
                        continue;
                    }
                    if contained
                        || self.bounds.intersects(&entry.bbox()) != Intersection::Disjoint
                    {
                        self.queue.push(Reverse(Queued {
                            key,
                            pending: Pending::Entry(entry),
                        }));
                    }
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    if let Some(after) = &self.after {
                        if self.order.precedes(&child, after) {
                            continue;
                        }
                    }
                    let relation = if contained {
                        Intersection::Contained
                    } else {
                        self.bounds.intersects(&child.bbox)
                    };
                    let child_contained = match relation {
                        Intersection::Disjoint => continue,
                        Intersection::Partial => false,
                        Intersection::Contained => true,
                    };
                    self.queue.push(Reverse(Queued {
                        key: self.order.lower_bound(&child),
                        pending: Pending::Subtree {
                            child_id: child.child_id,
                            contained: child_contained,
                        },
                    }));
                }
            }
        }
    }
}
