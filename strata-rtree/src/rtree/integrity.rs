//! Structural integrity checking of a group's tree.
//!
//! The check walks the whole tree and verifies:
//! - every parent entry equals the exact summary (box and Hilbert range) of
//!   the child it references
//! - fanout stays within bounds (a leaf root may hold a single entry, an
//!   internal root needs two children)
//! - levels decrease by one per step, so all leaves sit at the same depth
//! - every node is referenced exactly once
//! - every point has one coordinate per dimension

use super::rtree_types::{IndexStats, Node, NodeId, RTreeError, RTreeResult};
use super::storage::RTreeStorage;
use std::collections::HashSet;
use strata::transaction::Transaction;

fn violation(group: &[u8], message: String) -> RTreeError {
    log::error!("Integrity violation in group {:?}: {}", group, message);
    RTreeError::CorruptIndex(message)
}

/// Validates the tree of one group.
///
/// # Returns
/// Statistics of the tree; all zero when the group holds no tree.
pub(crate) fn validate_group(
    tx: &Transaction,
    storage: &RTreeStorage,
    group: &[u8],
    min_fanout: usize,
    max_fanout: usize,
    dimensions: usize,
) -> RTreeResult<IndexStats> {
    let mut stats = IndexStats::default();
    let root = match storage.read_root(tx, group)? {
        Some(root) => root,
        None => return Ok(stats),
    };
    stats.groups = 1;
    stats.height = root.level + 1;

    let mut seen: HashSet<NodeId> = HashSet::new();
    // (node id, expected level, is root)
    let mut stack = vec![(root.node_id, root.level, true)];
    while let Some((id, level, is_root)) = stack.pop() {
        if !seen.insert(id) {
            return Err(violation(group, format!("Node {} is referenced twice", id)));
        }
        let node = storage.require_node(tx, group, id)?;
        stats.nodes += 1;

        if node.level() != level {
            return Err(violation(
                group,
                format!("Node {} is at level {}, expected {}", id, node.level(), level),
            ));
        }

        let len = node.len();
        let lower = match (is_root, node.is_leaf()) {
            (true, true) => 1,
            (true, false) => 2,
            (false, _) => min_fanout,
        };
        if len < lower || len > max_fanout {
            return Err(violation(
                group,
                format!(
                    "Node {} holds {} entries outside [{}, {}]",
                    id, len, lower, max_fanout
                ),
            ));
        }

        match node {
            Node::Leaf { entries, .. } => {
                stats.entries += entries.len() as u64;
                if let Some(e) = entries.iter().find(|e| e.point.len() != dimensions) {
                    return Err(violation(
                        group,
                        format!(
                            "Node {} holds a point with {} coordinates instead of {}",
                            id,
                            e.point.len(),
                            dimensions
                        ),
                    ));
                }
            }
            Node::Internal { children, .. } => {
                for child in &children {
                    let node = storage.require_node(tx, group, child.child_id)?;
                    match node.summary() {
                        Some(summary) if summary == *child => {}
                        _ => {
                            return Err(violation(
                                group,
                                format!(
                                    "Entry for node {} in node {} does not match its summary",
                                    child.child_id, id
                                ),
                            ))
                        }
                    }
                    if level == 0 {
                        return Err(violation(group, format!("Node {} is below level 0", id)));
                    }
                    stack.push((child.child_id, level - 1, false));
                }
            }
        }
    }
    Ok(stats)
}
