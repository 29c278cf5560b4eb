//! Scans across groups.
//!
//! Each group owns an independent tree. The skip-scan walks the root
//! records of the groups selected by a [`GroupRange`] in key order, jumping
//! over everything between them, and runs a [`TreeCursor`] over each
//! group's tree in turn.

use crate::bounds::ScanBounds;
use crate::continuation::ScanPosition;
use crate::rtree::cursor::TreeCursor;
use crate::rtree::storage::RTreeStorage;
use crate::rtree::{LeafEntry, RTreeResult};
use crate::scan_parameters::GroupRange;
use strata::store::{key_after, KeyRange};
use strata::transaction::Transaction;

pub(crate) struct SkipScan<'a> {
    storage: &'a RTreeStorage,
    bounds: &'a ScanBounds,
    ranges: Vec<KeyRange>,
    range_index: usize,
    // groups below this key are done
    next_begin: Vec<u8>,
    cursor: Option<TreeCursor<'a>>,
    // the last emitted entry, or where a resumed scan starts
    position: ScanPosition,
}

impl<'a> SkipScan<'a> {
    pub fn new(storage: &'a RTreeStorage, bounds: &'a ScanBounds, groups: &GroupRange) -> Self {
        SkipScan {
            storage,
            bounds,
            ranges: groups.key_ranges(),
            range_index: 0,
            next_begin: Vec::new(),
            cursor: None,
            position: ScanPosition::start(),
        }
    }

    /// Continues a scan from a saved position.
    ///
    /// The group of the position is re-entered from its current root, after
    /// the last key the scan returned. A group that lost its tree in the
    /// meantime is simply passed over.
    pub fn resume(
        tx: &Transaction,
        storage: &'a RTreeStorage,
        bounds: &'a ScanBounds,
        groups: &GroupRange,
        position: ScanPosition,
    ) -> RTreeResult<Self> {
        let mut scan = SkipScan::new(storage, bounds, groups);
        match &position.after {
            None => scan.next_begin = position.group.clone(),
            Some(after) => {
                scan.next_begin = key_after(&position.group);
                let selected = scan.ranges.iter().any(|r| r.contains(&position.group));
                if !selected {
                    log::warn!(
                        "Continuation group {:?} is outside the scanned groups, skipping it",
                        position.group
                    );
                } else if let Some(root) = storage.read_root(tx, &position.group)? {
                    scan.cursor = Some(TreeCursor::start(
                        tx,
                        storage,
                        bounds,
                        position.group.clone(),
                        root,
                        Some(after.clone()),
                    )?);
                } else {
                    log::debug!(
                        "Group {:?} was emptied since the continuation was taken",
                        position.group
                    );
                }
            }
        }
        scan.position = position;
        Ok(scan)
    }

    /// Number of results emitted since the scan started, pages included.
    pub fn emitted(&self) -> u64 {
        self.position.emitted
    }

    /// Returns the next matching entry and the packed group it belongs to.
    pub fn next(&mut self, tx: &Transaction) -> RTreeResult<Option<(Vec<u8>, LeafEntry)>> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                if let Some(entry) = cursor.next(tx)? {
                    self.position.group = cursor.group().to_vec();
                    self.position.after = cursor.last_key().cloned();
                    self.position.emitted += 1;
                    return Ok(Some((cursor.group().to_vec(), entry)));
                }
            }
            if !self.start_next_group(tx)? {
                return Ok(None);
            }
        }
    }

    /// Returns `true` if another matching entry exists.
    ///
    /// Looks ahead as far as the next match, opening later groups when the
    /// current one is exhausted. The position stays at the last emitted
    /// entry.
    pub fn has_more(&mut self, tx: &Transaction) -> RTreeResult<bool> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                if cursor.advance(tx)? {
                    return Ok(true);
                }
            }
            if !self.start_next_group(tx)? {
                return Ok(false);
            }
        }
    }

    /// Where the scan stands: after the last emitted entry.
    pub fn position(&self) -> ScanPosition {
        self.position.clone()
    }

    // Opens the first group at or after `next_begin`.
    fn start_next_group(&mut self, tx: &Transaction) -> RTreeResult<bool> {
        if let Some(cursor) = self.cursor.take() {
            self.next_begin = key_after(cursor.group());
        }
        while let Some(range) = self.ranges.get(self.range_index) {
            let begin = if self.next_begin.as_slice() > range.begin() {
                self.next_begin.clone()
            } else {
                range.begin().to_vec()
            };
            let in_range = range.end().map_or(true, |end| begin.as_slice() < end);
            if in_range {
                if let Some((group, root)) = self.storage.next_root(tx, &begin, range.end())? {
                    log::trace!("Skip-scan moves to group {:?}", group);
                    self.cursor = Some(TreeCursor::start(
                        tx,
                        self.storage,
                        self.bounds,
                        group,
                        root,
                        None,
                    )?);
                    return Ok(true);
                }
            }
            self.range_index += 1;
        }
        Ok(false)
    }
}
