use crate::errors::{ErrorKind, StrataError, StrataResult};
use crate::store::{key_after, KeyRange, KeyValue, Mutation};
use crate::transaction::database::{CommitSet, DatabaseInner};
use crate::transaction::TransactionState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const SCAN_BATCH: usize = 256;

/// An optimistic read-write transaction.
///
/// Writes are buffered and only reach the store on [`Transaction::commit`].
/// Reads see the transaction's own writes first and fall back to the store.
/// Every point read and every consumed range is remembered so the commit
/// can be validated against concurrent commits.
///
/// # Characteristics
/// - **Read Your Writes**: `get`/`get_range` merge the write buffer over the store
/// - **All Or Nothing**: a failed commit applies nothing
/// - **Automatic Cleanup**: an active transaction is rolled back on drop
///
/// All methods take `&self`; the buffered state lives behind a mutex.
pub struct Transaction {
    id: u64,
    read_version: u64,
    db: Arc<DatabaseInner>,
    buffer: Mutex<TransactionBuffer>,
}

struct TransactionBuffer {
    state: TransactionState,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    cleared: Vec<KeyRange>,
    mutations: Vec<Mutation>,
    read_keys: BTreeSet<Vec<u8>>,
    read_ranges: Vec<KeyRange>,
}

impl TransactionBuffer {
    fn new() -> TransactionBuffer {
        TransactionBuffer {
            state: TransactionState::Active,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            mutations: Vec::new(),
            read_keys: BTreeSet::new(),
            read_ranges: Vec::new(),
        }
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }

    fn reset(&mut self, state: TransactionState) {
        self.state = state;
        self.writes.clear();
        self.cleared.clear();
        self.mutations.clear();
        self.read_keys.clear();
        self.read_ranges.clear();
    }
}

impl Transaction {
    pub(crate) fn new(id: u64, read_version: u64, db: Arc<DatabaseInner>) -> Transaction {
        Transaction {
            id,
            read_version,
            db,
            buffer: Mutex::new(TransactionBuffer::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The commit version this transaction reads at.
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    pub fn state(&self) -> TransactionState {
        self.buffer.lock().state()
    }

    /// Number of buffered mutations.
    pub fn pending_mutations(&self) -> usize {
        self.buffer.lock().mutations.len()
    }

    /// Point read.
    ///
    /// # Arguments
    /// * `key` - The raw key
    ///
    /// # Returns
    /// The value as seen by this transaction, or `None` if absent.
    ///
    /// # Errors
    /// `TransactionConflict` if the key changed after this transaction started.
    pub fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        let mut buffer = self.buffer.lock();
        check_active(&buffer)?;

        if let Some(value) = buffer.writes.get(key) {
            return Ok(value.clone());
        }
        if buffer.is_cleared(key) {
            return Ok(None);
        }

        let value = self.db.store().get(key)?;
        if self.db.key_changed_since(key, self.read_version) {
            return Err(self.stale_read(&format!("key {:02x?}", key)));
        }
        buffer.read_keys.insert(key.to_vec());
        Ok(value)
    }

    /// Ordered range read merging buffered writes over the store.
    ///
    /// # Arguments
    /// * `range` - Keys to read
    /// * `limit` - Maximum number of pairs, `None` for all
    /// * `reverse` - Descending order when set
    ///
    /// # Returns
    /// Up to `limit` key-value pairs in the requested order. When the limit
    /// cuts the read short only the part of `range` actually consumed joins
    /// the read set.
    pub fn get_range(
        &self,
        range: &KeyRange,
        limit: Option<usize>,
        reverse: bool,
    ) -> StrataResult<Vec<KeyValue>> {
        let mut buffer = self.buffer.lock();
        check_active(&buffer)?;
        if range.is_empty() || limit == Some(0) {
            return Ok(Vec::new());
        }
        let wanted = limit.unwrap_or(usize::MAX);

        // store entries that survive the write buffer, at most `wanted` of them
        let store = self.db.store();
        let mut from_store = Vec::new();
        let mut remaining = range.clone();
        loop {
            let batch = store.scan(&remaining, Some(SCAN_BATCH.min(wanted)), reverse)?;
            let exhausted = batch.len() < SCAN_BATCH.min(wanted);
            let last = batch.last().map(|(key, _)| key.clone());
            for (key, value) in batch {
                if buffer.writes.contains_key(&key) || buffer.is_cleared(&key) {
                    continue;
                }
                from_store.push((key, value));
            }
            if exhausted || from_store.len() >= wanted {
                break;
            }
            match last {
                Some(last) if reverse => remaining = remaining.with_end(last),
                Some(last) => remaining = remaining.with_begin(key_after(&last)),
                None => break,
            }
        }
        from_store.truncate(wanted);

        let buffered = buffer
            .writes
            .range(range.to_bounds())
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), v.clone())));
        let mut merged: Vec<KeyValue> = from_store.into_iter().chain(buffered).collect();
        if reverse {
            merged.sort_by(|a, b| b.0.cmp(&a.0));
        } else {
            merged.sort_by(|a, b| a.0.cmp(&b.0));
        }
        merged.truncate(wanted);

        let consumed = match merged.last() {
            Some((last, _)) if merged.len() == wanted && reverse => range.with_begin(last.clone()),
            Some((last, _)) if merged.len() == wanted => range.with_end(key_after(last)),
            _ => range.clone(),
        };
        if self.db.range_changed_since(&consumed, self.read_version) {
            return Err(self.stale_read(&format!(
                "range {:02x?}..{:02x?}",
                consumed.begin(),
                consumed.end()
            )));
        }
        buffer.read_ranges.push(consumed);
        Ok(merged)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> StrataResult<()> {
        let mut buffer = self.buffer.lock();
        check_active(&buffer)?;
        buffer.writes.insert(key.to_vec(), Some(value.to_vec()));
        buffer
            .mutations
            .push(Mutation::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    pub fn clear(&self, key: &[u8]) -> StrataResult<()> {
        let mut buffer = self.buffer.lock();
        check_active(&buffer)?;
        buffer.writes.insert(key.to_vec(), None);
        buffer.mutations.push(Mutation::Clear(key.to_vec()));
        Ok(())
    }

    /// Removes every key in `range`, including keys set earlier in this
    /// transaction.
    pub fn clear_range(&self, range: &KeyRange) -> StrataResult<()> {
        let mut buffer = self.buffer.lock();
        check_active(&buffer)?;
        if range.is_empty() {
            return Ok(());
        }
        let shadowed: Vec<Vec<u8>> = buffer
            .writes
            .range(range.to_bounds())
            .map(|(key, _)| key.clone())
            .collect();
        for key in shadowed {
            buffer.writes.remove(&key);
        }
        buffer.cleared.push(range.clone());
        buffer.mutations.push(Mutation::ClearRange(range.clone()));
        Ok(())
    }

    /// Validates and applies the buffered writes.
    ///
    /// A transaction without writes commits without validation.
    ///
    /// # Errors
    /// * `TransactionConflict` - a concurrent commit touched the read or write set
    /// * `TransactionClosed` - the transaction already finished
    pub fn commit(&self) -> StrataResult<()> {
        let mut guard = self.buffer.lock();
        let buffer = &mut *guard;
        check_active(buffer)?;

        if buffer.mutations.is_empty() {
            buffer.reset(TransactionState::Committed);
            self.db.unregister(self.id);
            return Ok(());
        }

        let work = CommitSet::from_parts(
            std::mem::take(&mut buffer.read_keys),
            std::mem::take(&mut buffer.read_ranges),
            &buffer.writes,
            std::mem::take(&mut buffer.cleared),
            std::mem::take(&mut buffer.mutations),
        );
        let outcome = self.db.commit(self.id, self.read_version, work);
        self.db.unregister(self.id);
        match outcome {
            Ok(version) => {
                log::trace!("Transaction {} committed at version {}", self.id, version);
                buffer.reset(TransactionState::Committed);
                Ok(())
            }
            Err(err) => {
                buffer.reset(TransactionState::Failed);
                Err(err)
            }
        }
    }

    /// Discards all buffered work. Rolling back a finished transaction is a no-op.
    pub fn rollback(&self) -> StrataResult<()> {
        let mut buffer = self.buffer.lock();
        if buffer.state() != TransactionState::Active {
            return Ok(());
        }
        buffer.reset(TransactionState::Aborted);
        self.db.unregister(self.id);
        Ok(())
    }

    fn stale_read(&self, what: &str) -> StrataError {
        log::debug!(
            "Transaction {} read {} changed after version {}",
            self.id,
            what,
            self.read_version
        );
        StrataError::new(
            &format!("Transaction conflict: {} changed by a newer commit", what),
            ErrorKind::TransactionConflict,
        )
    }
}

fn check_active(buffer: &TransactionBuffer) -> StrataResult<()> {
    match buffer.state() {
        TransactionState::Active => Ok(()),
        state => Err(StrataError::new(
            &format!("Transaction is not active ({:?})", state),
            ErrorKind::TransactionClosed,
        )),
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.buffer.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("read_version", &self.read_version)
            .field("state", &buffer.state())
            .field("pending_mutations", &buffer.mutations.len())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let _ = self.rollback();
    }
}
