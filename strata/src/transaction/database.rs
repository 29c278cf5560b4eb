use crate::errors::{ErrorKind, StrataError, StrataResult};
use crate::store::{KeyRange, KvStore, Mutation, StoreProvider};
use crate::transaction::{Transaction, TransactionConfig};
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Transactional front end over a [`StoreProvider`].
///
/// A `Database` hands out optimistic [`Transaction`]s. Transactions buffer
/// their writes and remember what they read; at commit the read set and the
/// write set are validated against everything committed since the
/// transaction started. A conflicting commit fails with
/// [`ErrorKind::TransactionConflict`] and applies nothing, so the whole
/// unit of work can be re-run from scratch with [`Database::run`].
///
/// Reads that would observe data committed after the transaction started
/// fail early with the same error, so a transaction never sees a mix of
/// old and new state.
///
/// # Usage
/// ```text
/// let db = Database::builder().store(InMemoryStore::default()).open()?;
/// db.run(|tx| {
///     tx.set(b"k", b"v")?;
///     Ok(())
/// })?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Starts a new transaction reading at the latest committed version.
    pub fn begin(&self) -> StrataResult<Transaction> {
        let (id, read_version) = self.inner.register()?;
        Ok(Transaction::new(id, read_version, self.inner.clone()))
    }

    /// Runs `f` inside a transaction and commits it.
    ///
    /// When the closure or the commit fails with a retryable error the
    /// transaction is discarded and the closure runs again in a fresh one,
    /// up to the configured `max_retries`. Any other error is returned as is.
    ///
    /// # Arguments
    /// * `f` - The unit of work; it must be safe to run more than once
    ///
    /// # Returns
    /// The closure's value from the attempt that committed.
    pub fn run<T, F>(&self, mut f: F) -> StrataResult<T>
    where
        F: FnMut(&Transaction) -> StrataResult<T>,
    {
        let max_retries = self.inner.config.get_max_retries();
        let mut attempt = 0;
        loop {
            let tx = self.begin()?;
            let outcome = f(&tx).and_then(|value| {
                tx.commit()?;
                Ok(value)
            });
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    log::debug!(
                        "Transaction {} conflicted, retrying (attempt {} of {})",
                        tx.id(),
                        attempt,
                        max_retries
                    );
                    drop(tx);
                    self.inner.backoff(attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Handle to the underlying store.
    pub fn store(&self) -> KvStore {
        self.inner.store.clone()
    }

    pub fn config(&self) -> TransactionConfig {
        self.inner.config.clone()
    }

    /// Version of the most recent commit.
    pub fn current_version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Number of transactions that are neither committed nor rolled back.
    pub fn active_transactions(&self) -> usize {
        self.inner.active.len()
    }

    /// Closes the underlying store. Open transactions can no longer commit.
    pub fn close(&self) -> StrataResult<()> {
        let _guard = self.inner.commit_lock.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.store.commit()?;
        self.inner.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Builder for [`Database`].
pub struct DatabaseBuilder {
    store: Option<KvStore>,
    config: TransactionConfig,
}

impl DatabaseBuilder {
    fn new() -> DatabaseBuilder {
        DatabaseBuilder {
            store: None,
            config: TransactionConfig::new(),
        }
    }

    /// Sets the engine the database runs on.
    pub fn store<T: StoreProvider + 'static>(mut self, store: T) -> Self {
        self.store = Some(KvStore::new(store));
        self
    }

    /// Uses an already wrapped store handle.
    pub fn kv_store(mut self, store: KvStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    /// Opens the store and returns the database.
    pub fn open(self) -> StrataResult<Database> {
        let store = self.store.ok_or_else(|| {
            log::error!("No store configured for the database");
            StrataError::new(
                "No store configured for the database",
                ErrorKind::StoreNotInitialized,
            )
        })?;
        store.open_or_create()?;
        log::debug!("Opened database on store {}", store.store_name());
        Ok(Database {
            inner: Arc::new(DatabaseInner::new(store, self.config)),
        })
    }
}

pub(crate) struct DatabaseInner {
    store: KvStore,
    config: TransactionConfig,
    commit_lock: Mutex<()>,
    version: AtomicU64,
    next_tx_id: AtomicU64,
    commits_since_prune: AtomicU64,
    // last commit version of every recently written key
    versions: SkipMap<Vec<u8>, u64>,
    cleared: Mutex<Vec<(KeyRange, u64)>>,
    // transaction id -> read version
    active: DashMap<u64, u64>,
    closed: AtomicBool,
}

impl DatabaseInner {
    fn new(store: KvStore, config: TransactionConfig) -> DatabaseInner {
        DatabaseInner {
            store,
            config,
            commit_lock: Mutex::new(()),
            version: AtomicU64::new(0),
            next_tx_id: AtomicU64::new(1),
            commits_since_prune: AtomicU64::new(0),
            versions: SkipMap::new(),
            cleared: Mutex::new(Vec::new()),
            active: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn store(&self) -> &KvStore {
        &self.store
    }

    fn check_opened(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Database on {} is closed", self.store.store_name());
            return Err(StrataError::new(
                "Database is closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    fn register(&self) -> StrataResult<(u64, u64)> {
        // serialised with commits so a new reader never misses a version
        // that a concurrent prune is about to drop
        let _guard = self.commit_lock.lock();
        self.check_opened()?;
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        let read_version = self.version.load(Ordering::Acquire);
        self.active.insert(id, read_version);
        Ok((id, read_version))
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.active.remove(&id);
    }

    /// True if `key` was written or cleared by a commit newer than `read_version`.
    pub(crate) fn key_changed_since(&self, key: &[u8], read_version: u64) -> bool {
        let written = self
            .versions
            .get(key)
            .map_or(false, |entry| *entry.value() > read_version);
        written
            || self
                .cleared
                .lock()
                .iter()
                .any(|(range, version)| *version > read_version && range.contains(key))
    }

    /// True if any key in `range` was written or cleared by a commit newer
    /// than `read_version`.
    pub(crate) fn range_changed_since(&self, range: &KeyRange, read_version: u64) -> bool {
        if range.is_empty() {
            return false;
        }
        let written = self
            .versions
            .range(range.to_bounds())
            .any(|entry| *entry.value() > read_version);
        written
            || self
                .cleared
                .lock()
                .iter()
                .any(|(cleared, version)| *version > read_version && cleared.intersects(range))
    }

    /// Validates and applies one transaction's buffered work.
    pub(crate) fn commit(&self, tx_id: u64, read_version: u64, work: CommitSet) -> StrataResult<u64> {
        let _guard = self.commit_lock.lock();
        self.check_opened()?;

        if let Some(what) = self.find_conflict(read_version, &work) {
            log::debug!("Transaction {} conflicts on {}", tx_id, what);
            return Err(StrataError::new(
                &format!("Transaction conflict on {}", what),
                ErrorKind::TransactionConflict,
            ));
        }

        // versions are published before the batch lands so that concurrent
        // readers observing the new data also observe the newer version
        let version = self.version.load(Ordering::Acquire) + 1;
        for key in work.written_keys {
            self.versions.insert(key, version);
        }
        if !work.cleared_ranges.is_empty() {
            let mut cleared = self.cleared.lock();
            for range in work.cleared_ranges {
                cleared.push((range, version));
            }
        }
        self.version.store(version, Ordering::Release);

        self.store.apply(work.mutations)?;
        if self.config.is_sync_on_commit() {
            self.store.commit()?;
        }

        let commits = self.commits_since_prune.fetch_add(1, Ordering::Relaxed) + 1;
        if commits >= self.config.get_version_prune_interval() {
            self.commits_since_prune.store(0, Ordering::Relaxed);
            self.prune(version);
        }
        Ok(version)
    }

    fn find_conflict(&self, read_version: u64, work: &CommitSet) -> Option<String> {
        for key in &work.read_keys {
            if self.key_changed_since(key, read_version) {
                return Some(format!("key {:02x?} read by the transaction", key));
            }
        }
        for range in &work.read_ranges {
            if self.range_changed_since(range, read_version) {
                return Some(format!(
                    "range {:02x?}..{:02x?} scanned by the transaction",
                    range.begin(),
                    range.end()
                ));
            }
        }
        for key in &work.written_keys {
            if self.key_changed_since(key, read_version) {
                return Some(format!("key {:02x?} written by the transaction", key));
            }
        }
        for range in &work.cleared_ranges {
            if self.range_changed_since(range, read_version) {
                return Some(format!(
                    "range {:02x?}..{:02x?} cleared by the transaction",
                    range.begin(),
                    range.end()
                ));
            }
        }
        None
    }

    // Drops bookkeeping that no active transaction can conflict with.
    fn prune(&self, current: u64) {
        let horizon = self
            .active
            .iter()
            .map(|entry| *entry.value())
            .min()
            .unwrap_or(current);

        let stale: Vec<Vec<u8>> = self
            .versions
            .iter()
            .filter(|entry| *entry.value() <= horizon)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &stale {
            self.versions.remove(key);
        }

        let mut cleared = self.cleared.lock();
        cleared.retain(|(_, version)| *version > horizon);
        log::trace!(
            "Pruned {} key versions at or below version {}",
            stale.len(),
            horizon
        );
    }

    fn backoff(&self, attempt: usize) {
        let base = self.config.get_retry_backoff().as_millis() as u64;
        if base == 0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=base);
        let millis = base.saturating_mul(attempt as u64).saturating_add(jitter);
        std::thread::sleep(std::time::Duration::from_millis(millis));
    }
}

/// Buffered work of a transaction handed over at commit.
pub(crate) struct CommitSet {
    pub(crate) read_keys: Vec<Vec<u8>>,
    pub(crate) read_ranges: Vec<KeyRange>,
    pub(crate) written_keys: Vec<Vec<u8>>,
    pub(crate) cleared_ranges: Vec<KeyRange>,
    pub(crate) mutations: Vec<Mutation>,
}

impl CommitSet {
    pub(crate) fn from_parts(
        read_keys: impl IntoIterator<Item = Vec<u8>>,
        read_ranges: Vec<KeyRange>,
        writes: &BTreeMap<Vec<u8>, Option<Vec<u8>>>,
        cleared_ranges: Vec<KeyRange>,
        mutations: Vec<Mutation>,
    ) -> CommitSet {
        CommitSet {
            read_keys: read_keys.into_iter().collect(),
            read_ranges,
            written_keys: writes.keys().cloned().collect(),
            cleared_ranges,
            mutations,
        }
    }
}
