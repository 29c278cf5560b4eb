use crate::config::FjallConfig;
use crate::error::{to_strata_error, FjallStoreError};
use fjall::{CompressionType, Keyspace, PartitionHandle, PersistMode};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use strata::errors::{ErrorKind, StrataError, StrataResult};
use strata::store::{KeyRange, KeyValue, Mutation, StoreProvider};

/// Fjall-based store implementation.
///
/// A persistent, thread-safe key-value engine on the Fjall LSM tree. All
/// keys live in one partition of one keyspace. Uses the PIMPL pattern with
/// `Arc<FjallStoreInner>` so clones share the engine.
///
/// Characteristics:
/// - Persistent (backed by Fjall on disk)
/// - Atomic batches (a mutation batch becomes one Fjall write batch)
/// - Lazy initialization (the keyspace is opened by `open_or_create`)
///
/// # Examples
///
/// ```rust,ignore
/// use strata::transaction::Database;
/// use strata_fjall_adapter::FjallStore;
///
/// let store = FjallStore::with_config()
///     .production_preset()
///     .db_path("/path/to/db")
///     .build()?;
/// let db = Database::builder().store(store).open()?;
/// ```
#[derive(Clone)]
pub struct FjallStore {
    inner: Arc<FjallStoreInner>,
}

impl FjallStore {
    /// Creates a store over `config`; the keyspace is opened later.
    #[inline]
    pub fn new(config: FjallConfig) -> FjallStore {
        FjallStore {
            inner: Arc::new(FjallStoreInner::new(config)),
        }
    }

    /// Starts a builder with default configuration.
    #[inline]
    pub fn with_config() -> FjallStoreBuilder {
        FjallStoreBuilder::new()
    }

    pub fn config(&self) -> FjallConfig {
        self.inner.config.clone()
    }
}

impl StoreProvider for FjallStore {
    fn open_or_create(&self) -> StrataResult<()> {
        self.inner.open_or_create()
    }

    fn is_closed(&self) -> StrataResult<bool> {
        Ok(self.inner.closed.load(Ordering::Relaxed))
    }

    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn scan(
        &self,
        range: &KeyRange,
        limit: Option<usize>,
        reverse: bool,
    ) -> StrataResult<Vec<KeyValue>> {
        self.inner.scan(range, limit, reverse)
    }

    fn apply(&self, mutations: Vec<Mutation>) -> StrataResult<()> {
        self.inner.apply(mutations)
    }

    fn commit(&self) -> StrataResult<()> {
        self.inner.commit()
    }

    fn close(&self) -> StrataResult<()> {
        self.inner.close()
    }

    fn store_name(&self) -> String {
        format!("fjall:{}", self.inner.config.db_path())
    }
}

struct FjallStoreInner {
    config: FjallConfig,
    keyspace: OnceLock<Keyspace>,
    partition: OnceLock<PartitionHandle>,
    closed: AtomicBool,
    // batches are applied under the write side so readers see all or nothing
    gate: RwLock<()>,
}

impl FjallStoreInner {
    fn new(config: FjallConfig) -> FjallStoreInner {
        FjallStoreInner {
            config,
            keyspace: OnceLock::new(),
            partition: OnceLock::new(),
            closed: AtomicBool::new(false),
            gate: RwLock::new(()),
        }
    }

    fn open_or_create(&self) -> StrataResult<()> {
        if self.config.db_path().is_empty() {
            return Err(FjallStoreError::MissingPath.into());
        }
        if self.partition.get().is_none() {
            let keyspace = match self.keyspace.get() {
                Some(keyspace) => keyspace.clone(),
                None => {
                    let keyspace = Keyspace::open(self.config.keyspace_config()).map_err(|err| {
                        log::error!("Failed to open or create keyspace: {}", err);
                        to_strata_error(err)
                    })?;
                    self.keyspace.get_or_init(|| keyspace).clone()
                }
            };
            let partition = keyspace
                .open_partition(&self.config.partition_name(), self.config.partition_config())
                .map_err(|err| {
                    log::error!(
                        "Failed to open partition {}: {}",
                        self.config.partition_name(),
                        err
                    );
                    to_strata_error(err)
                })?;
            self.partition.get_or_init(|| partition);
        }
        self.closed.store(false, Ordering::Relaxed);
        log::debug!("Fjall store opened at {}", self.config.db_path());
        Ok(())
    }

    fn partition(&self) -> StrataResult<&PartitionHandle> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(StrataError::new(
                &format!("Fjall store at {} is closed", self.config.db_path()),
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        self.partition
            .get()
            .ok_or_else(|| FjallStoreError::NotOpened.into())
    }

    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        let partition = self.partition()?;
        let _guard = self.gate.read();
        partition
            .get(key)
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(to_strata_error)
    }

    fn scan(
        &self,
        range: &KeyRange,
        limit: Option<usize>,
        reverse: bool,
    ) -> StrataResult<Vec<KeyValue>> {
        let partition = self.partition()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(usize::MAX);
        let _guard = self.gate.read();
        let entries = partition.range(range.to_bounds());
        let to_pair = |item: fjall::Result<(fjall::UserKey, fjall::UserValue)>| {
            item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(to_strata_error)
        };
        if reverse {
            entries.rev().take(limit).map(to_pair).collect()
        } else {
            entries.take(limit).map(to_pair).collect()
        }
    }

    fn apply(&self, mutations: Vec<Mutation>) -> StrataResult<()> {
        let partition = self.partition()?;
        let keyspace = self
            .keyspace
            .get()
            .ok_or_else(|| StrataError::from(FjallStoreError::NotOpened))?;

        let _guard = self.gate.write();
        // final state of every touched key, None for removed
        let mut writes: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for mutation in mutations {
            match mutation {
                Mutation::Set(key, value) => {
                    writes.insert(key, Some(value));
                }
                Mutation::Clear(key) => {
                    writes.insert(key, None);
                }
                Mutation::ClearRange(range) => {
                    if range.is_empty() {
                        continue;
                    }
                    for item in partition.range(range.to_bounds()) {
                        let (key, _) = item.map_err(to_strata_error)?;
                        writes.insert(key.to_vec(), None);
                    }
                    for (_, value) in writes.range_mut(range.to_bounds()) {
                        *value = None;
                    }
                }
            }
        }

        let mut batch = keyspace.batch();
        for (key, value) in writes {
            match value {
                Some(value) => batch.insert(partition, key, value),
                None => batch.remove(partition, key),
            }
        }
        batch.commit().map_err(|err| {
            log::error!("Failed to commit batch in Fjall store: {}", err);
            to_strata_error(err)
        })
    }

    fn commit(&self) -> StrataResult<()> {
        self.partition()?;
        match self.keyspace.get() {
            Some(keyspace) => keyspace.persist(PersistMode::SyncAll).map_err(|err| {
                log::error!("Failed to persist keyspace: {}", err);
                to_strata_error(err)
            }),
            None => Ok(()),
        }
    }

    fn close(&self) -> StrataResult<()> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        if self.config.commit_before_close() {
            if let Some(keyspace) = self.keyspace.get() {
                keyspace
                    .persist(PersistMode::SyncAll)
                    .map_err(to_strata_error)?;
            }
        }
        log::debug!("Fjall store at {} closed", self.config.db_path());
        Ok(())
    }
}

impl Drop for FjallStoreInner {
    fn drop(&mut self) {
        if let Some(keyspace) = self.keyspace.get() {
            if let Err(e) = keyspace.persist(PersistMode::SyncAll) {
                log::error!("Failed to persist keyspace on drop: {}", e);
            }
        }
    }
}

/// Builder for a [`FjallStore`].
///
/// Provides a fluent API over [`FjallConfig`] and presets for common
/// workloads.
pub struct FjallStoreBuilder {
    config: FjallConfig,
}

impl FjallStoreBuilder {
    #[inline]
    pub fn new() -> FjallStoreBuilder {
        FjallStoreBuilder {
            config: FjallConfig::new(),
        }
    }

    /// Balanced settings for production use.
    ///
    /// This configures:
    /// - 256 MB block cache and 64 MB blob cache
    /// - 128 MB write buffer
    /// - Bloom filter with 10 bits per key
    /// - 100ms fsync interval
    /// - LZ4 compression
    pub fn production_preset(self) -> Self {
        self.block_cache_capacity(256 * 1024 * 1024)
            .blob_cache_capacity(64 * 1024 * 1024)
            .max_write_buffer_size(128 * 1024 * 1024)
            .bloom_filter_bits(10)
            .fsync_frequency(100)
            .compression_type(CompressionType::Lz4)
    }

    /// Small caches and buffers for constrained environments and tests.
    pub fn low_memory_preset(self) -> Self {
        self.block_cache_capacity(8 * 1024 * 1024)
            .blob_cache_capacity(4 * 1024 * 1024)
            .max_write_buffer_size(16 * 1024 * 1024)
            .max_memtable_size(4 * 1024 * 1024)
            .flush_workers(1)
            .compaction_workers(1)
    }

    /// Sets the database directory. Required.
    pub fn db_path(self, path: &str) -> Self {
        self.config.set_db_path(path);
        self
    }

    pub fn partition_name(self, name: &str) -> Self {
        self.config.set_partition_name(name);
        self
    }

    pub fn manual_journal_persist(self, v: bool) -> Self {
        self.config.set_manual_journal_persist(v);
        self
    }

    pub fn flush_workers(self, count: usize) -> Self {
        self.config.set_flush_workers(count);
        self
    }

    pub fn compaction_workers(self, count: usize) -> Self {
        self.config.set_compaction_workers(count);
        self
    }

    pub fn block_cache_capacity(self, bytes: u64) -> Self {
        self.config.set_block_cache_capacity(bytes);
        self
    }

    pub fn blob_cache_capacity(self, bytes: u64) -> Self {
        self.config.set_blob_cache_capacity(bytes);
        self
    }

    pub fn max_journaling_size(self, bytes: u64) -> Self {
        self.config.set_max_journaling_size(bytes);
        self
    }

    pub fn max_write_buffer_size(self, bytes: u64) -> Self {
        self.config.set_max_write_buffer_size(bytes);
        self
    }

    pub fn fsync_frequency(self, millis: u16) -> Self {
        self.config.set_fsync_frequency(millis);
        self
    }

    pub fn commit_before_close(self, v: bool) -> Self {
        self.config.set_commit_before_close(v);
        self
    }

    pub fn bloom_filter_bits(self, bits: i8) -> Self {
        self.config.set_bloom_filter_bits(bits);
        self
    }

    pub fn compression_type(self, compression: CompressionType) -> Self {
        self.config.set_compression_type(compression);
        self
    }

    pub fn max_memtable_size(self, bytes: u32) -> Self {
        self.config.set_max_memtable_size(bytes);
        self
    }

    pub fn block_size(self, bytes: u32) -> Self {
        self.config.set_block_size(bytes);
        self
    }

    pub fn kv_separated(self, v: bool) -> Self {
        self.config.set_kv_separated(v);
        self
    }

    /// Validates the settings and creates the store.
    ///
    /// # Errors
    /// `ValidationError` if no path is set or the partition name has
    /// characters Fjall does not accept.
    pub fn build(self) -> StrataResult<FjallStore> {
        if self.config.db_path().is_empty() {
            return Err(FjallStoreError::MissingPath.into());
        }
        let name = self.config.partition_name();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-.#$".contains(c));
        if !valid {
            return Err(FjallStoreError::InvalidPartitionName(name).into());
        }
        Ok(FjallStore::new(self.config))
    }
}

impl Default for FjallStoreBuilder {
    fn default() -> Self {
        FjallStoreBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{cleanup, random_path};
    use strata::common::Subspace;
    use strata::transaction::Database;
    use strata::tuple;

    fn open(path: &str) -> FjallStore {
        let store = FjallStore::with_config()
            .low_memory_preset()
            .db_path(path)
            .build()
            .unwrap();
        store.open_or_create().unwrap();
        store
    }

    fn set(key: &[u8], value: &[u8]) -> Mutation {
        Mutation::Set(key.to_vec(), value.to_vec())
    }

    #[test]
    fn test_builder_validation() {
        assert!(FjallStore::with_config().build().is_err());
        let err = FjallStore::with_config()
            .db_path("/tmp/x")
            .partition_name("bad|name")
            .build()
            .err()
            .unwrap();
        assert_eq!(*err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_not_opened() {
        let store = FjallStore::with_config().db_path(&random_path()).build().unwrap();
        let err = store.get(b"a").err().unwrap();
        assert_eq!(*err.kind(), ErrorKind::StoreNotInitialized);
    }

    #[test]
    fn test_apply_and_scan() {
        let path = random_path();
        {
            let store = open(&path);
            store
                .apply(vec![
                    set(b"a", b"1"),
                    set(b"b", b"2"),
                    set(b"c", b"3"),
                    set(b"d", b"4"),
                    Mutation::Clear(b"b".to_vec()),
                ])
                .unwrap();
            assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
            assert_eq!(store.get(b"b").unwrap(), None);

            let all = store.scan(&KeyRange::all(), None, false).unwrap();
            let keys: Vec<&[u8]> = all.iter().map(|(k, _)| k.as_slice()).collect();
            assert_eq!(keys, vec![b"a".as_slice(), b"c", b"d"]);

            let last = store.scan(&KeyRange::all(), Some(1), true).unwrap();
            assert_eq!(last, vec![(b"d".to_vec(), b"4".to_vec())]);
            store.close().unwrap();
        }
        cleanup(&path);
    }

    #[test]
    fn test_clear_range_sees_earlier_writes_of_batch() {
        let path = random_path();
        {
            let store = open(&path);
            store.apply(vec![set(b"k1", b"x"), set(b"z", b"y")]).unwrap();
            store
                .apply(vec![
                    set(b"k2", b"x"),
                    Mutation::ClearRange(KeyRange::prefix(b"k")),
                    set(b"k3", b"x"),
                ])
                .unwrap();
            let all = store.scan(&KeyRange::all(), None, false).unwrap();
            let keys: Vec<Vec<u8>> = all.into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec![b"k3".to_vec(), b"z".to_vec()]);
            store.close().unwrap();
        }
        cleanup(&path);
    }

    #[test]
    fn test_closed_store_rejects_reads() {
        let path = random_path();
        {
            let store = open(&path);
            store.close().unwrap();
            assert!(store.is_closed().unwrap());
            let err = store.get(b"a").err().unwrap();
            assert_eq!(*err.kind(), ErrorKind::StoreAlreadyClosed);
        }
        cleanup(&path);
    }

    #[test]
    fn test_data_survives_reopen() {
        let path = random_path();
        let space = Subspace::from_tuple(&tuple!["users"]);
        {
            let db = Database::builder().store(open(&path)).open().unwrap();
            db.run(|tx| tx.set(&space.pack(&tuple![7i64]), b"alice"))
                .unwrap();
            db.close().unwrap();
        }
        {
            let db = Database::builder().store(open(&path)).open().unwrap();
            let tx = db.begin().unwrap();
            assert_eq!(
                tx.get(&space.pack(&tuple![7i64])).unwrap(),
                Some(b"alice".to_vec())
            );
            db.close().unwrap();
        }
        cleanup(&path);
    }
}
