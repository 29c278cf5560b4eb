use fjall::{CompressionType, Config, KvSeparationOptions, PartitionCreateOptions};
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use strata::common::{atomic, Atomic, ReadExecutor, WriteExecutor};

/// Fjall engine configuration.
///
/// A cloneable, thread-safe holder for the keyspace and partition tuning
/// parameters. Clones share one `Arc` inner, and every parameter is an
/// atomic so the config can be read from any thread without locking.
///
/// Usage: create through [`FjallStore::with_config`](crate::FjallStore::with_config),
/// which validates the settings before the store is built.
#[derive(Clone)]
pub struct FjallConfig {
    inner: Arc<FjallConfigInner>,
}

impl FjallConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - Block cache: 64 MB
    /// - Blob cache: 32 MB
    /// - Write buffer: 128 MB
    /// - Max journaling size: 512 MB
    /// - Bloom filter: 10 bits per key
    /// - Compression: LZ4
    /// - Flush workers: number of available CPU cores
    /// - Compaction workers: half of available CPU cores
    #[inline]
    pub fn new() -> FjallConfig {
        FjallConfig {
            inner: Arc::new(FjallConfigInner::new()),
        }
    }

    /// Translates the settings into Fjall's keyspace config.
    pub(crate) fn keyspace_config(&self) -> Config {
        let mut config = Config::new(self.db_path());
        config = config
            .manual_journal_persist(self.manual_journal_persist())
            .flush_workers(self.flush_workers())
            .compaction_workers(self.compaction_workers())
            .cache_size(self.block_cache_capacity() + self.blob_cache_capacity())
            .max_journaling_size(self.max_journaling_size())
            .max_write_buffer_size(self.max_write_buffer_size());

        if self.fsync_frequency() > 0 {
            config = config.fsync_ms(Some(self.fsync_frequency()));
        }
        config
    }

    /// Translates the settings into Fjall's partition options.
    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        let mut config = PartitionCreateOptions::default();
        config = config
            .bloom_filter_bits(if self.bloom_filter_bits() < 0 {
                None
            } else {
                Some(self.bloom_filter_bits() as u8)
            })
            .compression(self.compression_type())
            .max_memtable_size(self.max_memtable_size())
            .block_size(self.block_size());

        if self.kv_separated() {
            config = config.with_kv_separation(KvSeparationOptions::default());
        }
        config
    }

    #[inline]
    pub fn db_path(&self) -> &str {
        self.inner.db_path.get().map(String::as_str).unwrap_or("")
    }

    /// The path can be set only once.
    #[inline]
    pub(crate) fn set_db_path(&self, db_path: &str) {
        self.inner.db_path.get_or_init(|| db_path.to_string());
    }

    /// Name of the partition holding all keys of the store.
    #[inline]
    pub fn partition_name(&self) -> String {
        self.inner.partition_name.read_with(|it| it.clone())
    }

    #[inline]
    pub(crate) fn set_partition_name(&self, name: &str) {
        self.inner.partition_name.write_with(|it| *it = name.to_string());
    }

    #[inline]
    pub fn manual_journal_persist(&self) -> bool {
        self.inner.manual_journal_persist.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_manual_journal_persist(&self, v: bool) {
        self.inner.manual_journal_persist.store(v, Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_workers(&self) -> usize {
        self.inner.flush_workers.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_flush_workers(&self, c: usize) {
        self.inner.flush_workers.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn compaction_workers(&self) -> usize {
        self.inner.compaction_workers.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_compaction_workers(&self, c: usize) {
        self.inner.compaction_workers.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn block_cache_capacity(&self) -> u64 {
        self.inner.block_cache_capacity.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_block_cache_capacity(&self, c: u64) {
        self.inner.block_cache_capacity.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn blob_cache_capacity(&self) -> u64 {
        self.inner.blob_cache_capacity.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_blob_cache_capacity(&self, c: u64) {
        self.inner.blob_cache_capacity.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn max_journaling_size(&self) -> u64 {
        self.inner.max_journaling_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_journaling_size(&self, s: u64) {
        self.inner.max_journaling_size.store(s, Ordering::Relaxed)
    }

    #[inline]
    pub fn max_write_buffer_size(&self) -> u64 {
        self.inner.max_write_buffer_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_write_buffer_size(&self, s: u64) {
        self.inner.max_write_buffer_size.store(s, Ordering::Relaxed)
    }

    /// Background fsync interval in milliseconds, 0 to disable.
    #[inline]
    pub fn fsync_frequency(&self) -> u16 {
        self.inner.fsync_frequency.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_fsync_frequency(&self, f: u16) {
        self.inner.fsync_frequency.store(f, Ordering::Relaxed)
    }

    /// Whether [`close`](strata::store::StoreProvider::close) persists the journal first.
    #[inline]
    pub fn commit_before_close(&self) -> bool {
        self.inner.commit_before_close.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_commit_before_close(&self, v: bool) {
        self.inner.commit_before_close.store(v, Ordering::Relaxed)
    }

    /// Bloom filter bits per key, negative to disable.
    #[inline]
    pub fn bloom_filter_bits(&self) -> i8 {
        self.inner.bloom_filter_bits.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_bloom_filter_bits(&self, b: i8) {
        self.inner.bloom_filter_bits.store(b, Ordering::Relaxed)
    }

    #[inline]
    pub fn compression_type(&self) -> CompressionType {
        self.inner.compression_type.read_with(|it| *it)
    }

    #[inline]
    pub(crate) fn set_compression_type(&self, ct: CompressionType) {
        self.inner.compression_type.write_with(|it| *it = ct)
    }

    #[inline]
    pub fn max_memtable_size(&self) -> u32 {
        self.inner.max_memtable_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_memtable_size(&self, s: u32) {
        self.inner.max_memtable_size.store(s, Ordering::Relaxed)
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.inner.block_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_block_size(&self, s: u32) {
        self.inner.block_size.store(s, Ordering::Relaxed)
    }

    /// Whether large values are stored apart from the LSM tree.
    #[inline]
    pub fn kv_separated(&self) -> bool {
        self.inner.kv_separated.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_kv_separated(&self, v: bool) {
        self.inner.kv_separated.store(v, Ordering::Relaxed)
    }
}

impl Default for FjallConfig {
    fn default() -> Self {
        FjallConfig::new()
    }
}

struct FjallConfigInner {
    db_path: OnceLock<String>,
    partition_name: Atomic<String>,
    manual_journal_persist: AtomicBool,
    flush_workers: AtomicUsize,
    compaction_workers: AtomicUsize,
    block_cache_capacity: AtomicU64,
    blob_cache_capacity: AtomicU64,
    max_journaling_size: AtomicU64,
    max_write_buffer_size: AtomicU64,
    fsync_frequency: AtomicU16,
    commit_before_close: AtomicBool,

    bloom_filter_bits: AtomicI8,
    compression_type: Atomic<CompressionType>,
    max_memtable_size: AtomicU32,
    block_size: AtomicU32,
    kv_separated: AtomicBool,
}

impl FjallConfigInner {
    const DEFAULT_BLOCK_CACHE_MB: u64 = 64;
    const DEFAULT_BLOB_CACHE_MB: u64 = 32;
    const DEFAULT_WRITE_BUFFER_MB: u64 = 128;
    const DEFAULT_MAX_JOURNALING_MB: u64 = 512;
    const DEFAULT_MEMTABLE_MB: u32 = 32;

    fn new() -> FjallConfigInner {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        FjallConfigInner {
            db_path: OnceLock::new(),
            partition_name: atomic("strata".to_string()),
            manual_journal_persist: AtomicBool::new(false),
            flush_workers: AtomicUsize::new(cpus.max(1)),
            compaction_workers: AtomicUsize::new((cpus / 2).max(1)),
            block_cache_capacity: AtomicU64::new(Self::DEFAULT_BLOCK_CACHE_MB * 1_024 * 1_024),
            blob_cache_capacity: AtomicU64::new(Self::DEFAULT_BLOB_CACHE_MB * 1_024 * 1_024),
            max_journaling_size: AtomicU64::new(Self::DEFAULT_MAX_JOURNALING_MB * 1_024 * 1_024),
            max_write_buffer_size: AtomicU64::new(Self::DEFAULT_WRITE_BUFFER_MB * 1_024 * 1_024),
            fsync_frequency: AtomicU16::new(0),
            commit_before_close: AtomicBool::new(true),
            bloom_filter_bits: AtomicI8::new(10),
            compression_type: atomic(CompressionType::Lz4),
            max_memtable_size: AtomicU32::new(Self::DEFAULT_MEMTABLE_MB * 1_024 * 1_024),
            block_size: AtomicU32::new(4 * 1_024),
            kv_separated: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FjallConfig::new();
        assert_eq!(config.db_path(), "");
        assert_eq!(config.partition_name(), "strata");
        assert!(config.flush_workers() >= 1);
        assert!(config.compaction_workers() >= 1);
        assert_eq!(config.block_cache_capacity(), 64 * 1024 * 1024);
        assert_eq!(config.bloom_filter_bits(), 10);
        assert_eq!(config.compression_type(), CompressionType::Lz4);
        assert!(config.commit_before_close());
        assert!(!config.kv_separated());
    }

    #[test]
    fn test_db_path_is_set_once() {
        let config = FjallConfig::new();
        config.set_db_path("/tmp/first");
        config.set_db_path("/tmp/second");
        assert_eq!(config.db_path(), "/tmp/first");
    }

    #[test]
    fn test_clones_share_settings() {
        let config = FjallConfig::new();
        let clone = config.clone();
        clone.set_bloom_filter_bits(-1);
        clone.set_partition_name("events");
        assert_eq!(config.bloom_filter_bits(), -1);
        assert_eq!(config.partition_name(), "events");
    }
}
