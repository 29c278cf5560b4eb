use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Represents the state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Transaction is actively receiving operations
    Active,
    /// Successfully committed all changes
    Committed,
    /// Transaction rolled back, explicitly or on drop
    Aborted,
    /// Commit was rejected (conflict) or the backend failed to apply it
    Failed,
}

/// Tuning knobs for [`Database`](super::Database) transactions.
///
/// # Characteristics
/// - **Lightweight Cloning**: clones share one `Arc` inner
/// - **Builder Style**: setters consume and return `self`
///
/// # Defaults
/// | setting | default |
/// |---------|---------|
/// | `max_retries` | 8 |
/// | `retry_backoff_ms` | 1 |
/// | `sync_on_commit` | false |
/// | `version_prune_interval` | 1024 commits |
#[derive(Clone, Default)]
pub struct TransactionConfig {
    inner: Arc<TransactionConfigInner>,
}

impl TransactionConfig {
    pub fn new() -> TransactionConfig {
        TransactionConfig {
            inner: Arc::new(TransactionConfigInner::new()),
        }
    }

    /// How many times [`Database::run`](super::Database::run) re-runs a
    /// closure that failed with a conflict.
    pub fn max_retries(self, retries: usize) -> Self {
        self.inner.max_retries.store(retries, Ordering::Relaxed);
        self
    }

    /// Base delay between retries. Each retry waits `attempt * base`
    /// plus a random jitter of up to `base`.
    pub fn retry_backoff_ms(self, millis: u64) -> Self {
        self.inner.retry_backoff_ms.store(millis, Ordering::Relaxed);
        self
    }

    /// Flush the store after every successful commit.
    pub fn sync_on_commit(self, sync: bool) -> Self {
        self.inner.sync_on_commit.store(sync, Ordering::Relaxed);
        self
    }

    /// Number of commits between two prunes of the commit-version table.
    pub fn version_prune_interval(self, commits: u64) -> Self {
        self.inner
            .version_prune_interval
            .store(commits.max(1), Ordering::Relaxed);
        self
    }

    pub fn get_max_retries(&self) -> usize {
        self.inner.max_retries.load(Ordering::Relaxed)
    }

    pub fn get_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.inner.retry_backoff_ms.load(Ordering::Relaxed))
    }

    pub fn is_sync_on_commit(&self) -> bool {
        self.inner.sync_on_commit.load(Ordering::Relaxed)
    }

    pub fn get_version_prune_interval(&self) -> u64 {
        self.inner.version_prune_interval.load(Ordering::Relaxed)
    }
}

struct TransactionConfigInner {
    max_retries: AtomicUsize,
    retry_backoff_ms: AtomicU64,
    sync_on_commit: AtomicBool,
    version_prune_interval: AtomicU64,
}

impl TransactionConfigInner {
    fn new() -> TransactionConfigInner {
        TransactionConfigInner {
            max_retries: AtomicUsize::new(8),
            retry_backoff_ms: AtomicU64::new(1),
            sync_on_commit: AtomicBool::new(false),
            version_prune_interval: AtomicU64::new(1024),
        }
    }
}

impl Default for TransactionConfigInner {
    fn default() -> Self {
        TransactionConfigInner::new()
    }
}
