use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for an [`InMemoryStore`](super::InMemoryStore).
///
/// # Characteristics
/// - **Lightweight Cloning**: clones share one `Arc` inner
/// - **Builder Style**: setters consume and return `self`
///
/// # Usage
/// ```text
/// let config = InMemoryStoreConfig::new().name("scratch");
/// let store = InMemoryStore::new(config);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStoreConfig {
    inner: Arc<InMemoryStoreConfigInner>,
}

impl InMemoryStoreConfig {
    pub fn new() -> InMemoryStoreConfig {
        InMemoryStoreConfig {
            inner: Arc::new(InMemoryStoreConfigInner::new()),
        }
    }

    /// Sets the name reported in log messages.
    pub fn name(self, name: &str) -> Self {
        self.inner.name.write_with(|it| *it = name.to_string());
        self
    }

    /// Rejects every write when set.
    pub fn read_only(self, read_only: bool) -> Self {
        self.inner.read_only.store(read_only, Ordering::Relaxed);
        self
    }

    pub fn store_name(&self) -> String {
        self.inner.name.read_with(|it| it.clone())
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.load(Ordering::Relaxed)
    }
}

struct InMemoryStoreConfigInner {
    name: Atomic<String>,
    read_only: AtomicBool,
}

impl InMemoryStoreConfigInner {
    fn new() -> InMemoryStoreConfigInner {
        InMemoryStoreConfigInner {
            name: atomic("memory".to_string()),
            read_only: AtomicBool::new(false),
        }
    }
}

impl Default for InMemoryStoreConfigInner {
    fn default() -> Self {
        InMemoryStoreConfigInner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InMemoryStoreConfig::new();
        assert_eq!(config.store_name(), "memory");
        assert!(!config.is_read_only());
    }

    #[test]
    fn builder_setters_are_shared_by_clones() {
        let config = InMemoryStoreConfig::new().name("scratch").read_only(true);
        let clone = config.clone();
        assert_eq!(clone.store_name(), "scratch");
        assert!(clone.is_read_only());
    }
}
