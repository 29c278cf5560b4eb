use crate::errors::{ErrorKind, StrataError, StrataResult};
use crate::store::memory::InMemoryStoreConfig;
use crate::store::{KeyRange, KeyValue, Mutation, StoreProvider};
use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordered in-memory key-value engine on a concurrent skip list.
///
/// # Characteristics
/// - **Thread-Safe**: clones share the same data
/// - **Atomic Batches**: a batch is applied under a write gate, so readers
///   never observe half of it
/// - **Volatile**: nothing survives the process; [`StoreProvider::commit`] is a no-op
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<InMemoryStoreInner>,
}

impl InMemoryStore {
    pub fn new(config: InMemoryStoreConfig) -> InMemoryStore {
        InMemoryStore {
            inner: Arc::new(InMemoryStoreInner::new(config)),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore::new(InMemoryStoreConfig::new())
    }
}

impl StoreProvider for InMemoryStore {
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
        self.inner.check_opened()
    }

    fn close(&self) -> StrataResult<()> {
        self.inner.closed.store(true, Ordering::Relaxed);
        log::debug!("Store {} closed", self.inner.config.store_name());
        Ok(())
    }

    fn store_name(&self) -> String {
        self.inner.config.store_name()
    }
}

struct InMemoryStoreInner {
    data: SkipMap<Vec<u8>, Vec<u8>>,
    gate: RwLock<()>,
    closed: AtomicBool,
    config: InMemoryStoreConfig,
}

impl InMemoryStoreInner {
    fn new(config: InMemoryStoreConfig) -> InMemoryStoreInner {
        InMemoryStoreInner {
            data: SkipMap::new(),
            gate: RwLock::new(()),
            closed: AtomicBool::new(false),
            config,
        }
    }

    fn open_or_create(&self) -> StrataResult<()> {
        self.closed.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn check_opened(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            log::error!("Store {} is closed", self.config.store_name());
            return Err(StrataError::new(
                &format!("Store {} is closed", self.config.store_name()),
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        self.check_opened()?;
        let _guard = self.gate.read();
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    fn scan(
        &self,
        range: &KeyRange,
        limit: Option<usize>,
        reverse: bool,
    ) -> StrataResult<Vec<KeyValue>> {
        self.check_opened()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(usize::MAX);
        let _guard = self.gate.read();
        let entries = self.data.range(range.to_bounds());
        let pairs = if reverse {
            entries
                .rev()
                .take(limit)
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        } else {
            entries
                .take(limit)
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        };
        Ok(pairs)
    }

    fn apply(&self, mutations: Vec<Mutation>) -> StrataResult<()> {
        self.check_opened()?;
        if self.config.is_read_only() {
            log::error!("Store {} is read-only", self.config.store_name());
            return Err(StrataError::new(
                &format!("Store {} is read-only", self.config.store_name()),
                ErrorKind::InvalidOperation,
            ));
        }

        let _guard = self.gate.write();
        for mutation in mutations {
            match mutation {
                Mutation::Set(key, value) => {
                    self.data.insert(key, value);
                }
                Mutation::Clear(key) => {
                    self.data.remove(&key);
                }
                Mutation::ClearRange(range) => {
                    if range.is_empty() {
                        continue;
                    }
                    let doomed: Vec<Vec<u8>> = self
                        .data
                        .range(range.to_bounds())
                        .map(|entry| entry.key().clone())
                        .collect();
                    for key in doomed {
                        self.data.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new(InMemoryStoreConfig::new());
        store.open_or_create().unwrap();
        store
    }

    fn set(key: &[u8], value: &[u8]) -> Mutation {
        Mutation::Set(key.to_vec(), value.to_vec())
    }

    #[test]
    fn apply_then_get() {
        let store = store();
        store
            .apply(vec![set(b"a", b"1"), set(b"b", b"2"), Mutation::Clear(b"a".to_vec())])
            .unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn scan_forward_reverse_and_limit() {
        let store = store();
        store
            .apply(vec![set(b"k1", b"1"), set(b"k2", b"2"), set(b"k3", b"3"), set(b"z", b"9")])
            .unwrap();
        let range = KeyRange::prefix(b"k");
        let forward = store.scan(&range, None, false).unwrap();
        assert_eq!(forward.len(), 3);
        assert_eq!(forward[0].0, b"k1".to_vec());

        let backward = store.scan(&range, Some(2), true).unwrap();
        assert_eq!(backward.len(), 2);
        assert_eq!(backward[0].0, b"k3".to_vec());
        assert_eq!(backward[1].0, b"k2".to_vec());
    }

    #[test]
    fn clear_range_removes_only_range() {
        let store = store();
        store
            .apply(vec![set(b"a1", b""), set(b"a2", b""), set(b"b1", b"")])
            .unwrap();
        store
            .apply(vec![Mutation::ClearRange(KeyRange::prefix(b"a"))])
            .unwrap();
        assert!(store.get(b"a1").unwrap().is_none());
        assert!(store.get(b"a2").unwrap().is_none());
        assert!(store.get(b"b1").unwrap().is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mutations_apply_in_order() {
        let store = store();
        store
            .apply(vec![
                set(b"a1", b"old"),
                Mutation::ClearRange(KeyRange::prefix(b"a")),
                set(b"a1", b"new"),
            ])
            .unwrap();
        assert_eq!(store.get(b"a1").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = store();
        store.close().unwrap();
        assert!(store.is_closed().unwrap());
        let err = store.get(b"a").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let store = InMemoryStore::new(InMemoryStoreConfig::new().read_only(true));
        let err = store.apply(vec![set(b"a", b"1")]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
