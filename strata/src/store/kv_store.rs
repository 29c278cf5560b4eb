use crate::errors::StrataResult;
use crate::store::KeyRange;
use std::ops::Deref;
use std::sync::Arc;

/// A key together with its value, as returned by range scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A single write buffered by a transaction and applied at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(KeyRange),
}

/// Contract implemented by ordered key-value engines.
///
/// A provider stores raw byte keys in lexicographic order. It knows nothing
/// about transactions: isolation and conflict detection are layered on top
/// by [`Database`](crate::transaction::Database), which funnels all writes
/// through [`StoreProvider::apply`].
///
/// # Responsibilities
///
/// * **Lifecycle**: opening and closing the underlying engine
/// * **Reads**: point lookups and ordered range scans
/// * **Writes**: applying a batch of mutations atomically and in order
/// * **Durability**: flushing committed batches on [`StoreProvider::commit`]
pub trait StoreProvider: Send + Sync {
    /// Opens the underlying engine, creating it if needed.
    fn open_or_create(&self) -> StrataResult<()>;

    fn is_closed(&self) -> StrataResult<bool>;

    /// Point lookup.
    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>>;

    /// Returns up to `limit` pairs in `range`, ascending unless `reverse`.
    fn scan(
        &self,
        range: &KeyRange,
        limit: Option<usize>,
        reverse: bool,
    ) -> StrataResult<Vec<KeyValue>>;

    /// Applies all mutations atomically, in the order given.
    fn apply(&self, mutations: Vec<Mutation>) -> StrataResult<()>;

    /// Makes previously applied batches durable.
    fn commit(&self) -> StrataResult<()>;

    fn close(&self) -> StrataResult<()>;

    /// Human readable name of the engine, used in log messages.
    fn store_name(&self) -> String;
}

/// Shared handle to a [`StoreProvider`].
///
/// Cloning is cheap; all clones talk to the same engine.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<dyn StoreProvider>,
}

impl KvStore {
    /// Wraps a concrete provider.
    ///
    /// # Arguments
    /// * `inner` - The engine implementation
    pub fn new<T: StoreProvider + 'static>(inner: T) -> Self {
        KvStore {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for KvStore {
    type Target = Arc<dyn StoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
