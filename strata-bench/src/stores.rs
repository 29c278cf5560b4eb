//! Store factory functions for benchmarks

use crate::config::StoreType;
use crate::data_gen::IntervalEntry;
use std::path::PathBuf;
use strata::common::Subspace;
use strata::store::memory::InMemoryStore;
use strata::transaction::{Database, TransactionConfig};
use strata::tuple;
use strata_fjall_adapter::FjallStore;
use strata_rtree::{DimensionType, IndexDefinition, IndexOptions, MultidimensionalIndex};
use tempfile::TempDir;

/// Result type for store operations
pub type StoreResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Get the test-data directory path at the project root
fn get_test_data_dir() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(manifest_dir).join("..").join("test-data")
}

/// Context holding a database and the directory of its files
pub struct BenchContext {
    db: Database,
    // removed on drop, after the database is closed
    _dir: Option<TempDir>,
}

impl BenchContext {
    pub fn db(&self) -> &Database {
        &self.db
    }
}

impl Drop for BenchContext {
    fn drop(&mut self) {
        if let Err(e) = self.db.close() {
            log::warn!("Failed to close benchmark database: {}", e);
        }
    }
}

fn transaction_config() -> TransactionConfig {
    TransactionConfig::new().max_retries(50).retry_backoff_ms(1)
}

/// Routes `log` output to stderr, filtered by `RUST_LOG`
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create an in-memory database
pub fn create_inmemory_db() -> StoreResult<BenchContext> {
    let db = Database::builder()
        .store(InMemoryStore::default())
        .config(transaction_config())
        .open()?;
    Ok(BenchContext { db, _dir: None })
}

/// Create a Fjall-backed database
pub fn create_fjall_db() -> StoreResult<BenchContext> {
    let test_data_dir = get_test_data_dir();
    std::fs::create_dir_all(&test_data_dir)?;
    let dir = tempfile::Builder::new()
        .prefix("bench_")
        .tempdir_in(&test_data_dir)?;

    let store = FjallStore::with_config()
        .db_path(&dir.path().to_string_lossy())
        .build()?;
    let db = Database::builder()
        .store(store)
        .config(transaction_config())
        .open()?;

    Ok(BenchContext {
        db,
        _dir: Some(dir),
    })
}

pub fn create_db(store_type: StoreType) -> StoreResult<BenchContext> {
    init_logging();
    match store_type {
        StoreType::InMemory => create_inmemory_db(),
        StoreType::Fjall => create_fjall_db(),
    }
}

/// The interval index every benchmark uses
pub fn interval_definition(options: &IndexOptions) -> StoreResult<IndexDefinition> {
    Ok(IndexDefinition::builder("Intervals")
        .group("calendar_name", DimensionType::String)
        .dimension("start_epoch", DimensionType::Int64)
        .dimension("end_epoch", DimensionType::Int64)
        .options(options.clone())
        .build()?)
}

pub fn index_subspace() -> Subspace {
    Subspace::from_tuple(&tuple!["bench", "intervals"])
}

/// Inserts the entries in batches, one transaction per batch
pub fn load_index(
    ctx: &BenchContext,
    options: &IndexOptions,
    entries: &[IntervalEntry],
    batch_size: usize,
) -> StoreResult<MultidimensionalIndex> {
    let definition = interval_definition(options)?;
    let subspace = index_subspace();
    let index = ctx
        .db()
        .run(|tx| Ok(MultidimensionalIndex::open(tx, definition.clone(), &subspace)?))?;
    for batch in entries.chunks(batch_size.max(1)) {
        ctx.db().run(|tx| {
            for entry in batch {
                index.maintain(tx, None, Some(&entry.key), &entry.primary_key)?;
            }
            Ok(())
        })?;
    }
    Ok(index)
}
