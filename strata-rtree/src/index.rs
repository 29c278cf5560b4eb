//! The multidimensional index facade.
//!
//! [`MultidimensionalIndex`] ties an [`IndexDefinition`] to a subspace of
//! the store and exposes the operations the record layer calls: maintenance
//! on record changes, paginated scans, bulk deletes by group and
//! predicate binding. Every operation runs inside the caller's transaction.

use crate::bounds::ScanBounds;
use crate::codec::{to_coordinate, to_value, Coordinate};
use crate::continuation::Continuation;
use crate::definition::{DimensionDef, DimensionType, IndexDefinition};
use crate::options::IndexOptions;
use crate::predicate::{self, EvaluationContext, Predicate};
use crate::rtree::integrity::validate_group;
use crate::rtree::maintainer::{RTreeMaintainer, TreeParams};
use crate::rtree::rtree_types::StoredMeta;
use crate::rtree::storage::{HilbertSettings, RTreeStorage};
use crate::rtree::{IndexStats, LeafEntry, RTreeError, RTreeResult, FORMAT_VERSION};
use crate::scan_parameters::{GroupRange, IndexScanParameters, MultidimensionalScanBounds};
use crate::skip_scan::SkipScan;
use std::sync::Arc;
use strata::common::{pack, unpack, Subspace, Tuple, Value};
use strata::store::key_after;
use strata::transaction::Transaction;

/// The indexed part of a record: its group and its value dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub group: Tuple,
    pub dimensions: Vec<Value>,
}

impl IndexKey {
    pub fn new(group: Tuple, dimensions: Vec<Value>) -> Self {
        IndexKey { group, dimensions }
    }
}

/// One scan result. The dimension values are read from the index itself,
/// so a scan can be answered without fetching the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub group: Tuple,
    pub dimensions: Vec<Value>,
    pub primary_key: Tuple,
}

/// One page of a scan. `continuation` is `None` once the scan is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub results: Vec<IndexEntry>,
    pub continuation: Option<Continuation>,
}

/// A multidimensional (R-tree) index stored under a subspace.
///
/// Uses the Pimpl pattern for cheap cloning.
///
/// # Examples
///
/// ```rust,ignore
/// use strata_rtree::{IndexDefinition, DimensionType, MultidimensionalIndex, IndexKey};
///
/// let index = db.run(|tx| Ok(MultidimensionalIndex::open(tx, definition.clone(), &subspace)?))?;
/// db.run(|tx| {
///     let key = IndexKey::new(tuple!["business"], tuple![1690360647i64, 1690364247i64]);
///     index.maintain(tx, None, Some(&key), &tuple![Value::Null, 42i64])?;
///     Ok(())
/// })?;
/// ```
#[derive(Clone)]
pub struct MultidimensionalIndex {
    inner: Arc<IndexInner>,
}

struct IndexInner {
    definition: IndexDefinition,
    subspace: Subspace,
    storage: RTreeStorage,
    params: TreeParams,
}

fn stored_meta(definition: &IndexDefinition) -> StoredMeta {
    let options = definition.options();
    StoredMeta {
        format_version: FORMAT_VERSION,
        storage: options.get_storage(),
        store_hilbert_values: options.is_store_hilbert_values(),
        min_fanout: options.get_min_fanout() as u32,
        max_fanout: options.get_max_fanout() as u32,
        split_strategy: options.get_split_strategy(),
        bits_per_dimension: definition.bits_per_dimension(),
        dimensions: definition.dimensions() as u32,
    }
}

impl MultidimensionalIndex {
    /// Opens the index stored under `subspace`, creating its metadata on
    /// first use.
    ///
    /// # Arguments
    /// * `tx` - Transaction used to check and record the index metadata
    /// * `definition` - Structure and options of the index
    /// * `subspace` - Key prefix owned by the index
    ///
    /// # Returns
    /// The opened index.
    ///
    /// # Errors
    /// `InvalidOperation` if the index already holds data written with
    /// different layout options; such an index requires a rebuild.
    pub fn open(
        tx: &Transaction,
        definition: IndexDefinition,
        subspace: &Subspace,
    ) -> RTreeResult<MultidimensionalIndex> {
        let options = definition.options();
        let storage = RTreeStorage::new(
            subspace,
            options.get_storage(),
            HilbertSettings {
                store: options.is_store_hilbert_values(),
                bits: definition.bits_per_dimension(),
            },
            definition.dimensions(),
        );

        let expected = stored_meta(&definition);
        match storage.read_meta(tx)? {
            Some(meta) if meta == expected => {}
            Some(meta) if storage.has_data(tx)? => {
                log::error!(
                    "Index {} was written as {} and cannot be opened as {}",
                    definition.name(),
                    meta.storage,
                    expected.storage
                );
                return Err(RTreeError::InvalidOperation(format!(
                    "Index {} holds data written with different options ({:?}); it requires rebuild",
                    definition.name(),
                    meta
                )));
            }
            _ => {
                log::debug!(
                    "Recording options of index {}: {:?}",
                    definition.name(),
                    expected
                );
                storage.write_meta(tx, &expected)?;
            }
        }

        let params = TreeParams {
            min_fanout: options.get_min_fanout(),
            max_fanout: options.get_max_fanout(),
            split_strategy: options.get_split_strategy(),
            bits_per_dimension: definition.bits_per_dimension(),
        };
        Ok(MultidimensionalIndex {
            inner: Arc::new(IndexInner {
                definition,
                subspace: subspace.clone(),
                storage,
                params,
            }),
        })
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.inner.definition
    }

    pub fn subspace(&self) -> &Subspace {
        &self.inner.subspace
    }

    fn maintainer(&self) -> RTreeMaintainer<'_> {
        RTreeMaintainer::new(&self.inner.storage, self.inner.params)
    }

    /// Applies a record change to the index.
    ///
    /// `old` is the record's key before the change and `new` after it;
    /// `None` stands for "no record". An insert passes only `new`, a delete
    /// only `old`. An update removes the old entry and inserts the new one.
    ///
    /// # Errors
    /// `Validation` if a key does not have the index's shape or its values
    /// do not fit the declared dimension types.
    pub fn maintain(
        &self,
        tx: &Transaction,
        old: Option<&IndexKey>,
        new: Option<&IndexKey>,
        primary_key: &[Value],
    ) -> RTreeResult<()> {
        if old == new {
            return Ok(());
        }
        let primary_key = pack(primary_key);
        let maintainer = self.maintainer();
        if let Some(old) = old {
            let (group, point) = self.index_point(old)?;
            if !maintainer.delete(tx, &group, &point, &primary_key)? {
                log::debug!(
                    "Index {} holds no entry for {:?} in group {:?}",
                    self.definition().name(),
                    primary_key,
                    group
                );
            }
        }
        if let Some(new) = new {
            let (group, point) = self.index_point(new)?;
            maintainer.insert(tx, &group, point, primary_key)?;
        }
        Ok(())
    }

    /// Scans one page of results.
    ///
    /// # Arguments
    /// * `tx` - Transaction to read in
    /// * `bounds` - Groups and scan bounds to search
    /// * `continuation` - Where a previous page stopped, `None` to start
    /// * `row_limit` - Maximum number of results, `None` for all
    ///
    /// # Returns
    /// Up to `row_limit` results in scan order and a continuation if at
    /// least one more result exists. Only the last page can be short.
    pub fn scan(
        &self,
        tx: &Transaction,
        bounds: &MultidimensionalScanBounds,
        continuation: Option<&Continuation>,
        row_limit: Option<usize>,
    ) -> RTreeResult<ScanPage> {
        if row_limit == Some(0) {
            return Err(RTreeError::Validation(
                "Row limit must be positive".to_string(),
            ));
        }
        let mut cursor = self.scan_cursor(tx, bounds, continuation)?;
        let mut results = Vec::new();
        while row_limit.map_or(true, |limit| results.len() < limit) {
            match cursor.next() {
                Some(entry) => results.push(entry?),
                None => break,
            }
        }
        let continuation = match row_limit {
            Some(limit) if results.len() == limit => cursor.continuation()?,
            _ => None,
        };
        log::debug!(
            "Scan of index {} over {} returned {} results{}",
            self.definition().name(),
            bounds,
            results.len(),
            if continuation.is_some() { ", more to come" } else { "" }
        );
        Ok(ScanPage {
            results,
            continuation,
        })
    }

    /// Opens a lazy cursor over the scan results.
    pub fn scan_cursor<'a>(
        &'a self,
        tx: &'a Transaction,
        bounds: &'a MultidimensionalScanBounds,
        continuation: Option<&Continuation>,
    ) -> RTreeResult<IndexCursor<'a>> {
        self.check_bounds(&bounds.bounds)?;
        let storage = &self.inner.storage;
        let scan = match continuation {
            None => SkipScan::new(storage, &bounds.bounds, &bounds.group_range),
            Some(continuation) => SkipScan::resume(
                tx,
                storage,
                &bounds.bounds,
                &bounds.group_range,
                continuation.position()?,
            )?,
        };
        Ok(IndexCursor {
            index: self,
            tx,
            scan,
            done: false,
        })
    }

    /// Removes every entry of the groups in `groups` by dropping their trees.
    pub fn delete_where(&self, tx: &Transaction, groups: &GroupRange) -> RTreeResult<()> {
        for range in groups.key_ranges() {
            self.inner
                .storage
                .clear_groups(tx, range.begin(), range.end())?;
        }
        log::debug!(
            "Deleted groups {} of index {}",
            groups,
            self.definition().name()
        );
        Ok(())
    }

    /// Checks the structure of every tree in `groups`.
    ///
    /// # Errors
    /// `CorruptIndex` on the first violated invariant.
    pub fn validate(&self, tx: &Transaction, groups: &GroupRange) -> RTreeResult<IndexStats> {
        let storage = &self.inner.storage;
        let params = &self.inner.params;
        let mut stats = IndexStats::default();
        for range in groups.key_ranges() {
            let mut begin = range.begin().to_vec();
            while let Some((group, _)) = storage.next_root(tx, &begin, range.end())? {
                let group_stats = validate_group(
                    tx,
                    storage,
                    &group,
                    params.min_fanout,
                    params.max_fanout,
                    self.definition().dimensions(),
                )?;
                stats.groups += group_stats.groups;
                stats.nodes += group_stats.nodes;
                stats.entries += group_stats.entries;
                stats.height = stats.height.max(group_stats.height);
                begin = key_after(&group);
            }
        }
        Ok(stats)
    }

    /// Drops all index data and re-inserts `entries` under new options.
    ///
    /// This is the only way to change the layout options of an index that
    /// holds data.
    pub fn rebuild<I>(
        tx: &Transaction,
        definition: IndexDefinition,
        subspace: &Subspace,
        entries: I,
    ) -> RTreeResult<MultidimensionalIndex>
    where
        I: IntoIterator<Item = (IndexKey, Tuple)>,
    {
        tx.clear_range(&subspace.range())?;
        let index = MultidimensionalIndex::open(tx, definition, subspace)?;
        let mut count = 0u64;
        for (key, primary_key) in entries {
            index.maintain(tx, None, Some(&key), &primary_key)?;
            count += 1;
        }
        log::debug!(
            "Rebuilt index {} with {} entries as {}",
            index.definition().name(),
            count,
            index.definition().options().get_storage()
        );
        Ok(index)
    }

    /// Same as [`MultidimensionalIndex::rebuild`] keeping the structure of
    /// this index and switching to `options`.
    pub fn rebuild_with_options<I>(
        &self,
        tx: &Transaction,
        options: IndexOptions,
        entries: I,
    ) -> RTreeResult<MultidimensionalIndex>
    where
        I: IntoIterator<Item = (IndexKey, Tuple)>,
    {
        let definition = self.definition().with_options(options)?;
        MultidimensionalIndex::rebuild(tx, definition, self.subspace(), entries)
    }

    /// Translates a predicate over this index's dimensions into scan bounds.
    pub fn bind(
        &self,
        predicate: &Predicate,
        context: &EvaluationContext,
    ) -> RTreeResult<MultidimensionalScanBounds> {
        predicate::bind(self.definition(), predicate, context)
    }

    /// Binds plan parameters against this index.
    pub fn bind_parameters(
        &self,
        parameters: &IndexScanParameters,
        context: &EvaluationContext,
    ) -> RTreeResult<MultidimensionalScanBounds> {
        parameters.bind(self.definition(), context)
    }

    fn check_bounds(&self, bounds: &ScanBounds) -> RTreeResult<()> {
        let dims = self.definition().dimensions();
        if bounds.has_dimensions(dims) {
            Ok(())
        } else {
            Err(RTreeError::Validation(format!(
                "Scan bounds {} do not have {} dimensions",
                bounds, dims
            )))
        }
    }

    fn index_point(&self, key: &IndexKey) -> RTreeResult<(Vec<u8>, Vec<Coordinate>)> {
        let definition = self.definition();
        if key.group.len() != definition.group_dimensions().len()
            || key.dimensions.len() != definition.dimensions()
        {
            return Err(RTreeError::Validation(format!(
                "Index {} expects {} group and {} value dimensions, got {} and {}",
                definition.name(),
                definition.group_dimensions().len(),
                definition.dimensions(),
                key.group.len(),
                key.dimensions.len()
            )));
        }
        for (value, dim) in key.group.iter().zip(definition.group_dimensions()) {
            check_group_value(value, dim)?;
        }
        let point = key
            .dimensions
            .iter()
            .zip(definition.value_dimensions())
            .map(|(value, dim)| to_coordinate(value, dim.dimension_type))
            .collect::<RTreeResult<Vec<_>>>()?;
        Ok((pack(&key.group), point))
    }

    fn to_entry(&self, group: &[u8], entry: LeafEntry) -> RTreeResult<IndexEntry> {
        let dimensions = entry
            .point
            .iter()
            .zip(self.definition().value_dimensions())
            .map(|(c, dim)| to_value(*c, dim.dimension_type))
            .collect();
        Ok(IndexEntry {
            group: unpack(group)?,
            dimensions,
            primary_key: unpack(&entry.primary_key)?,
        })
    }
}

fn check_group_value(value: &Value, dim: &DimensionDef) -> RTreeResult<()> {
    let fits = matches!(
        (value, dim.dimension_type),
        (Value::Null, _)
            | (Value::Int(_), DimensionType::Int64)
            | (Value::Float(_), DimensionType::Float64)
            | (Value::String(_), DimensionType::String)
            | (Value::Bytes(_), DimensionType::Bytes)
            | (Value::Bool(_), DimensionType::Boolean)
    );
    if fits {
        Ok(())
    } else {
        Err(RTreeError::Validation(format!(
            "Value {} of type {} does not fit {} group dimension {}",
            value,
            value.type_name(),
            dim.dimension_type,
            dim.name
        )))
    }
}

/// Lazy iterator over scan results.
///
/// Dropping the cursor mid-scan has no side effects.
pub struct IndexCursor<'a> {
    index: &'a MultidimensionalIndex,
    tx: &'a Transaction,
    scan: SkipScan<'a>,
    done: bool,
}

impl IndexCursor<'_> {
    /// Token to resume after the last returned result, `None` if no further
    /// result exists.
    pub fn continuation(&mut self) -> RTreeResult<Option<Continuation>> {
        if self.done || !self.scan.has_more(self.tx)? {
            return Ok(None);
        }
        Continuation::new(&self.scan.position()).map(Some)
    }

    /// Number of results returned since the scan began, earlier pages included.
    pub fn emitted(&self) -> u64 {
        self.scan.emitted()
    }
}

impl Iterator for IndexCursor<'_> {
    type Item = RTreeResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scan.next(self.tx) {
            Ok(Some((group, entry))) => Some(self.index.to_entry(&group, entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
