use strata::common::Subspace;
use strata::errors::StrataResult;
use strata::transaction::{Database, Transaction};
use strata::tuple;
use strata_int_test::records::{event_intervals, CalendarRecord, CalendarStore, EPOCH_MEAN};
use strata_rtree::{
    field, EvaluationContext, IndexDefinition, IndexOptions, MultidimensionalIndex,
    MultidimensionalScanBounds, Predicate, StorageVariant,
};

pub const CALENDARS: [&str; 2] = ["business", "private"];
pub const RECORD_COUNT: i64 = 500;
pub const EVENT_INTERVALS: &str = "EventIntervals";

/// Both layouts, with and without stored Hilbert values.
pub fn variants() -> Vec<IndexOptions> {
    let mut options = Vec::new();
    for storage in [StorageVariant::ByNode, StorageVariant::BySlot] {
        for store_hilbert_values in [true, false] {
            options.push(
                IndexOptions::new()
                    .storage(storage)
                    .store_hilbert_values(store_hilbert_values)
                    .fanout(4, 8),
            );
        }
    }
    options
}

pub fn root(options: &IndexOptions) -> Subspace {
    Subspace::from_tuple(&tuple![
        "calendar",
        options.get_storage().to_string(),
        options.is_store_hilbert_values()
    ])
}

pub fn open_store(
    tx: &Transaction,
    options: &IndexOptions,
    definitions: Vec<IndexDefinition>,
) -> StrataResult<CalendarStore> {
    Ok(CalendarStore::open(tx, &root(options), definitions)?)
}

pub fn index<'s>(store: &'s CalendarStore, name: &str) -> &'s MultidimensionalIndex {
    match store.index(name) {
        Some(index) => index,
        None => panic!("index {} is not registered", name),
    }
}

/// Saves the records in batches, each batch in its own transaction.
pub fn save_records(
    db: &Database,
    options: &IndexOptions,
    definitions: &[IndexDefinition],
    records: &[CalendarRecord],
) -> StrataResult<()> {
    for chunk in records.chunks(100) {
        db.run(|tx| {
            let store = open_store(tx, options, definitions.to_vec())?;
            store.save_all(tx, chunk)?;
            Ok(())
        })?;
    }
    Ok(())
}

/// Business events overlapping `[mean + 1h, mean + 5h]`.
pub fn overlap_predicate() -> Predicate {
    Predicate::and(vec![
        field("calendar_name").eq("business"),
        field("start_epoch").le(EPOCH_MEAN + 5 * 3600),
        field("end_epoch").ge(EPOCH_MEAN + 3600),
    ])
}

/// Runs the index scan and the brute-force filter, returning both sorted.
pub fn read_both(
    db: &Database,
    options: &IndexOptions,
    definitions: &[IndexDefinition],
    index_name: &str,
    bounds: &MultidimensionalScanBounds,
    predicate: &Predicate,
) -> StrataResult<(Vec<CalendarRecord>, Vec<CalendarRecord>)> {
    db.run(|tx| {
        let store = open_store(tx, options, definitions.to_vec())?;
        let index = index(&store, index_name);
        let page = index.scan(tx, bounds, None, None)?;
        assert!(page.continuation.is_none());
        let found = store.fetch(tx, &page.results)?;
        let expected = store.filter(tx, predicate, &EvaluationContext::empty())?;
        Ok((found, expected))
    })
}

/// Binds `predicate` on the named index and compares with brute force.
pub fn assert_index_read(
    db: &Database,
    options: &IndexOptions,
    definitions: &[IndexDefinition],
    index_name: &str,
    predicate: &Predicate,
) -> StrataResult<usize> {
    let bounds = db.run(|tx| {
        let store = open_store(tx, options, definitions.to_vec())?;
        Ok(index(&store, index_name).bind(predicate, &EvaluationContext::empty())?)
    })?;
    let (found, expected) = read_both(db, options, definitions, index_name, &bounds, predicate)?;
    assert_eq!(found, expected, "index read differs for {:?}", options);
    Ok(found.len())
}

pub fn event_intervals_definitions(options: &IndexOptions) -> StrataResult<Vec<IndexDefinition>> {
    Ok(vec![event_intervals(options.clone())?])
}
