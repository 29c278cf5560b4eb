#![cfg(feature = "fjall")]

use crate::rtree::common::*;
use strata_int_test::records::RecordGenerator;
use strata_int_test::test_util::{cleanup, create_test_context, reopen};
use strata_rtree::{GroupRange, IndexOptions, StorageVariant};

#[test]
fn test_index_survives_reopen() -> strata::errors::StrataResult<()> {
    // a single handle on the files, so the store can be reopened
    let mut ctx = create_test_context()?;
    let records = RecordGenerator::new(41).records_with_nulls(RECORD_COUNT, &CALENDARS);

    for options in variants() {
        let definitions = event_intervals_definitions(&options)?;
        save_records(&ctx.db(), &options, &definitions, &records)?;
    }

    ctx = reopen(ctx)?;
    let db = ctx.db();
    for options in variants() {
        let definitions = event_intervals_definitions(&options)?;
        assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &overlap_predicate())?;
        db.run(|tx| {
            let store = open_store(tx, &options, definitions.clone())?;
            let stats = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
            assert_eq!(stats.entries, RECORD_COUNT as u64);
            Ok(())
        })?;
    }

    // the persisted layout wins over a conflicting definition
    let stored = variants().remove(0);
    let other = IndexOptions::new().storage(StorageVariant::BySlot);
    let err = db
        .run(|tx| open_store(tx, &stored, event_intervals_definitions(&other)?).map(|_| ()))
        .unwrap_err();
    assert!(err.message().contains("rebuild"));

    cleanup(ctx)
}
