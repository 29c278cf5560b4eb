use crate::rtree::common::*;
use std::thread;
use strata::errors::{ErrorKind, StrataError};
use strata_int_test::records::{CalendarRecord, RecordGenerator};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_rtree::{field, GroupRange, Predicate};

#[test]
fn test_conflicting_maintainers() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                let records = RecordGenerator::new(31).records(50, &["business"]);
                save_records(&db, &options, &definitions, &records)?;

                let first = CalendarRecord::new(1000, "business").epochs(Some(10), Some(20), None);
                let second = CalendarRecord::new(1001, "business").epochs(Some(15), Some(25), None);

                let tx1 = db.begin()?;
                let tx2 = db.begin()?;
                let store1 = open_store(&tx1, &options, definitions.clone())?;
                let store2 = open_store(&tx2, &options, definitions.clone())?;
                store1.save(&tx1, &first)?;
                store2.save(&tx2, &second)?;

                tx1.commit()?;
                let err = tx2.commit().unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::TransactionConflict);
                assert!(err.is_retryable());

                // the retry loop re-runs the whole maintenance
                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    store.save(tx, &second)?;
                    Ok(())
                })?;

                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let stats = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                    assert_eq!(stats.entries, 52);
                    Ok(())
                })?;
                let early = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    field("start_epoch").le(100i64),
                ]);
                assert_eq!(
                    assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &early)?,
                    2
                );
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_maintainers() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let options = variants().remove(0);
            let definitions = event_intervals_definitions(&options)?;
            let records = RecordGenerator::new(37).records(200, &CALENDARS);

            let handles: Vec<_> = records
                .chunks(50)
                .map(|chunk| {
                    let db = db.clone();
                    let options = options.clone();
                    let definitions = definitions.clone();
                    let chunk = chunk.to_vec();
                    thread::spawn(move || {
                        for record in &chunk {
                            db.run(|tx| {
                                let store = open_store(tx, &options, definitions.clone())?;
                                store.save(tx, record)?;
                                Ok(())
                            })?;
                        }
                        Ok::<(), StrataError>(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("maintainer thread panicked")?;
            }

            db.run(|tx| {
                let store = open_store(tx, &options, definitions.clone())?;
                let stats = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                assert_eq!(stats.entries, 200);
                assert_eq!(stats.groups, 2);
                Ok(())
            })?;
            assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &overlap_predicate())?;
            Ok(())
        },
        cleanup,
    )
}
