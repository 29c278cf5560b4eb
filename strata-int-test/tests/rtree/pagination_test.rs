use crate::rtree::common::*;
use std::collections::HashSet;
use strata::common::Tuple;
use strata_int_test::records::{RecordGenerator, EPOCH_MEAN};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_rtree::{field, Continuation, EvaluationContext, GroupRange, Predicate, RTreeError};

#[test]
fn test_continuation_paging() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let records = RecordGenerator::new(23).records_with_nulls(RECORD_COUNT, &CALENDARS);
            let predicate = Predicate::and(vec![
                field("calendar_name").in_values(vec!["business", "private"]),
                field("end_epoch").ge(EPOCH_MEAN),
            ]);

            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                save_records(&db, &options, &definitions, &records)?;
                let bounds = db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    Ok(index(&store, EVENT_INTERVALS).bind(&predicate, &EvaluationContext::empty())?)
                })?;

                let mut continuation: Option<Continuation> = None;
                let mut entries = Vec::new();
                loop {
                    // each page in its own transaction
                    let page = db.run(|tx| {
                        let store = open_store(tx, &options, definitions.clone())?;
                        Ok(index(&store, EVENT_INTERVALS).scan(
                            tx,
                            &bounds,
                            continuation.as_ref(),
                            Some(4),
                        )?)
                    })?;
                    let last = page.continuation.is_none();
                    entries.extend(page.results.iter().cloned());
                    match page.continuation {
                        Some(next) => {
                            assert_eq!(page.results.len(), 4);
                            assert_eq!(next.emitted()?, entries.len() as u64);
                            continuation = Some(Continuation::from_bytes(next.as_bytes())?);
                        }
                        None => assert!(page.results.len() <= 4),
                    }
                    if last {
                        break;
                    }
                }

                let keys: HashSet<_> = entries.iter().map(|e| e.primary_key.clone()).collect();
                assert_eq!(keys.len(), entries.len(), "duplicate results for {:?}", options);

                let (found, expected) =
                    read_both(&db, &options, &definitions, EVENT_INTERVALS, &bounds, &predicate)?;
                assert_eq!(found, expected);
                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    assert_eq!(store.fetch(tx, &entries)?, expected);
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_paging_while_records_change() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let records = RecordGenerator::new(41).records_with_nulls(150, &CALENDARS);
            let predicate = Predicate::and(vec![
                field("calendar_name").in_values(vec!["business", "private"]),
                field("end_epoch").ge(EPOCH_MEAN),
            ]);

            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                save_records(&db, &options, &definitions, &records)?;
                let (bounds, initial) = db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let bounds = index(&store, EVENT_INTERVALS)
                        .bind(&predicate, &EvaluationContext::empty())?;
                    let initial = store.filter(tx, &predicate, &EvaluationContext::empty())?;
                    Ok((bounds, initial))
                })?;
                assert!(initial.len() > 20);

                let mut returned: Vec<Tuple> = Vec::new();
                let mut deleted: HashSet<Tuple> = HashSet::new();
                let mut continuation: Option<Continuation> = None;
                let mut next_rec_no = 10_000i64;
                loop {
                    let page = db.run(|tx| {
                        let store = open_store(tx, &options, definitions.clone())?;
                        Ok(index(&store, EVENT_INTERVALS).scan(
                            tx,
                            &bounds,
                            continuation.as_ref(),
                            Some(5),
                        )?)
                    })?;
                    returned.extend(page.results.iter().map(|e| e.primary_key.clone()));
                    continuation = page.continuation;
                    if continuation.is_none() {
                        break;
                    }

                    // one record already returned, one still ahead, and new
                    // neighbours of the first returned record
                    let seen: HashSet<&Tuple> = returned.iter().collect();
                    let behind = page.results[page.results.len() - 1].primary_key.clone();
                    let ahead = initial
                        .iter()
                        .map(|r| r.primary_key())
                        .rev()
                        .find(|key| !seen.contains(key) && !deleted.contains(key));
                    let first = page.results[0].primary_key.clone();
                    db.run(|tx| {
                        let store = open_store(tx, &options, definitions.clone())?;
                        store.delete(tx, &behind)?;
                        if let Some(ahead) = &ahead {
                            store.delete(tx, ahead)?;
                        }
                        if next_rec_no < 10_040 {
                            if let Some(model) = store.load(tx, &first)? {
                                for i in 0..4 {
                                    let mut copy = model.clone();
                                    copy.rec_no = next_rec_no + i;
                                    store.save(tx, &copy)?;
                                }
                            }
                        }
                        Ok(())
                    })?;
                    deleted.insert(behind);
                    deleted.extend(ahead);
                    next_rec_no += 4;
                }

                let unique: HashSet<&Tuple> = returned.iter().collect();
                assert_eq!(unique.len(), returned.len(), "repeated results for {:?}", options);
                for record in &initial {
                    let key = record.primary_key();
                    assert!(
                        deleted.contains(&key) || unique.contains(&key),
                        "{:?} skipped {:?}",
                        options,
                        key
                    );
                }
                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_invalid_paging_requests() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let options = variants().remove(0);
            let definitions = event_intervals_definitions(&options)?;
            let records = RecordGenerator::new(29).records(20, &CALENDARS);
            save_records(&db, &options, &definitions, &records)?;

            db.run(|tx| {
                let store = open_store(tx, &options, definitions.clone())?;
                let index = index(&store, EVENT_INTERVALS);
                let bounds = index.bind(&overlap_predicate(), &EvaluationContext::empty())?;
                let err = index.scan(tx, &bounds, None, Some(0)).unwrap_err();
                assert!(matches!(err, RTreeError::Validation(_)));
                Ok(())
            })?;

            assert!(matches!(
                Continuation::from_bytes(&[0xff, 1, 2, 3]),
                Err(RTreeError::Validation(_))
            ));
            Ok(())
        },
        cleanup,
    )
}
