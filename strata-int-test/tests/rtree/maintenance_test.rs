use crate::rtree::common::*;
use strata::common::Value;
use strata::tuple;
use strata_int_test::records::{domain_event_intervals, event_intervals, RecordGenerator, EPOCH_MEAN};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_rtree::{
    field, EvaluationContext, GroupRange, MultidimensionalScanBounds, Predicate, ScanBounds,
};

#[test]
fn test_index_read_after_deletes() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                let mut generator = RecordGenerator::new(13);
                let records = generator.records_with_nulls(RECORD_COUNT, &CALENDARS);
                save_records(&db, &options, &definitions, &records)?;

                let deleted = generator.sample(RECORD_COUNT, 200);
                for chunk in deleted.chunks(50) {
                    db.run(|tx| {
                        let store = open_store(tx, &options, definitions.clone())?;
                        for rec_no in chunk {
                            assert!(store.delete(tx, &tuple![Value::Null, *rec_no])?);
                        }
                        Ok(())
                    })?;
                }

                assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &overlap_predicate())?;
                let everything = Predicate::and(vec![field("calendar_name").eq("private")]);
                assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &everything)?;

                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let stats = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                    assert_eq!(stats.entries, (RECORD_COUNT - 200) as u64);
                    assert_eq!(stats.groups, 2);
                    assert!(!store.delete(tx, &tuple![Value::Null, deleted[0]])?);
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_read_after_updates() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                let mut generator = RecordGenerator::new(17);
                let records = generator.records(RECORD_COUNT, &CALENDARS);
                save_records(&db, &options, &definitions, &records)?;

                // move some events into the other calendar and shift them
                let moved: Vec<_> = generator
                    .sample(RECORD_COUNT, 100)
                    .into_iter()
                    .map(|rec_no| {
                        let mut record = records[rec_no as usize].clone();
                        record.calendar_name = if record.calendar_name == "business" {
                            "private".to_string()
                        } else {
                            "business".to_string()
                        };
                        record.start_epoch = Some(generator.gaussian_probe(3600.0));
                        record.end_epoch = record.start_epoch.map(|s| s + 7200);
                        record
                    })
                    .collect();
                save_records(&db, &options, &definitions, &moved)?;

                assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &overlap_predicate())?;
                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let stats = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                    assert_eq!(stats.entries, RECORD_COUNT as u64);
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_where_null_domain() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = vec![
                    event_intervals(options.clone())?,
                    domain_event_intervals(options.clone())?,
                ];
                let mut records = RecordGenerator::new(19).records(200, &CALENDARS);
                for record in records.iter_mut().filter(|r| r.rec_no % 3 == 0) {
                    record.rec_domain = Some("acme".to_string());
                }
                save_records(&db, &options, &definitions, &records)?;

                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let by_domain = index(&store, "DomainEventIntervals");
                    let before = by_domain.validate(tx, &GroupRange::All)?;
                    assert_eq!(before.groups, 4);
                    assert_eq!(before.entries, 200);

                    by_domain.delete_where(tx, &GroupRange::Prefix(tuple![Value::Null]))?;

                    let after = by_domain.validate(tx, &GroupRange::All)?;
                    assert_eq!(after.groups, 2);
                    let acme = records.iter().filter(|r| r.rec_domain.is_some()).count();
                    assert_eq!(after.entries, acme as u64);

                    let bounds = MultidimensionalScanBounds::new(
                        GroupRange::All,
                        ScanBounds::all(2),
                    );
                    let remaining = by_domain.scan(tx, &bounds, None, None)?.results;
                    assert_eq!(remaining.len(), acme);
                    assert!(remaining.iter().all(|e| e.group[0] == Value::from("acme")));

                    // other indexes over the same records are untouched
                    let intervals = index(&store, EVENT_INTERVALS).validate(tx, &GroupRange::All)?;
                    assert_eq!(intervals.entries, 200);
                    Ok(())
                })?;

                let null_domain = Predicate::and(vec![
                    field("rec_domain").is_null(),
                    field("calendar_name").eq("business"),
                    field("start_epoch").le(EPOCH_MEAN),
                ]);
                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let by_domain = index(&store, "DomainEventIntervals");
                    let bounds = by_domain.bind(&null_domain, &EvaluationContext::empty())?;
                    assert!(by_domain.scan(tx, &bounds, None, None)?.results.is_empty());
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}
