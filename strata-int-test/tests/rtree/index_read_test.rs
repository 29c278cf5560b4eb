use crate::rtree::common::*;
use strata::common::Value;
use strata::tuple;
use strata_int_test::records::{
    event_intervals, event_intervals_with_expiration, RecordGenerator, EPOCH_MEAN,
};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_rtree::{
    field, DimensionType, EvaluationContext, GroupRange, IndexDefinition, IndexOptions,
    IndexScanParameters, Predicate, RTreeError, ScanBounds,
};

#[test]
fn test_index_read() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                let records = RecordGenerator::new(0).records(RECORD_COUNT, &CALENDARS);
                save_records(&db, &options, &definitions, &records)?;

                let found = assert_index_read(
                    &db,
                    &options,
                    &definitions,
                    EVENT_INTERVALS,
                    &overlap_predicate(),
                )?;
                assert!(found > 0, "no overlapping events for {:?}", options);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_read_with_nulls() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                let records = RecordGenerator::new(0).records_with_nulls(RECORD_COUNT, &CALENDARS);
                assert!(records.iter().any(|r| r.start_epoch.is_none()));
                save_records(&db, &options, &definitions, &records)?;

                // a hypercube whose start has no low end admits absent starts
                let parameters = IndexScanParameters::hypercube(
                    tuple!["business"],
                    vec![None, Some(Value::from(EPOCH_MEAN + 3600))],
                    vec![Some(Value::from(EPOCH_MEAN + 5 * 3600)), None],
                );
                let with_null_starts = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    Predicate::or(vec![
                        field("start_epoch").is_null(),
                        field("start_epoch").le(EPOCH_MEAN + 5 * 3600),
                    ]),
                    field("end_epoch").ge(EPOCH_MEAN + 3600),
                ]);
                let bounds = db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    Ok(index(&store, EVENT_INTERVALS)
                        .bind_parameters(&parameters, &EvaluationContext::empty())?)
                })?;
                let (found, expected) = read_both(
                    &db,
                    &options,
                    &definitions,
                    EVENT_INTERVALS,
                    &bounds,
                    &with_null_starts,
                )?;
                assert_eq!(found, expected);
                assert!(found.iter().any(|r| r.start_epoch.is_none()));

                // comparisons never match absent values
                assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &overlap_predicate())?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_in_probes() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let mut generator = RecordGenerator::new(3);
            let records = generator.records(RECORD_COUNT, &CALENDARS);
            let probes: Vec<i64> = generator
                .sample(RECORD_COUNT, 40)
                .into_iter()
                .filter_map(|rec_no| records[rec_no as usize].start_epoch)
                .collect();

            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                save_records(&db, &options, &definitions, &records)?;

                let predicate = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    field("start_epoch").in_values(probes.clone()),
                    field("end_epoch").ge(1690476099i64),
                ]);
                let bounds = db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    Ok(index(&store, EVENT_INTERVALS).bind(&predicate, &EvaluationContext::empty())?)
                })?;
                assert!(
                    matches!(&bounds.bounds, ScanBounds::And(parts) if parts.iter().any(|p| matches!(p, ScanBounds::Or(_)))),
                    "unexpected bounds {}",
                    bounds.bounds
                );
                let (found, expected) =
                    read_both(&db, &options, &definitions, EVENT_INTERVALS, &bounds, &predicate)?;
                assert_eq!(found, expected);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_skip_scan_over_groups() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let calendars = ["business", "holidays", "private", "vacation"];
            let records = RecordGenerator::new(5).records(RECORD_COUNT, &calendars);

            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                save_records(&db, &options, &definitions, &records)?;

                let between = Predicate::and(vec![
                    field("calendar_name").between("business", "private"),
                    field("start_epoch").le(EPOCH_MEAN + 5 * 3600),
                    field("end_epoch").ge(EPOCH_MEAN + 3600),
                ]);
                let found =
                    assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &between)?;
                assert!(found > 0);

                let probes = Predicate::and(vec![
                    field("calendar_name").in_values(vec!["business", "vacation", "unknown"]),
                    field("end_epoch").ge(EPOCH_MEAN),
                ]);
                assert_index_read(&db, &options, &definitions, EVENT_INTERVALS, &probes)?;

                let bounds = db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    Ok(index(&store, EVENT_INTERVALS).bind(&between, &EvaluationContext::empty())?)
                })?;
                assert_eq!(
                    bounds.group_range,
                    GroupRange::between_inclusive(Some(tuple!["business"]), Some(tuple!["private"]))
                );
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_covering_scan() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let records = RecordGenerator::new(7).records_with_nulls(RECORD_COUNT, &CALENDARS);
            let low_end = EPOCH_MEAN + 3600;
            let high_start = EPOCH_MEAN + 5 * 3600;

            for options in variants() {
                let definitions = event_intervals_definitions(&options)?;
                save_records(&db, &options, &definitions, &records)?;

                db.run(|tx| {
                    let store = open_store(tx, &options, definitions.clone())?;
                    let index = index(&store, EVENT_INTERVALS);
                    let bounds = index.bind(&overlap_predicate(), &EvaluationContext::empty())?;
                    let entries = index.scan(tx, &bounds, None, None)?.results;
                    assert!(!entries.is_empty());
                    for entry in &entries {
                        assert_eq!(entry.group, tuple!["business"]);
                        match entry.dimensions.as_slice() {
                            [Value::Int(start), Value::Int(end)] => {
                                assert!(*start <= high_start);
                                assert!(*end >= low_end);
                            }
                            other => panic!("unexpected dimensions {:?}", other),
                        }
                        let record = store.load(tx, &entry.primary_key)?;
                        let record = record.expect("entry without record");
                        assert_eq!(
                            entry.dimensions,
                            vec![record.field("start_epoch"), record.field("end_epoch")]
                        );
                    }
                    Ok(())
                })?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_three_dimensional_index() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let records = RecordGenerator::new(11).records_with_nulls(RECORD_COUNT, &CALENDARS);

            for options in variants() {
                let definitions = vec![
                    event_intervals(options.clone())?,
                    event_intervals_with_expiration(options.clone())?,
                ];
                save_records(&db, &options, &definitions, &records)?;

                let predicate = Predicate::and(vec![
                    field("calendar_name").eq("private"),
                    field("start_epoch").le(EPOCH_MEAN + 2 * 86400),
                    field("end_epoch").ge(EPOCH_MEAN - 86400),
                    field("expiration_epoch").between(
                        EPOCH_MEAN + 30 * 86400,
                        EPOCH_MEAN + 32 * 86400,
                    ),
                ]);
                let found = assert_index_read(
                    &db,
                    &options,
                    &definitions,
                    "EventIntervalsWithExpiration",
                    &predicate,
                )?;
                assert!(found > 0);

                let expiring_or_open = Predicate::and(vec![
                    field("calendar_name").eq("private"),
                    Predicate::or(vec![
                        field("expiration_epoch").is_null(),
                        field("expiration_epoch").lt(EPOCH_MEAN + 31 * 86400),
                    ]),
                ]);
                assert_index_read(
                    &db,
                    &options,
                    &definitions,
                    "EventIntervalsWithExpiration",
                    &expiring_or_open,
                )?;
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_wrong_dimension_types() {
    let err = IndexDefinition::builder("ByName")
        .group("calendar_name", DimensionType::String)
        .dimension("start_epoch", DimensionType::Int64)
        .dimension("title", DimensionType::String)
        .build()
        .unwrap_err();
    assert!(matches!(err, RTreeError::InvalidDimensionType(_)));

    let err = IndexDefinition::builder("ByFlag")
        .dimension("flag", DimensionType::Boolean)
        .build()
        .unwrap_err();
    assert!(matches!(err, RTreeError::InvalidDimensionType(_)));

    let definition = event_intervals(IndexOptions::new()).unwrap();
    let predicate = Predicate::and(vec![
        field("calendar_name").eq("business"),
        field("start_epoch").le("tomorrow"),
    ]);
    let err = strata_rtree::predicate::bind(&definition, &predicate, &EvaluationContext::empty())
        .unwrap_err();
    assert!(matches!(err, RTreeError::InvalidDimensionType(_)));
}
