use crate::rtree::common::*;
use strata::common::Value;
use strata::errors::StrataResult;
use strata::transaction::Database;
use strata::tuple;
use strata_int_test::records::{records_with_nulls_and_mins, CalendarRecord};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_rtree::{field, EvaluationContext, IndexOptions, IndexScanParameters, Predicate};

fn hypercube_read(
    db: &Database,
    options: &IndexOptions,
    start: (Option<Value>, Option<Value>),
    end: (Option<Value>, Option<Value>),
    brute_force: &Predicate,
) -> StrataResult<Vec<i64>> {
    let definitions = event_intervals_definitions(options)?;
    let parameters = IndexScanParameters::hypercube(
        tuple!["business"],
        vec![start.0.clone(), end.0.clone()],
        vec![start.1.clone(), end.1.clone()],
    );
    let bounds = db.run(|tx| {
        let store = open_store(tx, options, definitions.clone())?;
        Ok(index(&store, EVENT_INTERVALS).bind_parameters(&parameters, &EvaluationContext::empty())?)
    })?;
    let (found, expected) =
        read_both(db, options, &definitions, EVENT_INTERVALS, &bounds, brute_force)?;
    assert_eq!(found, expected, "hypercube read differs for {:?}", options);
    Ok(found.iter().map(|r: &CalendarRecord| r.rec_no).collect())
}

fn load_nulls_and_mins(db: &Database, options: &IndexOptions) -> StrataResult<()> {
    let definitions = event_intervals_definitions(options)?;
    save_records(db, options, &definitions, &records_with_nulls_and_mins())
}

#[test]
fn test_nulls_and_mins_1() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                load_nulls_and_mins(&db, &options)?;
                let brute_force = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    Predicate::or(vec![
                        field("start_epoch").is_null(),
                        field("start_epoch").le(0i64),
                    ]),
                    field("end_epoch").ge(0i64),
                ]);
                let rec_nos = hypercube_read(
                    &db,
                    &options,
                    (Some(Value::Null), Some(Value::from(0i64))),
                    (Some(Value::from(0i64)), None),
                    &brute_force,
                )?;
                assert_eq!(rec_nos, vec![1, 3]);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_nulls_and_mins_2() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                load_nulls_and_mins(&db, &options)?;
                let brute_force = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    field("start_epoch").le(0i64),
                    field("end_epoch").ge(0i64),
                ]);
                let rec_nos = hypercube_read(
                    &db,
                    &options,
                    (Some(Value::from(i64::MIN)), Some(Value::from(0i64))),
                    (Some(Value::from(0i64)), None),
                    &brute_force,
                )?;
                assert_eq!(rec_nos, vec![1]);

                // the same query through the predicate binder
                let found = assert_index_read(
                    &db,
                    &options,
                    &event_intervals_definitions(&options)?,
                    EVENT_INTERVALS,
                    &brute_force,
                )?;
                assert_eq!(found, 1);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_is_null() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            for options in variants() {
                load_nulls_and_mins(&db, &options)?;

                // a null low end and a minimal high end: absent or minimal starts
                let null_or_min = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    Predicate::or(vec![
                        field("start_epoch").is_null(),
                        field("start_epoch").le(i64::MIN),
                    ]),
                ]);
                let rec_nos = hypercube_read(
                    &db,
                    &options,
                    (Some(Value::Null), Some(Value::from(i64::MIN))),
                    (None, None),
                    &null_or_min,
                )?;
                assert_eq!(rec_nos, vec![1, 2, 3, 4]);

                // a null high end selects only absent starts
                let only_null = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    field("start_epoch").is_null(),
                ]);
                let rec_nos = hypercube_read(
                    &db,
                    &options,
                    (None, Some(Value::Null)),
                    (None, None),
                    &only_null,
                )?;
                assert_eq!(rec_nos, vec![3, 4]);

                let both_null = Predicate::and(vec![
                    field("calendar_name").eq("business"),
                    field("start_epoch").is_null(),
                    field("end_epoch").is_null(),
                ]);
                let found = assert_index_read(
                    &db,
                    &options,
                    &event_intervals_definitions(&options)?,
                    EVENT_INTERVALS,
                    &both_null,
                )?;
                assert_eq!(found, 1);
            }
            Ok(())
        },
        cleanup,
    )
}
