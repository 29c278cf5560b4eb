use strata::common::Subspace;
use strata::errors::StrataResult;
use strata::tuple;
use strata_int_test::records::{event_intervals, CalendarStore, RecordGenerator, EPOCH_MEAN};
use strata_int_test::test_util::{cleanup, create_test_context};
use strata_rtree::{field, EvaluationContext, IndexOptions, Predicate};

const CALENDARS: [&str; 3] = ["business", "private", "holidays"];

fn main() -> StrataResult<()> {
    println!("Starting stress test...");
    let ctx = create_test_context()?;
    let db = ctx.db();
    let root = Subspace::from_tuple(&tuple!["stress"]);

    let count = 100_000;
    let batch = 1_000;
    let mut generator = RecordGenerator::new(0);
    let records = generator.records(count, &CALENDARS);

    let start = std::time::Instant::now();
    for chunk in records.chunks(batch) {
        db.run(|tx| {
            let store = CalendarStore::open(tx, &root, vec![event_intervals(IndexOptions::new())?])?;
            store.save_all(tx, chunk)?;
            Ok(())
        })?;
    }
    println!("Inserted {} records in {:?}", count, start.elapsed());

    let predicate = Predicate::and(vec![
        field("calendar_name").eq("business"),
        field("start_epoch").le(EPOCH_MEAN + 5 * 3600),
        field("end_epoch").ge(EPOCH_MEAN + 3600),
    ]);
    let start = std::time::Instant::now();
    let found = db.run(|tx| {
        let store = CalendarStore::open(tx, &root, vec![event_intervals(IndexOptions::new())?])?;
        let Some(index) = store.index("EventIntervals") else {
            return Ok(0);
        };
        let bounds = index.bind(&predicate, &EvaluationContext::empty())?;
        Ok(index.scan(tx, &bounds, None, None)?.results.len())
    })?;
    println!("Found {} overlapping events in {:?}", found, start.elapsed());

    cleanup(ctx)
}
