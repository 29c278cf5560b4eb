//! Data generators for benchmarks

use rand::Rng;
use strata::common::{Tuple, Value};
use strata::tuple;
use strata_rtree::{field, IndexKey, Predicate};

pub const CALENDARS: [&str; 4] = ["business", "private", "holidays", "shared"];

/// Epoch around which generated events cluster.
pub const EPOCH_BASE: i64 = 1_690_000_000;
const EPOCH_SPREAD: i64 = 30 * 24 * 3600;

/// One generated event: the key it is indexed under and its primary key.
#[derive(Debug, Clone)]
pub struct IntervalEntry {
    pub key: IndexKey,
    pub primary_key: Tuple,
}

/// Generate events with a start within a month and a duration up to a day
pub fn generate_intervals(count: usize) -> Vec<IntervalEntry> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let calendar = CALENDARS[rng.gen_range(0..CALENDARS.len())];
            let start = EPOCH_BASE + rng.gen_range(0..EPOCH_SPREAD);
            let end = start + rng.gen_range(1800..86_400);
            IntervalEntry {
                key: IndexKey::new(tuple![calendar], tuple![start, end]),
                primary_key: tuple![i as i64],
            }
        })
        .collect()
}

/// Generate events where roughly one in ten has no end
pub fn generate_intervals_with_nulls(count: usize) -> Vec<IntervalEntry> {
    let mut rng = rand::thread_rng();
    generate_intervals(count)
        .into_iter()
        .map(|mut entry| {
            if rng.gen_bool(0.1) {
                entry.key.dimensions[1] = Value::Null;
            }
            entry
        })
        .collect()
}

/// Predicate selecting events of one calendar overlapping a random window
pub fn generate_overlap_query(window: i64) -> Predicate {
    let mut rng = rand::thread_rng();
    let calendar = CALENDARS[rng.gen_range(0..CALENDARS.len())];
    let from = EPOCH_BASE + rng.gen_range(0..EPOCH_SPREAD - window);
    Predicate::and(vec![
        field("calendar_name").eq(calendar),
        field("start_epoch").le(from + window),
        field("end_epoch").ge(from),
    ])
}
