//! Calendar event records, their generators and a small record store that
//! keeps multidimensional indexes up to date.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use strata::common::{pack, unpack, Subspace, Tuple, Value};
use strata::transaction::Transaction;
use strata::tuple;
use strata_rtree::{
    DimensionType, EvaluationContext, IndexDefinition, IndexEntry, IndexKey, IndexOptions,
    MultidimensionalIndex, Predicate, RTreeError, RTreeResult,
};

pub const EPOCH_MEAN: i64 = 1690360647;
pub const DURATION_CUT_OFF: i64 = 30 * 60;
pub const EXPIRATION_CUT_OFF: i64 = 30 * 24 * 60 * 60;

const EPOCH_STANDARD_DEVIATION: f64 = 3.0 * 24.0 * 60.0 * 60.0;
const DURATION_STANDARD_DEVIATION: f64 = 60.0 * 60.0;
const EXPIRATION_STANDARD_DEVIATION: f64 = 24.0 * 60.0 * 60.0;

/// One calendar event. The primary key is `(rec_domain, rec_no)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalendarRecord {
    pub rec_domain: Option<String>,
    pub rec_no: i64,
    pub calendar_name: String,
    pub start_epoch: Option<i64>,
    pub end_epoch: Option<i64>,
    pub expiration_epoch: Option<i64>,
}

impl CalendarRecord {
    pub fn new(rec_no: i64, calendar_name: &str) -> Self {
        CalendarRecord {
            rec_domain: None,
            rec_no,
            calendar_name: calendar_name.to_string(),
            start_epoch: None,
            end_epoch: None,
            expiration_epoch: None,
        }
    }

    pub fn epochs(mut self, start: Option<i64>, end: Option<i64>, expiration: Option<i64>) -> Self {
        self.start_epoch = start;
        self.end_epoch = end;
        self.expiration_epoch = expiration;
        self
    }

    pub fn primary_key(&self) -> Tuple {
        tuple![self.rec_domain.clone(), self.rec_no]
    }

    /// Value of a named field, `Null` for unknown names.
    pub fn field(&self, name: &str) -> Value {
        match name {
            "rec_domain" => Value::from(self.rec_domain.clone()),
            "rec_no" => Value::from(self.rec_no),
            "calendar_name" => Value::from(self.calendar_name.as_str()),
            "start_epoch" => Value::from(self.start_epoch),
            "end_epoch" => Value::from(self.end_epoch),
            "expiration_epoch" => Value::from(self.expiration_epoch),
            _ => Value::Null,
        }
    }

    /// Brute-force evaluation of a predicate against this record.
    pub fn matches(&self, predicate: &Predicate, context: &EvaluationContext) -> RTreeResult<bool> {
        predicate.evaluate(&|name: &str| self.field(name), context)
    }

    fn to_tuple(&self) -> Tuple {
        tuple![
            self.rec_domain.clone(),
            self.rec_no,
            self.calendar_name.as_str(),
            self.start_epoch,
            self.end_epoch,
            self.expiration_epoch
        ]
    }

    fn from_tuple(values: Tuple) -> RTreeResult<Self> {
        let corrupt = || RTreeError::Serialization("Malformed calendar record".to_string());
        let epoch = |value: &Value| -> RTreeResult<Option<i64>> {
            match value {
                Value::Null => Ok(None),
                Value::Int(v) => Ok(Some(*v)),
                _ => Err(corrupt()),
            }
        };
        match values.as_slice() {
            [domain, Value::Int(rec_no), Value::String(name), start, end, expiration] => {
                Ok(CalendarRecord {
                    rec_domain: domain.as_str().map(str::to_string),
                    rec_no: *rec_no,
                    calendar_name: name.clone(),
                    start_epoch: epoch(start)?,
                    end_epoch: epoch(end)?,
                    expiration_epoch: epoch(expiration)?,
                })
            }
            _ => Err(corrupt()),
        }
    }
}

/// Seeded generator of calendar events around [`EPOCH_MEAN`].
pub struct RecordGenerator {
    random: StdRng,
}

impl RecordGenerator {
    pub fn new(seed: u64) -> Self {
        RecordGenerator {
            random: StdRng::seed_from_u64(seed),
        }
    }

    // Box-Muller
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.random.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.random.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn calendar<'a>(&mut self, names: &[&'a str]) -> &'a str {
        names[self.random.gen_range(0..names.len())]
    }

    /// A record with every epoch present.
    pub fn record(&mut self, rec_no: i64, names: &[&str]) -> CalendarRecord {
        let name = self.calendar(names);
        let start = (self.gaussian() * EPOCH_STANDARD_DEVIATION) as i64 + EPOCH_MEAN;
        let end = start
            + DURATION_CUT_OFF
            + (self.gaussian().abs() * DURATION_STANDARD_DEVIATION) as i64;
        let expiration = end
            + EXPIRATION_CUT_OFF
            + (self.gaussian().abs() * EXPIRATION_STANDARD_DEVIATION) as i64;
        CalendarRecord::new(rec_no, name).epochs(Some(start), Some(end), Some(expiration))
    }

    /// A record whose epochs are each absent with probability 0.1.
    pub fn record_with_nulls(&mut self, rec_no: i64, names: &[&str]) -> CalendarRecord {
        let name = self.calendar(names);
        let start = if self.random.gen::<f32>() < 0.1 {
            None
        } else {
            Some((self.gaussian() * EPOCH_STANDARD_DEVIATION) as i64 + EPOCH_MEAN)
        };
        let end = if self.random.gen::<f32>() < 0.1 {
            None
        } else {
            Some(
                start.unwrap_or(EPOCH_MEAN)
                    + DURATION_CUT_OFF
                    + (self.gaussian().abs() * DURATION_STANDARD_DEVIATION) as i64,
            )
        };
        let expiration = if self.random.gen::<f32>() < 0.1 {
            None
        } else {
            Some(
                end.unwrap_or(EPOCH_MEAN)
                    + EXPIRATION_CUT_OFF
                    + (self.gaussian().abs() * EXPIRATION_STANDARD_DEVIATION) as i64,
            )
        };
        CalendarRecord::new(rec_no, name).epochs(start, end, expiration)
    }

    pub fn records(&mut self, count: i64, names: &[&str]) -> Vec<CalendarRecord> {
        (0..count).map(|rec_no| self.record(rec_no, names)).collect()
    }

    pub fn records_with_nulls(&mut self, count: i64, names: &[&str]) -> Vec<CalendarRecord> {
        (0..count)
            .map(|rec_no| self.record_with_nulls(rec_no, names))
            .collect()
    }

    /// Picks `count` distinct record numbers out of `0..total`.
    pub fn sample(&mut self, total: i64, count: usize) -> Vec<i64> {
        let mut chosen = BTreeSet::new();
        while chosen.len() < count.min(total as usize) {
            chosen.insert(self.random.gen_range(0..total));
        }
        chosen.into_iter().collect()
    }

    pub fn gaussian_probe(&mut self, deviation: f64) -> i64 {
        (self.gaussian().abs() * deviation) as i64 + EPOCH_MEAN
    }
}

/// Records 1 to 4, progressively more absent, with `i64::MIN` epochs.
pub fn records_with_nulls_and_mins() -> Vec<CalendarRecord> {
    vec![
        CalendarRecord::new(1, "business").epochs(Some(i64::MIN), Some(1), Some(2)),
        CalendarRecord::new(2, "business").epochs(Some(i64::MIN), Some(i64::MIN), Some(3)),
        CalendarRecord::new(3, "business").epochs(None, Some(1), Some(3)),
        CalendarRecord::new(4, "business").epochs(None, None, Some(3)),
    ]
}

/// The `EventIntervals` index: grouped by calendar, over (start, end).
pub fn event_intervals(options: IndexOptions) -> RTreeResult<IndexDefinition> {
    IndexDefinition::builder("EventIntervals")
        .group("calendar_name", DimensionType::String)
        .dimension("start_epoch", DimensionType::Int64)
        .dimension("end_epoch", DimensionType::Int64)
        .options(options)
        .build()
}

/// Three dimensional variant over (start, end, expiration).
pub fn event_intervals_with_expiration(options: IndexOptions) -> RTreeResult<IndexDefinition> {
    IndexDefinition::builder("EventIntervalsWithExpiration")
        .group("calendar_name", DimensionType::String)
        .dimension("start_epoch", DimensionType::Int64)
        .dimension("end_epoch", DimensionType::Int64)
        .dimension("expiration_epoch", DimensionType::Int64)
        .options(options)
        .build()
}

/// Grouped by `(rec_domain, calendar_name)`.
pub fn domain_event_intervals(options: IndexOptions) -> RTreeResult<IndexDefinition> {
    IndexDefinition::builder("DomainEventIntervals")
        .group("rec_domain", DimensionType::String)
        .group("calendar_name", DimensionType::String)
        .dimension("start_epoch", DimensionType::Int64)
        .dimension("end_epoch", DimensionType::Int64)
        .options(options)
        .build()
}

/// Records keyed by primary key, with every index maintained on save and
/// delete inside the caller's transaction.
pub struct CalendarStore {
    records: Subspace,
    indexes: Vec<MultidimensionalIndex>,
}

impl CalendarStore {
    pub fn open(
        tx: &Transaction,
        root: &Subspace,
        definitions: Vec<IndexDefinition>,
    ) -> RTreeResult<CalendarStore> {
        let indexes = definitions
            .into_iter()
            .map(|definition| {
                let subspace = root.sub(&tuple!["index", definition.name()]);
                MultidimensionalIndex::open(tx, definition, &subspace)
            })
            .collect::<RTreeResult<Vec<_>>>()?;
        Ok(CalendarStore {
            records: root.sub(&tuple!["records"]),
            indexes,
        })
    }

    pub fn index(&self, name: &str) -> Option<&MultidimensionalIndex> {
        self.indexes.iter().find(|i| i.definition().name() == name)
    }

    /// Inserts or replaces a record.
    pub fn save(&self, tx: &Transaction, record: &CalendarRecord) -> RTreeResult<()> {
        let key = self.records.pack(&record.primary_key());
        let old = self.load(tx, &record.primary_key())?;
        for index in &self.indexes {
            let old_key = old.as_ref().map(|r| index_key(index.definition(), r));
            let new_key = index_key(index.definition(), record);
            index.maintain(tx, old_key.as_ref(), Some(&new_key), &record.primary_key())?;
        }
        tx.set(&key, &pack(&record.to_tuple()))?;
        Ok(())
    }

    pub fn save_all(&self, tx: &Transaction, records: &[CalendarRecord]) -> RTreeResult<()> {
        records.iter().try_for_each(|record| self.save(tx, record))
    }

    /// Deletes a record, returning `false` if it did not exist.
    pub fn delete(&self, tx: &Transaction, primary_key: &Tuple) -> RTreeResult<bool> {
        let old = match self.load(tx, primary_key)? {
            Some(old) => old,
            None => return Ok(false),
        };
        for index in &self.indexes {
            let old_key = index_key(index.definition(), &old);
            index.maintain(tx, Some(&old_key), None, primary_key)?;
        }
        tx.clear(&self.records.pack(primary_key))?;
        Ok(true)
    }

    pub fn load(&self, tx: &Transaction, primary_key: &Tuple) -> RTreeResult<Option<CalendarRecord>> {
        match tx.get(&self.records.pack(primary_key))? {
            Some(bytes) => Ok(Some(CalendarRecord::from_tuple(unpack(&bytes)?)?)),
            None => Ok(None),
        }
    }

    pub fn all(&self, tx: &Transaction) -> RTreeResult<Vec<CalendarRecord>> {
        tx.get_range(&self.records.range(), None, false)?
            .into_iter()
            .map(|(_, bytes)| CalendarRecord::from_tuple(unpack(&bytes)?))
            .collect()
    }

    /// Records matching `predicate` by brute force, sorted.
    pub fn filter(
        &self,
        tx: &Transaction,
        predicate: &Predicate,
        context: &EvaluationContext,
    ) -> RTreeResult<Vec<CalendarRecord>> {
        let mut matching = Vec::new();
        for record in self.all(tx)? {
            if record.matches(predicate, context)? {
                matching.push(record);
            }
        }
        matching.sort();
        Ok(matching)
    }

    /// Loads the records behind index entries, sorted.
    pub fn fetch(&self, tx: &Transaction, entries: &[IndexEntry]) -> RTreeResult<Vec<CalendarRecord>> {
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = self.load(tx, &entry.primary_key)?.ok_or_else(|| {
                RTreeError::CorruptIndex(format!(
                    "Index entry {:?} points to a missing record",
                    entry.primary_key
                ))
            })?;
            records.push(record);
        }
        records.sort();
        Ok(records)
    }
}

/// Projects a record onto the key of an index.
pub fn index_key(definition: &IndexDefinition, record: &CalendarRecord) -> IndexKey {
    IndexKey::new(
        definition
            .group_dimensions()
            .iter()
            .map(|d| record.field(&d.name))
            .collect(),
        definition
            .value_dimensions()
            .iter()
            .map(|d| record.field(&d.name))
            .collect(),
    )
}
