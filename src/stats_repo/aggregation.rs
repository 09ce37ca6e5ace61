// Bucketing: time alignment per tier + pure aggregation of ordered samples.
// DB access (fetch, save, delete) stays in stats_repo::mod.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{StoreError, StoreResult};
use crate::models::{KeyedCounts, StatDuration, StatSample};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// A supported source -> target rollup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupTier {
    /// Live -> Hourly.
    Hourly,
    /// Hourly -> Daily.
    Daily,
}

impl RollupTier {
    pub fn for_pair(source: StatDuration, target: StatDuration) -> StoreResult<Self> {
        match (source, target) {
            (StatDuration::Live, StatDuration::Hourly) => Ok(RollupTier::Hourly),
            (StatDuration::Hourly, StatDuration::Daily) => Ok(RollupTier::Daily),
            (source, target) => Err(StoreError::invalid(format!(
                "unsupported rollup {source} -> {target}"
            ))),
        }
    }

    pub fn source(self) -> StatDuration {
        match self {
            RollupTier::Hourly => StatDuration::Live,
            RollupTier::Daily => StatDuration::Hourly,
        }
    }

    pub fn target(self) -> StatDuration {
        match self {
            RollupTier::Hourly => StatDuration::Hourly,
            RollupTier::Daily => StatDuration::Daily,
        }
    }

    /// Whether a run deletes the source rows it aggregated. Hourly rows are kept for reads.
    pub fn consumes_source(self) -> bool {
        matches!(self, RollupTier::Hourly)
    }

    fn width_ms(self) -> i64 {
        match self {
            RollupTier::Hourly => MS_PER_HOUR,
            RollupTier::Daily => MS_PER_DAY,
        }
    }

    pub fn width(self) -> TimeDelta {
        TimeDelta::milliseconds(self.width_ms())
    }

    /// Start of the bucket containing `ts` (UTC). Hourly keeps the hour; daily is midnight.
    pub fn align(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let ms = ts.timestamp_millis();
        ts - TimeDelta::milliseconds(ms.rem_euclid(self.width_ms()))
    }
}

/// Output of one aggregation: buckets in ascending time order plus the ids of every
/// sample that went into them.
#[derive(Debug, Clone)]
pub struct BucketRollup<S> {
    pub buckets: Vec<S>,
    pub consumed_ids: Vec<i64>,
}

/// Groups `samples` (ascending by created_on) into `tier` buckets and averages each one.
///
/// Scalars are the truncated mean over the bucket. A keyed value is the truncated mean over
/// only the samples that carried that key. A bucket is closed when a later sample lands in a
/// different bucket; the trailing bucket is kept only if it ends at or before `complete_before`.
pub fn aggregate_buckets<S: StatSample>(
    samples: &[S],
    tier: RollupTier,
    complete_before: Option<DateTime<Utc>>,
) -> BucketRollup<S> {
    let mut out = BucketRollup {
        buckets: Vec::new(),
        consumed_ids: Vec::with_capacity(samples.len()),
    };
    let mut current: Option<Bucket> = None;

    for sample in samples {
        let start = tier.align(sample.created_on());
        if current.as_ref().is_some_and(|b| b.start != start)
            && let Some(done) = current.take()
        {
            done.flush_into(&mut out);
        }
        current
            .get_or_insert_with(|| Bucket::new::<S>(start))
            .push(sample);
    }

    if let Some(last) = current
        && complete_before.is_some_and(|cutoff| last.start + tier.width() <= cutoff)
    {
        last.flush_into(&mut out);
    }

    out
}

/// Accumulated per-field values of one bucket.
struct Bucket {
    start: DateTime<Utc>,
    ids: Vec<i64>,
    scalars: Vec<Vec<i64>>,
    keyed: Vec<HashMap<String, Vec<i64>>>,
}

impl Bucket {
    fn new<S: StatSample>(start: DateTime<Utc>) -> Self {
        Self {
            start,
            ids: Vec::new(),
            scalars: vec![Vec::new(); S::SCALAR_COLUMNS.len()],
            keyed: vec![HashMap::new(); S::KEYED_COLUMNS.len()],
        }
    }

    fn push<S: StatSample>(&mut self, sample: &S) {
        self.ids.push(sample.stat_id());
        for (acc, v) in self.scalars.iter_mut().zip(sample.scalars()) {
            acc.push(v);
        }
        for (acc, counts) in self.keyed.iter_mut().zip(sample.keyed()) {
            for (k, v) in counts {
                acc.entry(k.clone()).or_default().push(*v);
            }
        }
    }

    fn flush_into<S: StatSample>(self, out: &mut BucketRollup<S>) {
        let scalars = self.scalars.iter().map(|v| mean_i64(v)).collect();
        let keyed = self
            .keyed
            .into_iter()
            .map(|by_key| {
                by_key
                    .into_iter()
                    .map(|(k, v)| (k, mean_i64(&v)))
                    .collect::<KeyedCounts>()
            })
            .collect();
        out.buckets.push(S::from_columns(0, self.start, scalars, keyed));
        out.consumed_ids.extend(self.ids);
    }
}

fn mean_i64(v: &[i64]) -> i64 {
    if v.is_empty() {
        return 0;
    }
    // i128 sum; the mean of i64 values always fits back in i64.
    (v.iter().map(|x| *x as i128).sum::<i128>() / v.len() as i128) as i64
}
