// Rollup pass: fetch complete source rows -> bucket -> write aggregates -> delete consumed rows.
// Invoked by an external timer. Runs for the same (locality, tier) must not overlap; different
// pairs are independent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    GlobalStatsSnapshot, LocalStatsSnapshot, StatDuration, StatLocality, StatSample,
};
use crate::stats_repo::StatsRepo;
use crate::stats_repo::aggregation::{self, RollupTier};

/// What one rollup run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupReport {
    /// Eligible source rows read.
    pub fetched: usize,
    /// Aggregate rows inserted.
    pub written: usize,
    /// Aggregate rows that already existed from an earlier run.
    pub duplicates: usize,
    /// Source rows removed.
    pub deleted: u64,
}

pub struct RollupEngine {
    repo: Arc<StatsRepo>,
    clock: Arc<dyn Clock>,
}

impl RollupEngine {
    pub fn new(repo: Arc<StatsRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Rolls every complete `source` bucket of `locality` into `target`.
    ///
    /// Only rows before the start of the current `target` bucket are eligible. A bucket that
    /// already exists in `target` is skipped, not an error.
    ///
    /// Live -> Hourly consumes its input: source rows are deleted by the ids read in this run,
    /// and only after every aggregate is stored; on error nothing is deleted and the next run
    /// retries the same input. Hourly -> Daily leaves the hourly rows in place and only reads
    /// those at or after the end of the newest daily bucket.
    #[instrument(skip(self))]
    pub async fn run_rollup(
        &self,
        locality: StatLocality,
        source: StatDuration,
        target: StatDuration,
    ) -> StoreResult<RollupReport> {
        let tier = RollupTier::for_pair(source, target)?;
        match locality {
            StatLocality::Local => self.roll::<LocalStatsSnapshot>(tier).await,
            StatLocality::Global => self.roll::<GlobalStatsSnapshot>(tier).await,
        }
    }

    /// `run_rollup` bounded by `deadline`. On expiry the run is dropped before its delete
    /// commits, so source rows stay for the next run.
    pub async fn run_rollup_until(
        &self,
        locality: StatLocality,
        source: StatDuration,
        target: StatDuration,
        deadline: Instant,
    ) -> StoreResult<RollupReport> {
        tokio::time::timeout_at(deadline, self.run_rollup(locality, source, target))
            .await
            .map_err(|_| StoreError::DeadlineExceeded)?
    }

    /// Runs `tiers` in order for both localities, each run bounded by `budget`.
    /// A failed pair is logged and does not stop the others.
    pub async fn run_pass(&self, tiers: &[RollupTier], budget: Duration) -> anyhow::Result<()> {
        let mut failed = 0;
        for tier in tiers {
            for locality in StatLocality::ALL {
                let run = match Instant::now().checked_add(budget) {
                    Some(deadline) => {
                        self.run_rollup_until(locality, tier.source(), tier.target(), deadline)
                            .await
                    }
                    None => self.run_rollup(locality, tier.source(), tier.target()).await,
                };
                match run {
                    Ok(report) if report.fetched > 0 => {
                        info!(
                            %locality,
                            source = %tier.source(),
                            target = %tier.target(),
                            fetched = report.fetched,
                            written = report.written,
                            duplicates = report.duplicates,
                            deleted = report.deleted,
                            "rollup complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            %locality,
                            source = %tier.source(),
                            target = %tier.target(),
                            error = %e,
                            "rollup failed"
                        );
                        failed += 1;
                    }
                }
            }
        }
        anyhow::ensure!(failed == 0, "{failed} rollup run(s) failed");
        Ok(())
    }

    async fn roll<S: StatSample>(&self, tier: RollupTier) -> StoreResult<RollupReport> {
        let cutoff = tier.align(self.clock.now());
        let since = if tier.consumes_source() {
            None
        } else {
            self.repo
                .latest_created_on::<S>(tier.target())
                .await?
                .map(|last| last + tier.width())
        };
        let samples: Vec<S> = self
            .repo
            .fetch_range(tier.source(), since, cutoff)
            .await?;
        let mut report = RollupReport {
            fetched: samples.len(),
            ..Default::default()
        };
        if samples.is_empty() {
            return Ok(report);
        }

        let rollup = aggregation::aggregate_buckets(&samples, tier, Some(cutoff));
        for bucket in &rollup.buckets {
            match self.repo.save_stats(tier.target(), bucket).await {
                Ok(_) => report.written += 1,
                Err(e) if e.is_conflict() => {
                    debug!(created_on = %bucket.created_on(), "bucket already rolled up");
                    report.duplicates += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if tier.consumes_source() {
            report.deleted = self
                .repo
                .delete_stats::<S>(tier.source(), &rollup.consumed_ids)
                .await?;
        }
        Ok(report)
    }
}
