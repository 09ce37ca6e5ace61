// SQLite population stats. Live rows are appended by the collector; rolled-up tiers are
// written by the rollup and read back newest first for dashboards.
// Keyed columns (map_types, regions, servers) are JSON objects of key -> count.

pub mod aggregation;
pub mod schema;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::instrument;

use crate::db::{datetime_from_millis, datetime_to_millis};
use crate::error::StoreResult;
use crate::models::{
    GlobalStatsSnapshot, KeyedCounts, LocalStatsSnapshot, StatDuration, StatLocality, StatSample,
    StatsSeries,
};
use schema::stat_table;

/// Hourly reads return at most one week of buckets.
pub const HOURLY_READ_LIMIT: i64 = 24 * 7;

/// Max ids per DELETE statement (stays well under SQLite's bound-parameter limit).
const DELETE_CHUNK: usize = 500;

pub struct StatsRepo {
    pool: SqlitePool,
}

impl StatsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> StoreResult<()> {
        schema::init_stat_tables(&self.pool).await
    }

    /// Inserts one snapshot and returns its stat_id. A second row for the same created_on in a
    /// rolled-up tier fails with `StoreError::Conflict`.
    #[instrument(
        skip(self, snapshot),
        fields(repo = "stats", operation = "save_stats", locality = S::LOCALITY.as_str())
    )]
    pub async fn save_stats<S: StatSample>(
        &self,
        duration: StatDuration,
        snapshot: &S,
    ) -> StoreResult<i64> {
        let table = stat_table(S::LOCALITY, duration)?;
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {table} ({}, created_on) VALUES (",
            data_columns::<S>()
        ));
        let mut values = qb.separated(", ");
        for v in snapshot.scalars() {
            values.push_bind(v);
        }
        for counts in snapshot.keyed() {
            values.push_bind(serde_json::to_string(counts)?);
        }
        values.push_bind(datetime_to_millis(snapshot.created_on()));
        values.push_unseparated(")");

        let r = qb.build().execute(&self.pool).await?;
        Ok(r.last_insert_rowid())
    }

    pub async fn save_local_stats(
        &self,
        duration: StatDuration,
        snapshot: &LocalStatsSnapshot,
    ) -> StoreResult<i64> {
        self.save_stats(duration, snapshot).await
    }

    pub async fn save_global_stats(
        &self,
        duration: StatDuration,
        snapshot: &GlobalStatsSnapshot,
    ) -> StoreResult<i64> {
        self.save_stats(duration, snapshot).await
    }

    /// Rows with created_on < cutoff, ascending by created_on (rollup input).
    pub async fn fetch_before<S: StatSample>(
        &self,
        duration: StatDuration,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<S>> {
        self.fetch_range(duration, None, cutoff).await
    }

    /// Rows with `since` <= created_on < cutoff, ascending by created_on.
    /// No lower bound when `since` is None.
    #[instrument(
        skip(self),
        fields(repo = "stats", operation = "fetch_range", locality = S::LOCALITY.as_str())
    )]
    pub async fn fetch_range<S: StatSample>(
        &self,
        duration: StatDuration,
        since: Option<DateTime<Utc>>,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<S>> {
        let table = stat_table(S::LOCALITY, duration)?;
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM {table} WHERE created_on < ",
            select_columns::<S>()
        ));
        qb.push_bind(datetime_to_millis(cutoff));
        if let Some(since) = since {
            qb.push(" AND created_on >= ")
                .push_bind(datetime_to_millis(since));
        }
        qb.push(" ORDER BY created_on ASC, stat_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(parse_stat_row::<S>).collect()
    }

    /// created_on of the newest row at `duration`, if any.
    #[instrument(
        skip(self),
        fields(repo = "stats", operation = "latest_created_on", locality = S::LOCALITY.as_str())
    )]
    pub async fn latest_created_on<S: StatSample>(
        &self,
        duration: StatDuration,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let table = stat_table(S::LOCALITY, duration)?;
        let latest: Option<i64> =
            sqlx::query_scalar(&format!("SELECT MAX(created_on) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
        latest.map(datetime_from_millis).transpose()
    }

    /// Deletes rows by stat_id in one transaction. Returns the number removed.
    #[instrument(
        skip(self, ids),
        fields(
            repo = "stats",
            operation = "delete_stats",
            locality = S::LOCALITY.as_str(),
            ids_count = ids.len()
        )
    )]
    pub async fn delete_stats<S: StatSample>(
        &self,
        duration: StatDuration,
        ids: &[i64],
    ) -> StoreResult<u64> {
        let table = stat_table(S::LOCALITY, duration)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("DELETE FROM {table} WHERE stat_id IN ("));
            let mut list = qb.separated(", ");
            for id in chunk {
                list.push_bind(*id);
            }
            list.push_unseparated(")");
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Stored rows at `duration`, newest first. Hourly is capped to `HOURLY_READ_LIMIT` rows.
    #[instrument(
        skip(self),
        fields(repo = "stats", operation = "get_stats", locality = S::LOCALITY.as_str())
    )]
    pub async fn get_stats_for<S: StatSample>(&self, duration: StatDuration) -> StoreResult<Vec<S>> {
        let table = stat_table(S::LOCALITY, duration)?;
        let mut sql = format!(
            "SELECT {} FROM {table} ORDER BY created_on DESC",
            select_columns::<S>()
        );
        if duration == StatDuration::Hourly {
            sql.push_str(&format!(" LIMIT {HOURLY_READ_LIMIT}"));
        }
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_stat_row::<S>).collect()
    }

    pub async fn get_local_stats(
        &self,
        duration: StatDuration,
    ) -> StoreResult<Vec<LocalStatsSnapshot>> {
        self.get_stats_for(duration).await
    }

    pub async fn get_global_stats(
        &self,
        duration: StatDuration,
    ) -> StoreResult<Vec<GlobalStatsSnapshot>> {
        self.get_stats_for(duration).await
    }

    pub async fn get_stats(
        &self,
        locality: StatLocality,
        duration: StatDuration,
    ) -> StoreResult<StatsSeries> {
        Ok(match locality {
            StatLocality::Local => StatsSeries::Local(self.get_local_stats(duration).await?),
            StatLocality::Global => StatsSeries::Global(self.get_global_stats(duration).await?),
        })
    }
}

/// Scalar then keyed column names, comma separated.
fn data_columns<S: StatSample>() -> String {
    S::SCALAR_COLUMNS
        .iter()
        .chain(S::KEYED_COLUMNS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_columns<S: StatSample>() -> String {
    format!("stat_id, created_on, {}", data_columns::<S>())
}

fn parse_stat_row<S: StatSample>(row: &SqliteRow) -> StoreResult<S> {
    let stat_id: i64 = row.try_get("stat_id")?;
    let created_on = datetime_from_millis(row.try_get("created_on")?)?;
    let scalars = S::SCALAR_COLUMNS
        .iter()
        .map(|c| row.try_get::<i64, _>(*c))
        .collect::<Result<Vec<_>, _>>()?;
    let keyed = S::KEYED_COLUMNS
        .iter()
        .map(|c| -> StoreResult<KeyedCounts> {
            let text: String = row.try_get(*c)?;
            Ok(serde_json::from_str::<KeyedCounts>(&text)?)
        })
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(S::from_columns(stat_id, created_on, scalars, keyed))
}
