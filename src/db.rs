// SQLite pool + schema bootstrap. Timestamps are stored as epoch milliseconds.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::{match_repo, person, stats_repo};

/// Connect to SQLite at `config.path`, create parent dir and DB if missing, enable WAL + pragmas.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = Path::new(&config.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_pool_size)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

/// Creates all tables. Person comes first since match sums reference it.
pub async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    stats_repo::schema::init_stat_tables(pool).await?;
    person::init_person_table(pool).await?;
    match_repo::init_match_tables(pool).await?;
    Ok(())
}

pub(crate) fn datetime_to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn datetime_from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::invalid(format!("timestamp out of range: {ms}")))
}
