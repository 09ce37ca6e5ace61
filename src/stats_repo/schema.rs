// Physical layout for population stats: one table per (locality, duration) pair.
// Rolled-up tiers carry a unique index on created_on so each bucket is written at most once.

use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    GlobalStatsSnapshot, LocalStatsSnapshot, StatDuration, StatLocality, StatSample,
};

/// Tiers that have a backing table.
pub const STORED_DURATIONS: [StatDuration; 3] =
    [StatDuration::Live, StatDuration::Hourly, StatDuration::Daily];

pub fn stat_table(locality: StatLocality, duration: StatDuration) -> StoreResult<&'static str> {
    let table = match (locality, duration) {
        (StatLocality::Local, StatDuration::Live) => "local_stats_players",
        (StatLocality::Local, StatDuration::Hourly) => "local_stats_players_hourly",
        (StatLocality::Local, StatDuration::Daily) => "local_stats_players_daily",
        (StatLocality::Global, StatDuration::Live) => "global_stats_players",
        (StatLocality::Global, StatDuration::Hourly) => "global_stats_players_hourly",
        (StatLocality::Global, StatDuration::Daily) => "global_stats_players_daily",
        (locality, duration) => {
            return Err(StoreError::invalid(format!(
                "no {duration} table for {locality} stats"
            )));
        }
    };
    Ok(table)
}

/// Creates every stats table and its created_on index if not present.
pub async fn init_stat_tables(pool: &SqlitePool) -> StoreResult<()> {
    for duration in STORED_DURATIONS {
        create_stat_table::<LocalStatsSnapshot>(pool, duration).await?;
        create_stat_table::<GlobalStatsSnapshot>(pool, duration).await?;
    }
    Ok(())
}

async fn create_stat_table<S: StatSample>(
    pool: &SqlitePool,
    duration: StatDuration,
) -> StoreResult<()> {
    let table = stat_table(S::LOCALITY, duration)?;

    let mut columns = vec!["stat_id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        S::SCALAR_COLUMNS
            .iter()
            .map(|c| format!("{c} INTEGER NOT NULL DEFAULT 0")),
    );
    columns.extend(
        S::KEYED_COLUMNS
            .iter()
            .map(|c| format!("{c} TEXT NOT NULL DEFAULT '{{}}'")),
    );
    columns.push("created_on INTEGER NOT NULL".to_string());

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    ))
    .execute(pool)
    .await?;

    let unique = if duration == StatDuration::Live {
        ""
    } else {
        "UNIQUE "
    };
    sqlx::query(&format!(
        "CREATE {unique}INDEX IF NOT EXISTS idx_{table}_created_on ON {table}(created_on)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
