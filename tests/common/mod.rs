// Shared test helpers

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serverstats::config::DatabaseConfig;
use serverstats::db;
use serverstats::models::*;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// File-backed database with the full schema. Keep the TempDir alive for the test.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.db");
    let pool = db::connect(&DatabaseConfig {
        path: path.to_str().unwrap().to_string(),
        max_pool_size: 2,
    })
    .await
    .unwrap();
    db::init_schema(&pool).await.unwrap();
    (dir, pool)
}

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    rfc3339.parse().unwrap()
}

pub fn counts(pairs: &[(&str, i64)]) -> KeyedCounts {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn local(created_on: &str, players: i64, map_types: &[(&str, i64)]) -> LocalStatsSnapshot {
    LocalStatsSnapshot {
        players,
        capacity_full: 1,
        capacity_empty: 2,
        capacity_partial: 3,
        map_types: counts(map_types),
        regions: counts(&[("eu", players)]),
        servers: counts(&[("eu-1", players)]),
        ..LocalStatsSnapshot::new(at(created_on))
    }
}

pub fn global(created_on: &str, players: i64, secure: i64) -> GlobalStatsSnapshot {
    GlobalStatsSnapshot {
        players,
        bots: players / 2,
        secure,
        servers_community: 10,
        servers_total: 20,
        map_types: counts(&[("koth", players)]),
        regions: counts(&[("us", players)]),
        ..GlobalStatsSnapshot::new(at(created_on))
    }
}

/// `local` with a fixed stat_id, for pure aggregation input.
pub fn local_with_id(
    stat_id: i64,
    created_on: &str,
    players: i64,
    map_types: &[(&str, i64)],
) -> LocalStatsSnapshot {
    LocalStatsSnapshot {
        stat_id,
        ..local(created_on, players, map_types)
    }
}
