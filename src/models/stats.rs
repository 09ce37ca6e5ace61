// Server population snapshots: raw "live" samples and their rolled-up buckets.
// A row's locality and duration tier are implied by the table it lives in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Per-key counts whose key set varies from sample to sample (map name, region, server).
pub type KeyedCounts = BTreeMap<String, i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatLocality {
    /// Servers managed by this deployment.
    Local,
    /// The wider game network.
    Global,
}

impl StatLocality {
    pub const ALL: [StatLocality; 2] = [StatLocality::Local, StatLocality::Global];

    pub fn as_str(self) -> &'static str {
        match self {
            StatLocality::Local => "local",
            StatLocality::Global => "global",
        }
    }
}

impl fmt::Display for StatLocality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatLocality {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StatLocality::Local),
            "global" => Ok(StatLocality::Global),
            other => Err(StoreError::invalid(format!("unknown stat locality {other:?}"))),
        }
    }
}

/// Granularity tier, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatDuration {
    Live,
    Hourly,
    Daily,
    Weekly,
    Yearly,
}

impl StatDuration {
    pub fn as_str(self) -> &'static str {
        match self {
            StatDuration::Live => "live",
            StatDuration::Hourly => "hourly",
            StatDuration::Daily => "daily",
            StatDuration::Weekly => "weekly",
            StatDuration::Yearly => "yearly",
        }
    }
}

impl fmt::Display for StatDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatDuration {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(StatDuration::Live),
            "hourly" => Ok(StatDuration::Hourly),
            "daily" => Ok(StatDuration::Daily),
            "weekly" => Ok(StatDuration::Weekly),
            "yearly" => Ok(StatDuration::Yearly),
            other => Err(StoreError::invalid(format!("unknown stat duration {other:?}"))),
        }
    }
}

/// Column-level view of a snapshot type, shared by the store and the bucket aggregator.
///
/// `scalars()` and `keyed()` yield values in the order of `SCALAR_COLUMNS` and
/// `KEYED_COLUMNS`; `from_columns` consumes them in that same order.
pub trait StatSample: Sized + Send + Sync + Unpin + 'static {
    const LOCALITY: StatLocality;
    const SCALAR_COLUMNS: &'static [&'static str];
    const KEYED_COLUMNS: &'static [&'static str];

    /// Row id; 0 until persisted.
    fn stat_id(&self) -> i64;
    fn created_on(&self) -> DateTime<Utc>;
    fn scalars(&self) -> Vec<i64>;
    fn keyed(&self) -> Vec<&KeyedCounts>;
    fn from_columns(
        stat_id: i64,
        created_on: DateTime<Utc>,
        scalars: Vec<i64>,
        keyed: Vec<KeyedCounts>,
    ) -> Self;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStatsSnapshot {
    pub stat_id: i64,
    pub players: i64,
    pub capacity_full: i64,
    pub capacity_empty: i64,
    pub capacity_partial: i64,
    pub map_types: KeyedCounts,
    pub created_on: DateTime<Utc>,
    pub regions: KeyedCounts,
    pub servers: KeyedCounts,
}

impl LocalStatsSnapshot {
    pub fn new(created_on: DateTime<Utc>) -> Self {
        Self {
            created_on,
            ..Default::default()
        }
    }
}

impl StatSample for LocalStatsSnapshot {
    const LOCALITY: StatLocality = StatLocality::Local;
    const SCALAR_COLUMNS: &'static [&'static str] =
        &["players", "capacity_full", "capacity_empty", "capacity_partial"];
    const KEYED_COLUMNS: &'static [&'static str] = &["map_types", "regions", "servers"];

    fn stat_id(&self) -> i64 {
        self.stat_id
    }

    fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    fn scalars(&self) -> Vec<i64> {
        vec![
            self.players,
            self.capacity_full,
            self.capacity_empty,
            self.capacity_partial,
        ]
    }

    fn keyed(&self) -> Vec<&KeyedCounts> {
        vec![&self.map_types, &self.regions, &self.servers]
    }

    fn from_columns(
        stat_id: i64,
        created_on: DateTime<Utc>,
        scalars: Vec<i64>,
        keyed: Vec<KeyedCounts>,
    ) -> Self {
        let mut s = scalars.into_iter();
        let mut k = keyed.into_iter();
        Self {
            stat_id,
            players: s.next().unwrap_or_default(),
            capacity_full: s.next().unwrap_or_default(),
            capacity_empty: s.next().unwrap_or_default(),
            capacity_partial: s.next().unwrap_or_default(),
            map_types: k.next().unwrap_or_default(),
            created_on,
            regions: k.next().unwrap_or_default(),
            servers: k.next().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatsSnapshot {
    pub stat_id: i64,
    pub players: i64,
    pub bots: i64,
    /// Number of servers running with the anti-cheat flag set.
    pub secure: i64,
    pub servers_community: i64,
    pub servers_total: i64,
    pub capacity_full: i64,
    pub capacity_empty: i64,
    pub capacity_partial: i64,
    pub map_types: KeyedCounts,
    pub created_on: DateTime<Utc>,
    pub regions: KeyedCounts,
}

impl GlobalStatsSnapshot {
    pub fn new(created_on: DateTime<Utc>) -> Self {
        Self {
            created_on,
            ..Default::default()
        }
    }
}

impl StatSample for GlobalStatsSnapshot {
    const LOCALITY: StatLocality = StatLocality::Global;
    const SCALAR_COLUMNS: &'static [&'static str] = &[
        "players",
        "bots",
        "secure",
        "servers_community",
        "servers_total",
        "capacity_full",
        "capacity_empty",
        "capacity_partial",
    ];
    const KEYED_COLUMNS: &'static [&'static str] = &["map_types", "regions"];

    fn stat_id(&self) -> i64 {
        self.stat_id
    }

    fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    fn scalars(&self) -> Vec<i64> {
        vec![
            self.players,
            self.bots,
            self.secure,
            self.servers_community,
            self.servers_total,
            self.capacity_full,
            self.capacity_empty,
            self.capacity_partial,
        ]
    }

    fn keyed(&self) -> Vec<&KeyedCounts> {
        vec![&self.map_types, &self.regions]
    }

    fn from_columns(
        stat_id: i64,
        created_on: DateTime<Utc>,
        scalars: Vec<i64>,
        keyed: Vec<KeyedCounts>,
    ) -> Self {
        let mut s = scalars.into_iter();
        let mut k = keyed.into_iter();
        Self {
            stat_id,
            players: s.next().unwrap_or_default(),
            bots: s.next().unwrap_or_default(),
            secure: s.next().unwrap_or_default(),
            servers_community: s.next().unwrap_or_default(),
            servers_total: s.next().unwrap_or_default(),
            capacity_full: s.next().unwrap_or_default(),
            capacity_empty: s.next().unwrap_or_default(),
            capacity_partial: s.next().unwrap_or_default(),
            map_types: k.next().unwrap_or_default(),
            created_on,
            regions: k.next().unwrap_or_default(),
        }
    }
}

/// Result of a locality-agnostic stats read.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "locality", content = "stats", rename_all = "lowercase")]
pub enum StatsSeries {
    Local(Vec<LocalStatsSnapshot>),
    Global(Vec<GlobalStatsSnapshot>),
}

impl StatsSeries {
    pub fn len(&self) -> usize {
        match self {
            StatsSeries::Local(v) => v.len(),
            StatsSeries::Global(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
