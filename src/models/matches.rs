// Completed match with per-player, per-medic and per-team sums.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Person, SteamId};

/// Healing-charge ability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medigun {
    Uber,
    Kritzkrieg,
    Vaccinator,
    QuickFix,
}

impl Medigun {
    pub const ALL: [Medigun; 4] = [
        Medigun::Uber,
        Medigun::Kritzkrieg,
        Medigun::Vaccinator,
        Medigun::QuickFix,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub match_id: i64,
    pub server_id: i64,
    pub map_name: String,
    pub title: String,
    pub created_on: DateTime<Utc>,
    pub player_sums: Vec<MatchPlayerSum>,
    pub medic_sums: Vec<MatchMedicSum>,
    pub team_sums: Vec<MatchTeamSum>,
    /// Filled on read with every participant, medics included.
    #[serde(default)]
    pub players: BTreeMap<SteamId, Person>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayerSum {
    pub match_player_id: i64,
    pub steam_id: SteamId,
    pub team: i32,
    pub time_start: Option<DateTime<Utc>>,
    /// Written as the match time when unset.
    pub time_end: Option<DateTime<Utc>>,
    pub kills: i64,
    pub assists: i64,
    pub deaths: i64,
    pub dominations: i64,
    pub dominated: i64,
    pub revenges: i64,
    pub damage: i64,
    pub damage_taken: i64,
    pub healing: i64,
    pub healing_taken: i64,
    pub health_packs: i64,
    pub backstabs: i64,
    pub headshots: i64,
    pub airshots: i64,
    pub captures: i64,
    pub shots: i64,
    pub extinguishes: i64,
    pub hits: i64,
    pub buildings_built: i64,
    pub buildings_destroyed: i64,
    /// Derived on read, never stored.
    #[serde(default)]
    pub kd_ratio: f64,
    /// Derived on read, never stored.
    #[serde(default)]
    pub kad_ratio: f64,
}

impl MatchPlayerSum {
    /// Fills `kd_ratio` and `kad_ratio`. With zero deaths the ratio is the raw numerator.
    pub fn compute_ratios(&mut self) {
        self.kd_ratio = per_death(self.kills, self.deaths);
        self.kad_ratio = per_death(self.kills + self.assists, self.deaths);
    }
}

fn per_death(numerator: i64, deaths: i64) -> f64 {
    if deaths == 0 {
        numerator as f64
    } else {
        numerator as f64 / deaths as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMedicSum {
    pub match_medic_id: i64,
    pub match_id: i64,
    pub steam_id: SteamId,
    pub healing: i64,
    /// Stored as a single total; on read the whole total is attributed to `Medigun::Uber`.
    pub charges: BTreeMap<Medigun, i64>,
    pub drops: i64,
    pub avg_time_to_build: i64,
    pub avg_time_before_use: i64,
    pub near_full_charge_death: i64,
    pub avg_uber_length: f64,
    pub death_after_charge: i64,
    pub major_adv_lost: i64,
    pub biggest_adv_lost: i64,
}

impl MatchMedicSum {
    pub fn total_charges(&self) -> i64 {
        self.charges.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTeamSum {
    pub match_team_id: i64,
    pub match_id: i64,
    /// Ignored on write: the team number is the sum's 1-based position in `Match::team_sums`.
    pub team: i32,
    pub kills: i64,
    pub damage: i64,
    pub charges: i64,
    pub drops: i64,
    pub caps: i64,
    pub mid_fights: i64,
}

/// One row of a match listing: the match plus sums over all of its players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub match_id: i64,
    pub server_id: i64,
    pub map_name: String,
    pub created_on: DateTime<Utc>,
    pub kills: i64,
    pub assists: i64,
    pub damage: i64,
    pub healing: i64,
    pub airshots: i64,
}

/// Listing filter. An empty map name means any map; a limit of 0 means no limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchesQuery {
    pub map_name: Option<String>,
    pub steam_id: Option<SteamId>,
    pub sort_desc: bool,
    pub limit: u32,
}
