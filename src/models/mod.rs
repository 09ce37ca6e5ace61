// Domain models: population snapshots, matches, people.

mod matches;
mod person;
mod stats;

pub use matches::{
    Match, MatchMedicSum, MatchPlayerSum, MatchSummary, MatchTeamSum, MatchesQuery, Medigun,
};
pub use person::{Person, SteamId};
pub use stats::{
    GlobalStatsSnapshot, KeyedCounts, LocalStatsSnapshot, StatDuration, StatLocality, StatSample,
    StatsSeries,
};
