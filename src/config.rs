use serde::Deserialize;

use crate::stats_repo::aggregation::RollupTier;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

fn default_max_pool_size() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    /// Upper bound on one (locality, tier) run, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Also roll hourly rows into daily ones. Hourly rows are kept; the newest daily row
    /// marks how far the daily tier has progressed.
    #[serde(default)]
    pub roll_daily: bool,
}

fn default_deadline_secs() -> u64 {
    60
}

/// One day. Longer budgets make no sense for a single pass.
pub const MAX_DEADLINE_SECS: u64 = 86_400;

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            roll_daily: false,
        }
    }
}

impl RollupConfig {
    /// Tiers to run, finest first.
    pub fn tiers(&self) -> Vec<RollupTier> {
        let mut tiers = vec![RollupTier::Hourly];
        if self.roll_daily {
            tiers.push(RollupTier::Daily);
        }
        tiers
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            (1..=MAX_DEADLINE_SECS).contains(&self.rollup.deadline_secs),
            "rollup.deadline_secs must be in 1..={MAX_DEADLINE_SECS}, got {}",
            self.rollup.deadline_secs
        );
        Ok(())
    }
}
