use serverstats::config::{AppConfig, MAX_DEADLINE_SECS};
use serverstats::stats_repo::aggregation::RollupTier;

#[test]
fn minimal_config_uses_defaults() {
    let config = AppConfig::load_from_str(
        r#"
        [database]
        path = "./data/stats.db"
        "#,
    )
    .unwrap();
    assert_eq!(config.database.max_pool_size, 5);
    assert_eq!(config.rollup.deadline_secs, 60);
    assert!(!config.rollup.roll_daily);
    assert_eq!(config.rollup.tiers(), vec![RollupTier::Hourly]);
}

#[test]
fn roll_daily_adds_the_daily_tier() {
    let config = AppConfig::load_from_str(
        r#"
        [database]
        path = "stats.db"
        max_pool_size = 2

        [rollup]
        deadline_secs = 15
        roll_daily = true
        "#,
    )
    .unwrap();
    assert_eq!(config.rollup.deadline_secs, 15);
    assert_eq!(
        config.rollup.tiers(),
        vec![RollupTier::Hourly, RollupTier::Daily]
    );
}

#[test]
fn rejects_invalid_values() {
    for bad in [
        "[database]\npath = \"\"\n",
        "[database]\npath = \"a.db\"\nmax_pool_size = 0\n",
        "[database]\npath = \"a.db\"\n[rollup]\ndeadline_secs = 0\n",
    ] {
        assert!(AppConfig::load_from_str(bad).is_err(), "accepted: {bad}");
    }
}

#[test]
fn missing_database_section_fails() {
    assert!(AppConfig::load_from_str("[rollup]\nroll_daily = true\n").is_err());
}

#[test]
fn deadline_is_bounded_above() {
    let at_max = format!("[database]\npath = \"a.db\"\n[rollup]\ndeadline_secs = {MAX_DEADLINE_SECS}\n");
    assert!(AppConfig::load_from_str(&at_max).is_ok());

    for too_long in [MAX_DEADLINE_SECS + 1, u64::MAX] {
        let toml = format!("[database]\npath = \"a.db\"\n[rollup]\ndeadline_secs = {too_long}\n");
        assert!(AppConfig::load_from_str(&toml).is_err(), "accepted {too_long}");
    }
}
