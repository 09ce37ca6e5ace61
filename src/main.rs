// One invocation = one rollup pass over both localities. Cadence comes from an external timer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serverstats::clock::SystemClock;
use serverstats::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(UtcTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let pool = db::connect(&app_config.database).await?;
    db::init_schema(&pool).await?;

    let engine = rollup::RollupEngine::new(
        Arc::new(stats_repo::StatsRepo::new(pool.clone())),
        Arc::new(SystemClock),
    );
    let result = engine
        .run_pass(
            &app_config.rollup.tiers(),
            Duration::from_secs(app_config.rollup.deadline_secs),
        )
        .await;

    pool.close().await;
    result?;
    tracing::info!("rollup pass complete");
    Ok(())
}
