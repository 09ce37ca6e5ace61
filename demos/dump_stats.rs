// Dump stored population stats as JSON, newest first.
//
// Usage: cargo run --example dump_stats -- [DB_PATH] [LOCALITY] [DURATION]
//   DB_PATH   default: ./data/stats.db
//   LOCALITY  local | global (default: global)
//   DURATION  live | hourly | daily (default: hourly)

use serverstats::config::DatabaseConfig;
use serverstats::models::{StatDuration, StatLocality};
use serverstats::{db, stats_repo::StatsRepo};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(String::as_str).unwrap_or("./data/stats.db");
    let locality: StatLocality = args.get(2).map(String::as_str).unwrap_or("global").parse()?;
    let duration: StatDuration = args.get(3).map(String::as_str).unwrap_or("hourly").parse()?;

    let pool = db::connect(&DatabaseConfig {
        path: path.to_string(),
        max_pool_size: 1,
    })
    .await?;
    let repo = StatsRepo::new(pool);
    let stats = repo.get_stats(locality, duration).await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
