mod common;

use std::sync::Arc;

use common::{at, counts, global, local, test_pool};
use serverstats::clock::FixedClock;
use serverstats::error::StoreError;
use serverstats::models::{StatDuration, StatLocality};
use serverstats::rollup::{RollupEngine, RollupReport};
use serverstats::stats_repo::StatsRepo;
use serverstats::stats_repo::aggregation::RollupTier;

fn engine(repo: &Arc<StatsRepo>, now: &str) -> RollupEngine {
    RollupEngine::new(repo.clone(), Arc::new(FixedClock(at(now))))
}

#[tokio::test]
async fn live_rows_before_current_hour_roll_into_one_bucket() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    for (ts, players, koth) in [
        ("2024-03-01T10:05:00Z", 10, 2),
        ("2024-03-01T10:40:00Z", 20, 4),
        ("2024-03-01T11:10:00Z", 30, 6),
    ] {
        repo.save_local_stats(StatDuration::Live, &local(ts, players, &[("koth", koth)]))
            .await
            .unwrap();
    }

    let report = engine(&repo, "2024-03-01T11:30:00Z")
        .run_rollup(StatLocality::Local, StatDuration::Live, StatDuration::Hourly)
        .await
        .unwrap();
    assert_eq!(
        report,
        RollupReport {
            fetched: 2,
            written: 1,
            duplicates: 0,
            deleted: 2,
        }
    );

    let hourly = repo.get_local_stats(StatDuration::Hourly).await.unwrap();
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].created_on, at("2024-03-01T10:00:00Z"));
    assert_eq!(hourly[0].players, 15);
    assert_eq!(hourly[0].map_types, counts(&[("koth", 3)]));
    assert_eq!(hourly[0].regions, counts(&[("eu", 15)]));

    let live = repo.get_local_stats(StatDuration::Live).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].created_on, at("2024-03-01T11:10:00Z"));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    repo.save_local_stats(StatDuration::Live, &local("2024-03-01T10:05:00Z", 10, &[]))
        .await
        .unwrap();
    let engine = engine(&repo, "2024-03-01T11:30:00Z");

    engine
        .run_rollup(StatLocality::Local, StatDuration::Live, StatDuration::Hourly)
        .await
        .unwrap();
    let again = engine
        .run_rollup(StatLocality::Local, StatDuration::Live, StatDuration::Hourly)
        .await
        .unwrap();

    assert_eq!(again, RollupReport::default());
    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 1);
}

#[tokio::test]
async fn existing_bucket_is_skipped_and_source_still_consumed() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    // Left behind by a run that wrote the bucket but died before deleting its input.
    repo.save_local_stats(StatDuration::Hourly, &local("2024-03-01T10:00:00Z", 15, &[]))
        .await
        .unwrap();
    for (ts, players) in [("2024-03-01T10:05:00Z", 10), ("2024-03-01T10:40:00Z", 20)] {
        repo.save_local_stats(StatDuration::Live, &local(ts, players, &[]))
            .await
            .unwrap();
    }

    let report = engine(&repo, "2024-03-01T11:30:00Z")
        .run_rollup(StatLocality::Local, StatDuration::Live, StatDuration::Hourly)
        .await
        .unwrap();

    assert_eq!(report.written, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.deleted, 2);
    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 1);
    assert!(repo.get_local_stats(StatDuration::Live).await.unwrap().is_empty());
}

#[tokio::test]
async fn global_locality_rolls_independently() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    repo.save_global_stats(StatDuration::Live, &global("2024-03-01T10:05:00Z", 100, 40))
        .await
        .unwrap();
    repo.save_global_stats(StatDuration::Live, &global("2024-03-01T10:55:00Z", 300, 80))
        .await
        .unwrap();
    repo.save_local_stats(StatDuration::Live, &local("2024-03-01T10:05:00Z", 10, &[]))
        .await
        .unwrap();

    let report = engine(&repo, "2024-03-01T11:00:00Z")
        .run_rollup(StatLocality::Global, StatDuration::Live, StatDuration::Hourly)
        .await
        .unwrap();
    assert_eq!(report.written, 1);

    let hourly = repo.get_global_stats(StatDuration::Hourly).await.unwrap();
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].players, 200);
    assert_eq!(hourly[0].secure, 60);
    // Local live rows are untouched.
    assert_eq!(repo.get_local_stats(StatDuration::Live).await.unwrap().len(), 1);
}

#[tokio::test]
async fn hourly_rows_roll_into_daily_and_are_kept() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    for (ts, players) in [
        ("2024-03-01T10:00:00Z", 10),
        ("2024-03-01T11:00:00Z", 30),
        ("2024-03-02T09:00:00Z", 50),
    ] {
        repo.save_local_stats(StatDuration::Hourly, &local(ts, players, &[]))
            .await
            .unwrap();
    }

    let report = engine(&repo, "2024-03-02T12:00:00Z")
        .run_rollup(StatLocality::Local, StatDuration::Hourly, StatDuration::Daily)
        .await
        .unwrap();
    assert_eq!(
        report,
        RollupReport {
            fetched: 2,
            written: 1,
            duplicates: 0,
            deleted: 0,
        }
    );

    let daily = repo.get_local_stats(StatDuration::Daily).await.unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].created_on, at("2024-03-01T00:00:00Z"));
    assert_eq!(daily[0].players, 20);

    // Hourly rows stay readable for the dashboard window.
    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 3);
}

#[tokio::test]
async fn daily_rollup_resumes_after_newest_daily_bucket() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    for (ts, players) in [
        ("2024-03-01T10:00:00Z", 10),
        ("2024-03-02T09:00:00Z", 50),
        ("2024-03-02T15:00:00Z", 70),
    ] {
        repo.save_local_stats(StatDuration::Hourly, &local(ts, players, &[]))
            .await
            .unwrap();
    }

    let day_two = engine(&repo, "2024-03-02T12:00:00Z");
    day_two
        .run_rollup(StatLocality::Local, StatDuration::Hourly, StatDuration::Daily)
        .await
        .unwrap();
    let again = day_two
        .run_rollup(StatLocality::Local, StatDuration::Hourly, StatDuration::Daily)
        .await
        .unwrap();
    assert_eq!(again, RollupReport::default());

    let report = engine(&repo, "2024-03-03T01:00:00Z")
        .run_rollup(StatLocality::Local, StatDuration::Hourly, StatDuration::Daily)
        .await
        .unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.written, 1);
    assert_eq!(report.duplicates, 0);

    let daily = repo.get_local_stats(StatDuration::Daily).await.unwrap();
    let days: Vec<_> = daily.iter().map(|d| (d.created_on, d.players)).collect();
    assert_eq!(
        days,
        vec![
            (at("2024-03-02T00:00:00Z"), 60),
            (at("2024-03-01T00:00:00Z"), 10),
        ]
    );
    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 3);
}

#[tokio::test]
async fn unsupported_pair_is_rejected() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    let err = engine(&repo, "2024-03-01T11:30:00Z")
        .run_rollup(StatLocality::Local, StatDuration::Live, StatDuration::Daily)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)), "{err:?}");
}

#[tokio::test]
async fn run_pass_rolls_both_localities() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    repo.save_local_stats(StatDuration::Live, &local("2024-03-01T10:05:00Z", 10, &[]))
        .await
        .unwrap();
    repo.save_global_stats(StatDuration::Live, &global("2024-03-01T10:05:00Z", 100, 40))
        .await
        .unwrap();

    engine(&repo, "2024-03-01T11:30:00Z")
        .run_pass(&[RollupTier::Hourly], std::time::Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 1);
    assert_eq!(repo.get_global_stats(StatDuration::Hourly).await.unwrap().len(), 1);
    assert!(repo.get_local_stats(StatDuration::Live).await.unwrap().is_empty());
    assert!(repo.get_global_stats(StatDuration::Live).await.unwrap().is_empty());
}

#[tokio::test]
async fn run_pass_with_unrepresentable_budget_runs_unbounded() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    repo.save_local_stats(StatDuration::Live, &local("2024-03-01T10:05:00Z", 10, &[]))
        .await
        .unwrap();

    engine(&repo, "2024-03-01T11:30:00Z")
        .run_pass(&[RollupTier::Hourly], std::time::Duration::from_secs(u64::MAX))
        .await
        .unwrap();

    assert_eq!(repo.get_local_stats(StatDuration::Hourly).await.unwrap().len(), 1);
}

#[tokio::test]
async fn elapsed_deadline_leaves_source_rows() {
    let (_dir, pool) = test_pool().await;
    let repo = Arc::new(StatsRepo::new(pool));
    repo.save_local_stats(StatDuration::Live, &local("2024-03-01T10:05:00Z", 10, &[]))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() - std::time::Duration::from_secs(1);
    let err = engine(&repo, "2024-03-01T11:30:00Z")
        .run_rollup_until(
            StatLocality::Local,
            StatDuration::Live,
            StatDuration::Hourly,
            deadline,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DeadlineExceeded), "{err:?}");
    assert_eq!(repo.get_local_stats(StatDuration::Live).await.unwrap().len(), 1);
}
