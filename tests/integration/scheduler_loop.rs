//! Scheduler loop against the in-memory source.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::time::timeout;

use lms::clock::FixedClock;
use lms::config::SchedulerConfig;
use lms::engine::scheduler::{Scheduler, SchedulerState, WakeReason};
use lms::engine::sync::SyncEngine;
use lms::storage::Store;
use lms::types::FixtureStatus;

use crate::fixture_source::{upstream, StaticSource};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 13, 15, 0, 0).unwrap()
}

async fn scheduler(source: Arc<StaticSource>) -> Scheduler {
    let store = Store::in_memory().await.unwrap();
    let sync = Arc::new(SyncEngine::new(source, StdDuration::from_secs(5)));
    Scheduler::new(
        sync,
        store,
        Arc::new(FixedClock::new(now())),
        SchedulerConfig::default(),
    )
}

#[tokio::test]
async fn test_cycle_plans_from_synced_fixtures() {
    let source = Arc::new(StaticSource::new(
        vec![
            upstream(1, 5, "Arsenal", "Chelsea", now() - Duration::minutes(95)),
            upstream(2, 5, "Everton", "Fulham", now() + Duration::hours(2)),
        ],
        5,
    ));
    source.update(1, FixtureStatus::InPlay, None);

    let next = scheduler(source).await.run_cycle().await;
    assert_eq!(next.reason, WakeReason::FinalWhistle);
    assert_eq!(next.delay, StdDuration::from_secs(300));
}

#[tokio::test]
async fn test_cycle_waits_for_next_kickoff() {
    let source = Arc::new(StaticSource::new(
        vec![upstream(1, 5, "Arsenal", "Chelsea", now() + Duration::hours(2))],
        5,
    ));

    let next = scheduler(source).await.run_cycle().await;
    assert_eq!(next.reason, WakeReason::NextKickoff);
    assert_eq!(next.delay, StdDuration::from_secs(7800));
}

#[tokio::test]
async fn test_failed_cycle_backs_off() {
    let source = Arc::new(StaticSource::new(Vec::new(), 1));

    let next = scheduler(source).await.run_cycle().await;
    assert_eq!(next.reason, WakeReason::Backoff);
    assert_eq!(next.delay, StdDuration::from_secs(300));
}

#[tokio::test]
async fn test_no_current_round_when_matchday_unknown() {
    let source = Arc::new(StaticSource::new(
        vec![upstream(1, 5, "Arsenal", "Chelsea", now() + Duration::hours(2))],
        9,
    ));

    let next = scheduler(source).await.run_cycle().await;
    assert_eq!(next.reason, WakeReason::NoCurrentRound);
}

#[tokio::test]
async fn test_loop_sleeps_then_stops_on_shutdown() {
    let source = Arc::new(StaticSource::new(
        vec![upstream(1, 5, "Arsenal", "Chelsea", now() - Duration::hours(3))],
        5,
    ));
    source.update(1, FixtureStatus::Finished, None);

    let scheduler = scheduler(source.clone()).await;
    let mut state = scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Nothing left to play: the loop settles into a long sleep.
    let until = now() + Duration::seconds(14_400);
    timeout(
        StdDuration::from_secs(5),
        state.wait_for(|s| *s == SchedulerState::Sleeping { until }),
    )
    .await
    .expect("scheduler never slept")
    .unwrap();
    assert_eq!(source.calls(), 1);

    shutdown_tx.send(true).unwrap();
    timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop promptly")
        .unwrap();
    assert_eq!(*state.borrow(), SchedulerState::Stopped);
}
