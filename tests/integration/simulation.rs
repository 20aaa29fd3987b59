//! Season simulation.
//!
//! Drives two rounds end to end through the public facade: sync, picks,
//! live eliminations, finalize, roll-over, historic protection and a
//! re-entry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use lms::clock::FixedClock;
use lms::engine::competition::Competition;
use lms::engine::sync::SyncEngine;
use lms::storage::Store;
use lms::types::{FixtureStatus, LmsError, PickRejection, Score, Winner};

use crate::fixture_source::{upstream, StaticSource};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 14, 9, 0, 0).unwrap()
}

fn season_source() -> StaticSource {
    let r1 = start() + Duration::days(1);
    let r2 = start() + Duration::days(8);
    StaticSource::new(
        vec![
            upstream(11, 1, "Arsenal", "Chelsea", r1),
            upstream(12, 1, "Everton", "Fulham", r1 + Duration::hours(3)),
            upstream(21, 2, "Chelsea", "Everton", r2),
            upstream(22, 2, "Fulham", "Arsenal", r2),
        ],
        1,
    )
}

async fn setup() -> (Competition, Arc<StaticSource>, Arc<FixedClock>) {
    let store = Store::in_memory().await.unwrap();
    let source = Arc::new(season_source());
    let clock = Arc::new(FixedClock::new(start()));
    let sync = Arc::new(SyncEngine::new(source.clone(), StdDuration::from_secs(5)));
    (Competition::new(store, sync, clock.clone()), source, clock)
}

#[tokio::test]
async fn test_two_round_season() {
    let (lms, source, clock) = setup().await;

    // -- Initial sync ----------------------------------------------------

    let summary = lms.sync_now().await.unwrap();
    assert_eq!(summary.rounds_created, 2);
    assert_eq!(summary.fixtures_created, 4);
    let current = lms.current_fixtures().await.unwrap().unwrap();
    assert_eq!(current.round.id, 1);
    assert_eq!(current.round.deadline, start() + Duration::days(1));
    assert_eq!(current.fixtures.len(), 2);

    // Identical batch: nothing to write.
    assert!(lms.sync_now().await.unwrap().is_noop());

    // -- Picks -----------------------------------------------------------

    let alice = lms.create_user("Alice", false).await.unwrap();
    let bob = lms.create_user("Bob", false).await.unwrap();
    let carol = lms.create_user("Carol", false).await.unwrap();
    lms.submit_pick(alice.id, "Arsenal").await.unwrap();
    lms.submit_pick(bob.id, "Chelsea").await.unwrap();

    // -- Results arrive --------------------------------------------------

    clock.set(start() + Duration::days(1) + Duration::hours(2));
    source.update(11, FixtureStatus::Finished, Some(Score::new(2, 0)));
    source.update(12, FixtureStatus::Postponed, None);

    let summary = lms.sync_now().await.unwrap();
    assert_eq!(summary.fixtures_updated, 2);
    assert_eq!(summary.scores_written, 1);
    assert_eq!(summary.users_eliminated, vec![bob.id]);

    let err = lms.submit_pick(carol.id, "Everton").await.unwrap_err();
    assert!(matches!(
        err,
        LmsError::ValidationRejected(PickRejection::DeadlinePassed)
    ));

    // -- Finalize round 1 ------------------------------------------------

    let outcome = lms.finalize_round(1).await.unwrap();
    assert_eq!(outcome.eliminated, vec![carol.id]);
    assert_eq!(outcome.new_current, Some(2));
    assert!(matches!(
        lms.finalize_round(1).await.unwrap_err(),
        LmsError::AlreadyProcessed(1)
    ));

    let standings = lms.standings(None).await.unwrap();
    assert_eq!(standings.round_id, Some(2));
    let alive: Vec<_> = standings.entries.iter().filter(|e| e.is_active).collect();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].user_id, alice.id);

    // -- Round 2 ---------------------------------------------------------

    source.set_matchday(2);
    // A late upstream correction to a completed round is ignored.
    source.update(11, FixtureStatus::Finished, Some(Score::new(3, 0)));
    let summary = lms.sync_now().await.unwrap();
    assert_eq!(summary.scores_written, 0);

    let mut tx = lms.store().begin().await.unwrap();
    let f11 = tx.get_fixture(11).await.unwrap().unwrap();
    assert_eq!(f11.score, Some(Score::new(2, 0)));
    assert_eq!(f11.winner, Some(Winner::Team("Arsenal".into())));
    assert!(!tx.require_round(1).await.unwrap().is_current);
    assert!(tx.require_round(2).await.unwrap().is_current);
    drop(tx);

    let err = lms.submit_pick(alice.id, "Arsenal").await.unwrap_err();
    assert!(matches!(
        err,
        LmsError::ValidationRejected(PickRejection::TeamAlreadyUsed(_))
    ));
    lms.submit_pick(alice.id, "Fulham").await.unwrap();

    // Bob comes back in; his round 1 team is usable once more.
    lms.grant_re_entry(bob.id, 1).await.unwrap();
    lms.submit_pick(bob.id, "Chelsea").await.unwrap();

    let history = lms.pick_history(bob.id).await.unwrap();
    let outcomes: Vec<String> = history.iter().map(|h| h.outcome.to_string()).collect();
    assert_eq!(outcomes, vec!["LOST", "Pending"]);
}

#[tokio::test]
async fn test_failed_sync_writes_nothing() {
    let (lms, source, _) = setup().await;
    source.set_failing(true);

    let err = lms.sync_now().await.unwrap_err();
    assert!(matches!(err, LmsError::UpstreamUnavailable(_)));
    assert!(lms.rounds().await.unwrap().is_empty());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_postponed_round_eliminates_only_non_pickers() {
    let (lms, source, clock) = setup().await;
    lms.sync_now().await.unwrap();

    let alice = lms.create_user("Alice", false).await.unwrap();
    let bob = lms.create_user("Bob", false).await.unwrap();
    lms.submit_pick(alice.id, "Everton").await.unwrap();

    clock.set(start() + Duration::days(2));
    source.update(11, FixtureStatus::Postponed, None);
    source.update(12, FixtureStatus::Postponed, None);
    lms.sync_now().await.unwrap();

    let outcome = lms.finalize_round(1).await.unwrap();
    assert_eq!(outcome.eliminated, vec![bob.id]);

    let history = lms.pick_history(alice.id).await.unwrap();
    assert_eq!(history[0].outcome.to_string(), "THROUGH (Postponed)");
}
