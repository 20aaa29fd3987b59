//! Fixture sync: reconciles the upstream feed into the store.
//!
//! One sync cycle fetches the whole season from the `FixtureSource`,
//! upserts rounds and fixtures, writes scores (respecting historic
//! protection), applies live eliminations for the current round, and
//! commits everything as a single transaction.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::data::FixtureSource;
use crate::engine::resolution;
use crate::storage::{Store, StoreTx, Upserted};
use crate::types::{LmsError, Result, RoundId, UpstreamFixture, UserId, Winner};

// ---------------------------------------------------------------------------
// Sync summary
// ---------------------------------------------------------------------------

/// What one sync cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Matchday the source reported as current.
    pub current_matchday: RoundId,
    pub fixtures_seen: usize,
    pub rounds_created: usize,
    pub fixtures_created: usize,
    /// Existing fixtures whose status or kickoff changed.
    pub fixtures_updated: usize,
    pub scores_written: usize,
    /// Users knocked out by the live-results pass.
    pub users_eliminated: Vec<UserId>,
}

impl SyncSummary {
    /// True when nothing but the current-round flags could have changed.
    pub fn is_noop(&self) -> bool {
        self.rounds_created == 0
            && self.fixtures_created == 0
            && self.fixtures_updated == 0
            && self.scores_written == 0
            && self.users_eliminated.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sync engine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    source: Arc<dyn FixtureSource>,
    /// Bound on each upstream call.
    source_timeout: Duration,
    /// Held for the duration of a cycle so two cycles never overlap.
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn FixtureSource>, source_timeout: Duration) -> Self {
        Self {
            source,
            source_timeout,
            running: Mutex::new(()),
        }
    }

    /// Run one full sync cycle.
    ///
    /// Fails with `UpstreamUnavailable` (and writes nothing) if the source
    /// errors, times out, or returns no fixtures.
    pub async fn sync(&self, store: &Store) -> Result<SyncSummary> {
        let _running = self.running.lock().await;

        let (fixtures, current_matchday) = self.fetch().await?;
        let mut summary = SyncSummary {
            current_matchday,
            fixtures_seen: fixtures.len(),
            ..SyncSummary::default()
        };

        let mut tx = store.begin().await?;
        for upstream in &fixtures {
            reconcile_fixture(&mut tx, upstream, current_matchday, &mut summary).await?;
        }

        // Rounds absent from this batch must not keep a stale current flag.
        if tx.get_round(current_matchday).await?.is_some() {
            let cleared = tx.clear_current_except(current_matchday).await?;
            if cleared > 0 {
                debug!(cleared, current_matchday, "Cleared stale current-round flags");
            }
        }

        summary.users_eliminated = resolution::apply_live_results(&mut tx).await?;
        tx.commit().await?;

        info!(
            current_matchday,
            seen = summary.fixtures_seen,
            rounds_created = summary.rounds_created,
            fixtures_created = summary.fixtures_created,
            fixtures_updated = summary.fixtures_updated,
            scores_written = summary.scores_written,
            eliminated = summary.users_eliminated.len(),
            "Fixture sync complete"
        );
        Ok(summary)
    }

    async fn fetch(&self) -> Result<(Vec<UpstreamFixture>, RoundId)> {
        let fixtures = timeout(self.source_timeout, self.source.list_fixtures())
            .await
            .map_err(|_| timed_out("list fixtures", self.source_timeout))??;

        if fixtures.is_empty() {
            return Err(LmsError::UpstreamUnavailable(
                "no fixtures returned from source".into(),
            ));
        }

        let current = timeout(self.source_timeout, self.source.current_matchday())
            .await
            .map_err(|_| timed_out("current matchday", self.source_timeout))??;

        Ok((fixtures, current))
    }
}

fn timed_out(call: &str, after: Duration) -> LmsError {
    LmsError::UpstreamUnavailable(format!("{call} timed out after {}s", after.as_secs()))
}

/// Apply one upstream record: round upsert, fixture upsert, scores.
async fn reconcile_fixture(
    tx: &mut StoreTx,
    upstream: &UpstreamFixture,
    current_matchday: RoundId,
    summary: &mut SyncSummary,
) -> Result<()> {
    let is_current = upstream.matchday == current_matchday;

    match tx
        .find_or_create_round(upstream.matchday, upstream.kickoff, is_current)
        .await?
    {
        Upserted::Created(round) => {
            debug!(round = round.id, deadline = %round.deadline, "Round created");
            summary.rounds_created += 1;
        }
        Upserted::Existing(round) => {
            // Deadlines only ever move earlier.
            if upstream.kickoff < round.deadline {
                tx.set_round_deadline(round.id, upstream.kickoff).await?;
            }
            tx.set_round_current(round.id, is_current).await?;
        }
    }

    let fixture = match tx.find_or_create_fixture(upstream).await? {
        Upserted::Created(fixture) => {
            summary.fixtures_created += 1;
            fixture
        }
        Upserted::Existing(mut fixture) => {
            if fixture.status != upstream.status || fixture.kickoff != upstream.kickoff {
                tx.update_fixture_schedule(fixture.id, &upstream.status, upstream.kickoff)
                    .await?;
                fixture.status = upstream.status.clone();
                fixture.kickoff = upstream.kickoff;
                summary.fixtures_updated += 1;
            }
            fixture
        }
    };

    let Some(score) = upstream.full_time else {
        return Ok(());
    };

    // Completed history keeps whatever score was first recorded.
    let is_historic = upstream.matchday < current_matchday;
    if is_historic && fixture.score.is_some() {
        return Ok(());
    }
    if fixture.score == Some(score) {
        return Ok(());
    }

    let winner = Winner::from_score(&fixture.home_team, &fixture.away_team, score);
    tx.set_fixture_result(fixture.id, score, &winner).await?;
    debug!(fixture = fixture.id, %score, %winner, "Score recorded");
    summary.scores_written += 1;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
