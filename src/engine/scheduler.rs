//! Adaptive fixture-sync scheduler.
//!
//! A single long-lived loop: sync, work out how long to sleep from the
//! current round's fixtures, sleep, repeat. Polls often while matches are
//! in play and backs right off between rounds. A failed cycle is logged
//! and retried after a fixed backoff; the loop itself only ends on the
//! shutdown signal.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::engine::sync::SyncEngine;
use crate::storage::Store;
use crate::types::{Fixture, FixtureStatus, Result, Round};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// What the scheduler loop is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Syncing,
    Sleeping { until: DateTime<Utc> },
    Stopped,
}

/// Why the scheduler chose its next delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeReason {
    NoCurrentRound,
    /// A fixture is in play and its expected end is far off.
    InPlay,
    /// A fixture in play is about to end; wake at the expected final whistle.
    FinalWhistle,
    /// Wake shortly after the next kickoff.
    NextKickoff,
    /// The next fixture should already have kicked off upstream.
    KickoffOverdue,
    /// Nothing left to play in the current round.
    Dormant,
    /// The last cycle failed.
    Backoff,
}

/// A computed sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextRun {
    pub delay: Duration,
    pub reason: WakeReason,
}

impl NextRun {
    fn new(delay: Duration, reason: WakeReason) -> Self {
        Self { delay, reason }
    }
}

/// The current round and its fixtures, as read after a sync.
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    pub round: Round,
    pub fixtures: Vec<Fixture>,
}

// ---------------------------------------------------------------------------
// Delay policy
// ---------------------------------------------------------------------------

/// Decide how long to sleep before the next sync.
pub fn next_delay(
    config: &SchedulerConfig,
    snapshot: Option<&RoundSnapshot>,
    now: DateTime<Utc>,
) -> NextRun {
    let Some(snapshot) = snapshot else {
        return NextRun::new(secs(config.no_round_secs), WakeReason::NoCurrentRound);
    };

    let match_length = ChronoDuration::minutes(config.match_length_mins);
    let soonest_end = snapshot
        .fixtures
        .iter()
        .filter(|f| f.status == FixtureStatus::InPlay)
        .map(|f| f.kickoff + match_length)
        .min();

    if let Some(end) = soonest_end {
        let remaining = end - now;
        if remaining > ChronoDuration::seconds(config.in_play_poll_secs as i64) {
            return NextRun::new(secs(config.in_play_poll_secs), WakeReason::InPlay);
        }
        let floor = secs(config.min_sleep_secs);
        // A negative remainder (overrunning match) fails conversion: use the floor.
        let delay = remaining.to_std().map(|d| d.max(floor)).unwrap_or(floor);
        return NextRun::new(delay, WakeReason::FinalWhistle);
    }

    let next_kickoff = snapshot
        .fixtures
        .iter()
        .filter(|f| f.status.is_upcoming())
        .map(|f| f.kickoff)
        .min();

    match next_kickoff {
        Some(kickoff) => {
            let target = kickoff + ChronoDuration::minutes(config.post_kickoff_mins);
            match (target - now).to_std() {
                Ok(wait) if !wait.is_zero() => NextRun::new(wait, WakeReason::NextKickoff),
                _ => NextRun::new(secs(config.overdue_retry_secs), WakeReason::KickoffOverdue),
            }
        }
        None => NextRun::new(secs(config.dormant_secs), WakeReason::Dormant),
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    sync: Arc<SyncEngine>,
    store: Store,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        sync: Arc<SyncEngine>,
        store: Store,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            sync,
            store,
            clock,
            config,
            state,
        }
    }

    /// Observe state transitions from another task.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }

    /// Run one sync and plan the next wake-up. Never fails: errors turn
    /// into the backoff delay.
    pub async fn run_cycle(&self) -> NextRun {
        self.state.send_replace(SchedulerState::Syncing);

        let planned = match self.sync.sync(&self.store).await {
            Ok(_) => self.plan().await,
            Err(e) => Err(e),
        };

        planned.unwrap_or_else(|e| {
            error!(error = %e, backoff_secs = self.config.error_backoff_secs, "Sync cycle failed, backing off");
            NextRun::new(secs(self.config.error_backoff_secs), WakeReason::Backoff)
        })
    }

    async fn plan(&self) -> Result<NextRun> {
        let mut tx = self.store.begin().await?;
        let snapshot = match tx.current_round().await? {
            Some(round) => {
                let fixtures = tx.fixtures_for_round(round.id).await?;
                Some(RoundSnapshot { round, fixtures })
            }
            None => None,
        };
        drop(tx);

        let next = next_delay(&self.config, snapshot.as_ref(), self.clock.now());
        debug!(
            round = ?snapshot.as_ref().map(|s| s.round.id),
            delay_secs = next.delay.as_secs(),
            reason = ?next.reason,
            "Next sync planned"
        );
        Ok(next)
    }

    /// Loop until `shutdown` flips to true (or its sender is dropped).
    /// Consumes the scheduler so only one loop can ever run.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Fixture scheduler started");

        while !*shutdown.borrow() {
            let next = self.run_cycle().await;

            let until = self.clock.now()
                + ChronoDuration::from_std(next.delay).unwrap_or_else(|_| ChronoDuration::zero());
            self.state.send_replace(SchedulerState::Sleeping { until });
            info!(
                delay_secs = next.delay.as_secs(),
                reason = ?next.reason,
                until = %until,
                "Scheduler sleeping"
            );

            tokio::select! {
                _ = tokio::time::sleep(next.delay) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown signal received by scheduler");
                    break;
                }
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("Fixture scheduler stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
