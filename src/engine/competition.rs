//! Competition: the operator and player entry points.
//!
//! Each method is one logical operation: it opens a store transaction,
//! does its reads and writes, and commits. Any error drops the
//! transaction, which rolls everything back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::engine::resolution::{judge_pick, FinalizeOutcome, PickOutcome, ResolutionEngine};
use crate::engine::scheduler::RoundSnapshot;
use crate::engine::sync::{SyncEngine, SyncSummary};
use crate::storage::{Store, Upserted};
use crate::types::{
    fixture_for_team, Fixture, LmsError, Pick, Result, Round, RoundId, User, UserId,
};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One line of an operator batch. `None` clears the user's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickAssignment {
    pub user_id: UserId,
    pub team_name: Option<String>,
}

impl PickAssignment {
    pub fn set(user_id: UserId, team_name: &str) -> Self {
        Self {
            user_id,
            team_name: Some(team_name.to_string()),
        }
    }

    pub fn clear(user_id: UserId) -> Self {
        Self {
            user_id,
            team_name: None,
        }
    }
}

/// What a batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub set: usize,
    pub cleared: usize,
    /// Assignments naming a team that plays no fixture in the round.
    pub skipped: Vec<PickAssignment>,
}

/// A non-admin user and their pick for some round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundPickEntry {
    pub user_id: UserId,
    pub user_name: String,
    pub is_active: bool,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingEntry {
    pub user_id: UserId,
    pub name: String,
    pub is_active: bool,
    /// `None` when there is no pick or it is still hidden from the viewer.
    pub current_pick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standings {
    pub round_id: Option<RoundId>,
    pub entries: Vec<StandingEntry>,
}

/// A pick's outcome as shown in a user's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryOutcome {
    Won,
    Lost,
    InPlay,
    Postponed,
    /// Postponed in a round that has since been finalized: survived.
    ThroughPostponed,
    Pending,
}

impl HistoryOutcome {
    fn from_pick(outcome: PickOutcome, round_processed: bool) -> Self {
        match outcome {
            PickOutcome::Won => Self::Won,
            PickOutcome::Lost => Self::Lost,
            PickOutcome::InPlay => Self::InPlay,
            PickOutcome::Void if round_processed => Self::ThroughPostponed,
            PickOutcome::Void => Self::Postponed,
            PickOutcome::Pending => Self::Pending,
        }
    }
}

impl fmt::Display for HistoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::InPlay => "In Play",
            Self::Postponed => "POSTPONED",
            Self::ThroughPostponed => "THROUGH (Postponed)",
            Self::Pending => "Pending",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub round_id: RoundId,
    pub team_name: String,
    pub outcome: HistoryOutcome,
    pub is_processed: bool,
}

// ---------------------------------------------------------------------------
// Competition
// ---------------------------------------------------------------------------

pub struct Competition {
    store: Store,
    sync: Arc<SyncEngine>,
    resolution: ResolutionEngine,
    clock: Arc<dyn Clock>,
}

impl Competition {
    pub fn new(store: Store, sync: Arc<SyncEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            sync,
            resolution: ResolutionEngine::new(Arc::clone(&clock)),
            clock,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -- operator: rounds --

    /// Run a sync cycle immediately, outside the scheduler's timing.
    pub async fn sync_now(&self) -> Result<SyncSummary> {
        self.sync.sync(&self.store).await
    }

    pub async fn finalize_round(&self, round_id: RoundId) -> Result<FinalizeOutcome> {
        let mut tx = self.store.begin().await?;
        let outcome = self.resolution.finalize_round(&mut tx, round_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn rounds(&self) -> Result<Vec<Round>> {
        self.store.begin().await?.list_rounds().await
    }

    pub async fn round_fixtures(&self, round_id: RoundId) -> Result<Vec<Fixture>> {
        let mut tx = self.store.begin().await?;
        tx.require_round(round_id).await?;
        tx.fixtures_for_round(round_id).await
    }

    /// Every non-admin user with their pick for `round_id`, if any.
    pub async fn round_picks(&self, round_id: RoundId) -> Result<Vec<RoundPickEntry>> {
        let mut tx = self.store.begin().await?;
        tx.require_round(round_id).await?;
        let mut picks = picks_by_user(tx.picks_for_round(round_id).await?);

        let entries = tx
            .list_users()
            .await?
            .into_iter()
            .filter(|u| !u.is_admin)
            .map(|u| RoundPickEntry {
                team_name: picks.remove(&u.id).map(|p| p.team_name),
                user_id: u.id,
                user_name: u.name,
                is_active: u.is_active,
            })
            .collect();
        Ok(entries)
    }

    /// Operator override of picks for a round. Deadline and reuse rules do
    /// not apply; teams must still play in the round.
    pub async fn batch_set_picks(
        &self,
        round_id: RoundId,
        assignments: Vec<PickAssignment>,
    ) -> Result<BatchSummary> {
        let mut tx = self.store.begin().await?;
        tx.require_round(round_id).await?;
        let fixtures = tx.fixtures_for_round(round_id).await?;
        let now = self.clock.now();
        let mut summary = BatchSummary::default();

        for assignment in assignments {
            tx.require_user(assignment.user_id).await?;

            let Some(team_name) = assignment.team_name.as_deref() else {
                if tx.delete_pick(assignment.user_id, round_id).await? {
                    summary.cleared += 1;
                }
                continue;
            };

            if fixture_for_team(&fixtures, team_name).is_none() {
                warn!(round = round_id, user = assignment.user_id, team = team_name, "Batch pick skipped: team not in round");
                summary.skipped.push(assignment);
                continue;
            }

            let existing = tx.get_pick(assignment.user_id, round_id).await?;
            if existing.is_some_and(|p| p.team_name == team_name) {
                continue;
            }
            tx.upsert_pick(assignment.user_id, round_id, team_name, now).await?;
            summary.set += 1;
        }

        tx.commit().await?;
        info!(
            round = round_id,
            set = summary.set,
            cleared = summary.cleared,
            skipped = summary.skipped.len(),
            "Batch picks applied"
        );
        Ok(summary)
    }

    // -- operator: users --

    pub async fn create_user(&self, name: &str, is_admin: bool) -> Result<User> {
        let mut tx = self.store.begin().await?;
        let user = tx.create_user(name, is_admin).await?;
        tx.commit().await?;
        info!(user = user.id, name, is_admin, "User created");
        Ok(user)
    }

    /// Create the named administrator unless an admin of that name exists.
    pub async fn ensure_admin(&self, name: &str) -> Result<Upserted<User>> {
        let mut tx = self.store.begin().await?;
        if let Some(admin) = tx.list_admins().await?.into_iter().find(|u| u.name == name) {
            return Ok(Upserted::Existing(admin));
        }
        let admin = tx.create_user(name, true).await?;
        tx.commit().await?;
        info!(user = admin.id, name, "Admin created");
        Ok(Upserted::Created(admin))
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.store.begin().await?.list_users().await
    }

    /// Remove a user and all their picks. Admins cannot be deleted.
    pub async fn delete_user(&self, user_id: UserId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let user = tx.require_user(user_id).await?;
        if user.is_admin {
            return Err(LmsError::Forbidden("cannot delete an admin user".into()));
        }
        let picks = tx.delete_picks_for_user(user_id).await?;
        tx.delete_user(user_id).await?;
        tx.commit().await?;
        info!(user = user_id, picks, "User deleted");
        Ok(())
    }

    /// Bring an eliminated user back, their new entry starting at
    /// `entry_round`.
    pub async fn grant_re_entry(&self, user_id: UserId, entry_round: RoundId) -> Result<User> {
        let mut tx = self.store.begin().await?;
        let user = tx.require_user(user_id).await?;
        if user.is_admin {
            return Err(LmsError::Forbidden("admins do not compete".into()));
        }
        if user.is_active {
            return Err(LmsError::Forbidden(format!("{} is still active", user.name)));
        }
        tx.require_round(entry_round).await?;

        tx.record_re_entry(user_id, entry_round).await?;
        let user = tx.require_user(user_id).await?;
        tx.commit().await?;
        info!(user = user_id, entry_round, re_entries = user.re_entry_count, "Re-entry granted");
        Ok(user)
    }

    // -- player --

    /// Validate and save `team_name` as the user's pick for the current
    /// round, replacing any earlier pick for that round.
    pub async fn submit_pick(&self, user_id: UserId, team_name: &str) -> Result<Pick> {
        let mut tx = self.store.begin().await?;
        let user = tx.require_user(user_id).await?;
        let round = self.resolution.validate_pick(&mut tx, &user, team_name).await?;
        let pick = tx
            .upsert_pick(user.id, round.id, team_name, self.clock.now())
            .await?;
        tx.commit().await?;
        info!(user = user.id, round = round.id, team = team_name, "Pick saved");
        Ok(pick)
    }

    /// The current round and its fixtures in kickoff order.
    pub async fn current_fixtures(&self) -> Result<Option<RoundSnapshot>> {
        let mut tx = self.store.begin().await?;
        let Some(round) = tx.current_round().await? else {
            return Ok(None);
        };
        let fixtures = tx.fixtures_for_round(round.id).await?;
        Ok(Some(RoundSnapshot { round, fixtures }))
    }

    /// Every non-admin user with their current-round pick. With a viewer,
    /// other users' picks stay hidden until the deadline passes; the public
    /// view (`None`) shows everything.
    pub async fn standings(&self, viewer: Option<UserId>) -> Result<Standings> {
        let mut tx = self.store.begin().await?;
        let round = tx.current_round().await?;
        let mut picks = match &round {
            Some(r) => picks_by_user(tx.picks_for_round(r.id).await?),
            None => HashMap::new(),
        };
        let revealed = round
            .as_ref()
            .is_some_and(|r| r.deadline_passed(self.clock.now()));

        let entries = tx
            .list_users()
            .await?
            .into_iter()
            .filter(|u| !u.is_admin)
            .map(|u| {
                let visible = viewer.is_none() || revealed || viewer == Some(u.id);
                StandingEntry {
                    current_pick: picks
                        .remove(&u.id)
                        .filter(|_| visible)
                        .map(|p| p.team_name),
                    user_id: u.id,
                    name: u.name,
                    is_active: u.is_active,
                }
            })
            .collect();

        Ok(Standings {
            round_id: round.map(|r| r.id),
            entries,
        })
    }

    /// A user's picks, oldest round first, each with its outcome.
    pub async fn pick_history(&self, user_id: UserId) -> Result<Vec<HistoryEntry>> {
        let mut tx = self.store.begin().await?;
        tx.require_user(user_id).await?;

        let mut history = Vec::new();
        for pick in tx.picks_for_user(user_id).await? {
            let Some(round) = tx.get_round(pick.round_id).await? else {
                continue;
            };
            let fixtures = tx.fixtures_for_round(round.id).await?;
            let outcome = judge_pick(fixture_for_team(&fixtures, &pick.team_name), &pick.team_name);
            history.push(HistoryEntry {
                round_id: round.id,
                team_name: pick.team_name,
                outcome: HistoryOutcome::from_pick(outcome, round.is_processed),
                is_processed: round.is_processed,
            });
        }
        Ok(history)
    }
}

fn picks_by_user(picks: Vec<Pick>) -> HashMap<UserId, Pick> {
    picks.into_iter().map(|p| (p.user_id, p)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
