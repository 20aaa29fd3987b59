//! Round resolution: pick legality, eliminations and round roll-over.
//!
//! The legality and outcome rules are pure functions over loaded rows
//! (`check_pick`, `judge_pick`, `team_already_used`) so they can be tested
//! without a database. `ResolutionEngine` wires them to a `StoreTx`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::storage::StoreTx;
use crate::types::{
    fixture_for_team, Fixture, FixtureStatus, LmsError, Pick, PickRejection, Result, Round,
    RoundId, RoundPhase, User, UserId,
};

// ---------------------------------------------------------------------------
// Pick outcome
// ---------------------------------------------------------------------------

/// How a pick stands given its fixture's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PickOutcome {
    Won,
    /// Lost or drew: the picker is out.
    Lost,
    InPlay,
    /// Fixture postponed or cancelled: the picker is safe.
    Void,
    /// Not kicked off, or no matching fixture.
    Pending,
}

impl fmt::Display for PickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::InPlay => "In Play",
            Self::Void => "POSTPONED",
            Self::Pending => "Pending",
        };
        f.write_str(s)
    }
}

/// Judge a pick against the fixture its team plays in.
pub fn judge_pick(fixture: Option<&Fixture>, team_name: &str) -> PickOutcome {
    let Some(fixture) = fixture else {
        return PickOutcome::Pending;
    };
    match &fixture.status {
        FixtureStatus::Finished => {
            if fixture.winner.as_ref().is_some_and(|w| w.is_team(team_name)) {
                PickOutcome::Won
            } else {
                PickOutcome::Lost
            }
        }
        status if status.is_void() => PickOutcome::Void,
        FixtureStatus::InPlay => PickOutcome::InPlay,
        _ => PickOutcome::Pending,
    }
}

// ---------------------------------------------------------------------------
// Pick legality
// ---------------------------------------------------------------------------

/// Whether `team_name` appears among `prior_picks`, ignoring picks made in
/// `exempt_round`.
pub fn team_already_used(
    prior_picks: &[Pick],
    team_name: &str,
    exempt_round: Option<RoundId>,
) -> bool {
    prior_picks
        .iter()
        .filter(|p| p.team_name == team_name)
        .any(|p| Some(p.round_id) != exempt_round)
}

/// The round whose picks a user may reuse once: the round where their
/// current entry began, and only after at least one re-entry.
pub fn reuse_exempt_round(user: &User) -> Option<RoundId> {
    if user.re_entry_count > 0 {
        user.entry_round
    } else {
        None
    }
}

/// Decide whether `user` may pick `team_name` for `round`.
///
/// `history` is every pick the user has made; the pick already held for
/// `round` itself does not count as a prior use.
pub fn check_pick<'a>(
    user: &User,
    team_name: &str,
    round: Option<&'a Round>,
    fixtures: &[Fixture],
    history: &[Pick],
    now: DateTime<Utc>,
) -> std::result::Result<&'a Round, PickRejection> {
    if !user.is_active {
        return Err(PickRejection::Eliminated);
    }
    let round = round.ok_or(PickRejection::NoCurrentRound)?;
    if round.deadline_passed(now) {
        return Err(PickRejection::DeadlinePassed);
    }
    if fixture_for_team(fixtures, team_name).is_none() {
        return Err(PickRejection::UnknownTeam(team_name.to_string()));
    }

    let prior: Vec<Pick> = history
        .iter()
        .filter(|p| p.round_id != round.id)
        .cloned()
        .collect();
    if team_already_used(&prior, team_name, reuse_exempt_round(user)) {
        return Err(PickRejection::TeamAlreadyUsed(team_name.to_string()));
    }

    Ok(round)
}

// ---------------------------------------------------------------------------
// Finalize
// ---------------------------------------------------------------------------

/// Result of finalizing a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub round_id: RoundId,
    pub eliminated: Vec<UserId>,
    /// The round that became current, if a next round exists.
    pub new_current: Option<RoundId>,
}

// ---------------------------------------------------------------------------
// Resolution engine
// ---------------------------------------------------------------------------

pub struct ResolutionEngine {
    clock: Arc<dyn Clock>,
}

impl ResolutionEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Validate a pick for the current round, returning that round.
    pub async fn validate_pick(
        &self,
        tx: &mut StoreTx,
        user: &User,
        team_name: &str,
    ) -> Result<Round> {
        let round = tx.current_round().await?;
        let fixtures = match &round {
            Some(r) => tx.fixtures_for_round(r.id).await?,
            None => Vec::new(),
        };
        let history = tx.picks_for_user(user.id).await?;

        let round = check_pick(
            user,
            team_name,
            round.as_ref(),
            &fixtures,
            &history,
            self.clock.now(),
        )?;
        Ok(round.clone())
    }

    /// Compute eliminations for a round, mark it processed, and roll the
    /// current flag to the next round. The caller commits.
    pub async fn finalize_round(
        &self,
        tx: &mut StoreTx,
        round_id: RoundId,
    ) -> Result<FinalizeOutcome> {
        let round = tx.require_round(round_id).await?;
        if round.phase() == RoundPhase::Processed {
            return Err(LmsError::AlreadyProcessed(round_id));
        }

        let fixtures = tx.fixtures_for_round(round_id).await?;
        if !fixtures.iter().any(|f| f.status.is_terminal()) {
            return Err(LmsError::NoResultsYet(round_id));
        }

        let mut eliminated = Vec::new();
        let mut picked = HashSet::new();

        for pick in tx.picks_for_round(round_id).await? {
            picked.insert(pick.user_id);
            let Some(user) = tx.get_user(pick.user_id).await? else {
                continue;
            };
            if !user.is_competing() {
                continue;
            }
            let fixture = fixture_for_team(&fixtures, &pick.team_name);
            if judge_pick(fixture, &pick.team_name) == PickOutcome::Lost {
                tx.set_user_active(user.id, false).await?;
                info!(round = round_id, user = user.id, team = %pick.team_name, "Eliminated: pick lost");
                eliminated.push(user.id);
            }
        }

        for user in tx.competing_users().await? {
            if !picked.contains(&user.id) {
                tx.set_user_active(user.id, false).await?;
                info!(round = round_id, user = user.id, "Eliminated: no pick");
                eliminated.push(user.id);
            }
        }

        tx.mark_round_processed(round_id).await?;

        let new_current = match tx.get_round(round_id + 1).await? {
            Some(next) => {
                tx.clear_current_except(next.id).await?;
                tx.set_round_current(next.id, true).await?;
                Some(next.id)
            }
            None => None,
        };

        info!(
            round = round_id,
            eliminated = eliminated.len(),
            new_current = ?new_current,
            "Round finalized"
        );

        Ok(FinalizeOutcome {
            round_id,
            eliminated,
            new_current,
        })
    }
}

/// Knock out competing users whose pick in the current round has already
/// lost. Processed rounds are left alone.
pub async fn apply_live_results(tx: &mut StoreTx) -> Result<Vec<UserId>> {
    let Some(round) = tx.current_round().await? else {
        return Ok(Vec::new());
    };
    if round.is_processed {
        return Ok(Vec::new());
    }

    let fixtures = tx.fixtures_for_round(round.id).await?;
    let mut eliminated = Vec::new();

    for pick in tx.picks_for_round(round.id).await? {
        let Some(user) = tx.get_user(pick.user_id).await? else {
            continue;
        };
        if !user.is_competing() {
            continue;
        }
        // Only a matched FINISHED fixture can eliminate here.
        let Some(fixture) = fixture_for_team(&fixtures, &pick.team_name) else {
            continue;
        };
        if judge_pick(Some(fixture), &pick.team_name) == PickOutcome::Lost {
            tx.set_user_active(user.id, false).await?;
            info!(round = round.id, user = user.id, team = %pick.team_name, "Eliminated live");
            eliminated.push(user.id);
        }
    }

    Ok(eliminated)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
