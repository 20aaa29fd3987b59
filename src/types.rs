//! Shared types for the LMS engine.
//!
//! These types form the data model used across all modules: the
//! persisted entities (users, rounds, fixtures, picks), the upstream
//! fixture record produced by a `FixtureSource`, and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;
/// Rounds are keyed by their external matchday number, not a synthetic id.
pub type RoundId = i64;
/// Fixtures are keyed by the upstream provider's match id.
pub type FixtureId = i64;

/// Stored in place of a team name when a fixture ends level.
pub const DRAW_MARKER: &str = "DRAW";

// ---------------------------------------------------------------------------
// Fixture status
// ---------------------------------------------------------------------------

/// Lifecycle status of a fixture.
///
/// Unrecognised upstream statuses are carried verbatim in `Other` and are
/// never treated as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FixtureStatus {
    Scheduled,
    Timed,
    InPlay,
    Finished,
    Postponed,
    Cancelled,
    Other(String),
}

impl FixtureStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Timed => "TIMED",
            Self::InPlay => "IN_PLAY",
            Self::Finished => "FINISHED",
            Self::Postponed => "POSTPONED",
            Self::Cancelled => "CANCELLED",
            Self::Other(s) => s,
        }
    }

    /// FINISHED, POSTPONED or CANCELLED: the fixture will not change outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Postponed | Self::Cancelled)
    }

    /// POSTPONED or CANCELLED: picks on this fixture are safe.
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Postponed | Self::Cancelled)
    }

    /// SCHEDULED or TIMED: not kicked off yet.
    pub fn is_upcoming(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Timed)
    }
}

impl From<&str> for FixtureStatus {
    fn from(s: &str) -> Self {
        match s {
            "SCHEDULED" => Self::Scheduled,
            "TIMED" => Self::Timed,
            "IN_PLAY" => Self::InPlay,
            "FINISHED" => Self::Finished,
            "POSTPONED" => Self::Postponed,
            "CANCELLED" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FixtureStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<FixtureStatus> for String {
    fn from(status: FixtureStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scores and winners
// ---------------------------------------------------------------------------

/// Full-time score of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// Outcome of a fixture with a known score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Team(String),
    Draw,
}

impl Winner {
    /// Derive the winner from a score: the higher scorer by name, or a draw.
    pub fn from_score(home_team: &str, away_team: &str, score: Score) -> Self {
        if score.home > score.away {
            Self::Team(home_team.to_string())
        } else if score.away > score.home {
            Self::Team(away_team.to_string())
        } else {
            Self::Draw
        }
    }

    /// Parse the stored representation (a team name or [`DRAW_MARKER`]).
    pub fn from_stored(s: &str) -> Self {
        if s == DRAW_MARKER {
            Self::Draw
        } else {
            Self::Team(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Team(name) => name,
            Self::Draw => DRAW_MARKER,
        }
    }

    pub fn is_team(&self, team_name: &str) -> bool {
        matches!(self, Self::Team(name) if name == team_name)
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A pool participant (or an administrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Still alive in the pool.
    pub is_active: bool,
    pub is_admin: bool,
    /// Number of times the user has been granted a re-entry.
    pub re_entry_count: u32,
    /// Round in which the user's current entry began. Only meaningful
    /// once `re_entry_count > 0`.
    pub entry_round: Option<RoundId>,
}

impl User {
    /// Active and not an administrator: subject to elimination.
    pub fn is_competing(&self) -> bool {
        self.is_active && !self.is_admin
    }
}

/// Lifecycle phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    Open,
    Current,
    Processed,
}

/// A gameweek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    /// Earliest kickoff among the round's fixtures.
    pub deadline: DateTime<Utc>,
    pub is_current: bool,
    pub is_processed: bool,
}

impl Round {
    pub fn phase(&self) -> RoundPhase {
        if self.is_processed {
            RoundPhase::Processed
        } else if self.is_current {
            RoundPhase::Current
        } else {
            RoundPhase::Open
        }
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// One match between two teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub round_id: RoundId,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    pub score: Option<Score>,
    pub winner: Option<Winner>,
}

impl Fixture {
    pub fn involves(&self, team_name: &str) -> bool {
        self.home_team == team_name || self.away_team == team_name
    }
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score {
            Some(score) => write!(
                f,
                "[GW{}] {} {} {} ({})",
                self.round_id, self.home_team, score, self.away_team, self.status
            ),
            None => write!(
                f,
                "[GW{}] {} v {} ({})",
                self.round_id, self.home_team, self.away_team, self.status
            ),
        }
    }
}

/// A user's team selection for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub team_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Find the fixture in which `team_name` plays.
pub fn fixture_for_team<'a>(fixtures: &'a [Fixture], team_name: &str) -> Option<&'a Fixture> {
    fixtures.iter().find(|f| f.involves(team_name))
}

// ---------------------------------------------------------------------------
// Upstream record
// ---------------------------------------------------------------------------

/// A fixture as reported by the external data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFixture {
    pub external_id: FixtureId,
    pub matchday: RoundId,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    pub full_time: Option<Score>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a pick was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickRejection {
    #[error("You are eliminated")]
    Eliminated,

    #[error("No active gameweek")]
    NoCurrentRound,

    #[error("Deadline passed")]
    DeadlinePassed,

    #[error("Invalid team selection: {0}")]
    UnknownTeam(String),

    #[error("Team already used: {0}")]
    TeamAlreadyUsed(String),
}

/// Domain-specific error types for LMS.
#[derive(Debug, thiserror::Error)]
pub enum LmsError {
    #[error("Fixture source unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Pick rejected: {0}")]
    ValidationRejected(#[from] PickRejection),

    #[error("Round {0} already processed")]
    AlreadyProcessed(RoundId),

    #[error("No fixtures are finished yet for round {0}")]
    NoResultsYet(RoundId),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl LmsError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type Result<T> = std::result::Result<T, LmsError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
