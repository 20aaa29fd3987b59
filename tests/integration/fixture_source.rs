//! In-memory fixture source for integration testing.
//!
//! Serves whatever fixtures and matchday the test last set, and can be
//! switched into a failing mode to exercise the unavailable paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lms::data::FixtureSource;
use lms::types::{FixtureStatus, LmsError, Result, RoundId, Score, UpstreamFixture};

pub struct StaticSource {
    fixtures: Mutex<Vec<UpstreamFixture>>,
    matchday: Mutex<RoundId>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(fixtures: Vec<UpstreamFixture>, matchday: RoundId) -> Self {
        Self {
            fixtures: Mutex::new(fixtures),
            matchday: Mutex::new(matchday),
            failing: Mutex::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_matchday(&self, matchday: RoundId) {
        *self.matchday.lock().unwrap() = matchday;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Change the status (and optionally the full-time score) of one fixture.
    pub fn update(&self, external_id: i64, status: FixtureStatus, full_time: Option<Score>) {
        let mut fixtures = self.fixtures.lock().unwrap();
        let fixture = fixtures
            .iter_mut()
            .find(|f| f.external_id == external_id)
            .expect("unknown fixture");
        fixture.status = status;
        fixture.full_time = full_time;
    }

    /// Number of `list_fixtures` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixtureSource for StaticSource {
    async fn list_fixtures(&self) -> Result<Vec<UpstreamFixture>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(LmsError::UpstreamUnavailable("forced failure".into()));
        }
        Ok(self.fixtures.lock().unwrap().clone())
    }

    async fn current_matchday(&self) -> Result<RoundId> {
        Ok(*self.matchday.lock().unwrap())
    }
}

pub fn upstream(
    external_id: i64,
    matchday: RoundId,
    home: &str,
    away: &str,
    kickoff: DateTime<Utc>,
) -> UpstreamFixture {
    UpstreamFixture {
        external_id,
        matchday,
        home_team: home.into(),
        away_team: away.into(),
        kickoff,
        status: FixtureStatus::Timed,
        full_time: None,
    }
}
