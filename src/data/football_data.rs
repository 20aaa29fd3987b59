//! football-data.org fixture provider.
//!
//! API: `https://api.football-data.org/v4/`
//! Auth: `X-Auth-Token` header. Free tier: 10 req/min.
//!
//! Two endpoints are used: `/competitions/{code}/matches` for the full
//! season's fixtures and `/competitions/{code}` for the current matchday.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::FixtureSource;
use crate::types::{FixtureStatus, LmsError, Result, RoundId, Score, UpstreamFixture};

// ---------------------------------------------------------------------------
// API response types (football-data JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMatch {
    id: i64,
    /// Absent for some cup rounds; such matches cannot be assigned a round.
    #[serde(default)]
    matchday: Option<i64>,
    utc_date: DateTime<Utc>,
    status: String,
    home_team: ApiTeam,
    away_team: ApiTeam,
    #[serde(default)]
    score: Option<ApiScore>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    /// Null until the participant is known.
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiScore {
    #[serde(default)]
    full_time: Option<ApiScoreLine>,
}

#[derive(Debug, Deserialize)]
struct ApiScoreLine {
    #[serde(default)]
    home: Option<u32>,
    #[serde(default)]
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitionResponse {
    #[serde(default)]
    current_season: Option<ApiSeason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSeason {
    #[serde(default)]
    current_matchday: Option<i64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FootballDataClient {
    http: Client,
    base_url: String,
    competition: String,
    /// Without a key every call fails as unavailable.
    api_key: Option<SecretString>,
}

impl FootballDataClient {
    pub fn new(
        base_url: &str,
        competition: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("LMS/0.1.0")
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {e}")))?;

        if api_key.is_none() {
            warn!("No football-data API key configured; fixture sync will fail");
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            competition: competition.to_string(),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| unavailable("football-data API key not set"))?;

        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, "Fetching football-data");

        let resp = self
            .http
            .get(&url)
            .header("X-Auth-Token", key.expose_secret().as_str())
            .send()
            .await
            .map_err(|e| unavailable(format!("football-data request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("football-data error {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| unavailable(format!("failed to parse football-data response: {e}")))
    }

    /// Convert an API match to the upstream record. Matches without a
    /// matchday or with undecided participants are dropped.
    fn to_upstream(m: ApiMatch) -> Option<UpstreamFixture> {
        let matchday = m.matchday?;
        let home_team = m.home_team.name?;
        let away_team = m.away_team.name?;

        let full_time = m
            .score
            .and_then(|s| s.full_time)
            .and_then(|ft| ft.home.zip(ft.away))
            .map(|(home, away)| Score::new(home, away));

        Some(UpstreamFixture {
            external_id: m.id,
            matchday,
            home_team,
            away_team,
            kickoff: m.utc_date,
            status: FixtureStatus::from(m.status),
            full_time,
        })
    }
}

fn unavailable(msg: impl Into<String>) -> LmsError {
    LmsError::UpstreamUnavailable(msg.into())
}

#[async_trait]
impl FixtureSource for FootballDataClient {
    async fn list_fixtures(&self) -> Result<Vec<UpstreamFixture>> {
        let path = format!("competitions/{}/matches", self.competition);
        let resp: MatchesResponse = self.get_json(&path).await?;

        let total = resp.matches.len();
        let fixtures: Vec<UpstreamFixture> = resp
            .matches
            .into_iter()
            .filter_map(Self::to_upstream)
            .collect();

        if fixtures.len() < total {
            debug!(dropped = total - fixtures.len(), "Skipped matches without matchday or teams");
        }
        info!(competition = %self.competition, count = fixtures.len(), "Fetched fixtures");
        Ok(fixtures)
    }

    async fn current_matchday(&self) -> Result<RoundId> {
        let path = format!("competitions/{}", self.competition);
        let resp: CompetitionResponse = self.get_json(&path).await?;
        resp.current_season
            .and_then(|s| s.current_matchday)
            .ok_or_else(|| unavailable("football-data did not report a current matchday"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
