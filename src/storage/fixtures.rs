use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{StoreTx, Upserted};
use crate::types::{
    Fixture, FixtureId, FixtureStatus, Result, RoundId, Score, UpstreamFixture, Winner,
};

const FIXTURE_COLUMNS: &str =
    "id, round_id, home_team, away_team, kickoff, status, home_score, away_score, winner";

fn fixture_from_row(row: &SqliteRow) -> sqlx::Result<Fixture> {
    let home_score: Option<u32> = row.try_get("home_score")?;
    let away_score: Option<u32> = row.try_get("away_score")?;
    let status: String = row.try_get("status")?;
    let winner: Option<String> = row.try_get("winner")?;

    Ok(Fixture {
        id: row.try_get("id")?,
        round_id: row.try_get("round_id")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        kickoff: row.try_get("kickoff")?,
        status: FixtureStatus::from(status),
        score: home_score.zip(away_score).map(|(home, away)| Score::new(home, away)),
        winner: winner.as_deref().map(Winner::from_stored),
    })
}

impl StoreTx {
    pub async fn get_fixture(&mut self, id: FixtureId) -> Result<Option<Fixture>> {
        let sql = format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(fixture_from_row).transpose()?)
    }

    /// Fixtures of a round, earliest kickoff first.
    pub async fn fixtures_for_round(&mut self, round_id: RoundId) -> Result<Vec<Fixture>> {
        let sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE round_id = ? ORDER BY kickoff, id"
        );
        let rows = sqlx::query(&sql)
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(fixture_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    /// Look up a fixture by external id, inserting teams, kickoff and status
    /// from the upstream record if absent. Existing rows are returned
    /// unchanged.
    pub async fn find_or_create_fixture(
        &mut self,
        upstream: &UpstreamFixture,
    ) -> Result<Upserted<Fixture>> {
        if let Some(existing) = self.get_fixture(upstream.external_id).await? {
            return Ok(Upserted::Existing(existing));
        }

        sqlx::query(
            "INSERT INTO fixtures (id, round_id, home_team, away_team, kickoff, status) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(upstream.external_id)
        .bind(upstream.matchday)
        .bind(&upstream.home_team)
        .bind(&upstream.away_team)
        .bind(upstream.kickoff)
        .bind(upstream.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(Upserted::Created(Fixture {
            id: upstream.external_id,
            round_id: upstream.matchday,
            home_team: upstream.home_team.clone(),
            away_team: upstream.away_team.clone(),
            kickoff: upstream.kickoff,
            status: upstream.status.clone(),
            score: None,
            winner: None,
        }))
    }

    /// Refresh the mutable schedule fields. Team identities never change.
    pub async fn update_fixture_schedule(
        &mut self,
        id: FixtureId,
        status: &FixtureStatus,
        kickoff: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE fixtures SET status = ?, kickoff = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(kickoff)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Store scores and the derived winner together so that one is never
    /// present without the other.
    pub async fn set_fixture_result(
        &mut self,
        id: FixtureId,
        score: Score,
        winner: &Winner,
    ) -> Result<()> {
        sqlx::query("UPDATE fixtures SET home_score = ?, away_score = ?, winner = ? WHERE id = ?")
            .bind(score.home)
            .bind(score.away)
            .bind(winner.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
