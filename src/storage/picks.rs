use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::StoreTx;
use crate::types::{Pick, Result, RoundId, UserId};

const PICK_COLUMNS: &str = "user_id, round_id, team_name, updated_at";

fn pick_from_row(row: &SqliteRow) -> sqlx::Result<Pick> {
    Ok(Pick {
        user_id: row.try_get("user_id")?,
        round_id: row.try_get("round_id")?,
        team_name: row.try_get("team_name")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl StoreTx {
    pub async fn get_pick(&mut self, user_id: UserId, round_id: RoundId) -> Result<Option<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE user_id = ? AND round_id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(round_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(pick_from_row).transpose()?)
    }

    pub async fn picks_for_round(&mut self, round_id: RoundId) -> Result<Vec<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE round_id = ? ORDER BY user_id");
        let rows = sqlx::query(&sql)
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(pick_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    /// All of a user's picks, oldest round first.
    pub async fn picks_for_user(&mut self, user_id: UserId) -> Result<Vec<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE user_id = ? ORDER BY round_id");
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(pick_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    /// Insert or replace the user's pick for a round.
    pub async fn upsert_pick(
        &mut self,
        user_id: UserId,
        round_id: RoundId,
        team_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Pick> {
        sqlx::query(
            "INSERT INTO picks (user_id, round_id, team_name, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, round_id) \
             DO UPDATE SET team_name = excluded.team_name, updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(round_id)
        .bind(team_name)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        Ok(Pick {
            user_id,
            round_id,
            team_name: team_name.to_string(),
            updated_at: at,
        })
    }

    /// Returns whether a pick existed.
    pub async fn delete_pick(&mut self, user_id: UserId, round_id: RoundId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM picks WHERE user_id = ? AND round_id = ?")
            .bind(user_id)
            .bind(round_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_picks_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM picks WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}
