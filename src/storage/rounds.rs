use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{StoreTx, Upserted};
use crate::types::{LmsError, Result, Round, RoundId};

const ROUND_COLUMNS: &str = "id, deadline, is_current, is_processed";

fn round_from_row(row: &SqliteRow) -> sqlx::Result<Round> {
    Ok(Round {
        id: row.try_get("id")?,
        deadline: row.try_get("deadline")?,
        is_current: row.try_get("is_current")?,
        is_processed: row.try_get("is_processed")?,
    })
}

impl StoreTx {
    pub async fn get_round(&mut self, id: RoundId) -> Result<Option<Round>> {
        let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(round_from_row).transpose()?)
    }

    pub async fn require_round(&mut self, id: RoundId) -> Result<Round> {
        self.get_round(id)
            .await?
            .ok_or_else(|| LmsError::not_found("Round", id))
    }

    pub async fn current_round(&mut self) -> Result<Option<Round>> {
        let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE is_current = 1 ORDER BY id LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&mut *self.tx).await?;
        Ok(row.as_ref().map(round_from_row).transpose()?)
    }

    pub async fn list_rounds(&mut self) -> Result<Vec<Round>> {
        let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(round_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    /// Look up a round by matchday, creating it with the given deadline and
    /// current flag if absent. Existing rows are returned unchanged.
    pub async fn find_or_create_round(
        &mut self,
        id: RoundId,
        deadline: DateTime<Utc>,
        is_current: bool,
    ) -> Result<Upserted<Round>> {
        if let Some(existing) = self.get_round(id).await? {
            return Ok(Upserted::Existing(existing));
        }

        sqlx::query("INSERT INTO rounds (id, deadline, is_current, is_processed) VALUES (?, ?, ?, 0)")
            .bind(id)
            .bind(deadline)
            .bind(is_current)
            .execute(&mut *self.tx)
            .await?;

        Ok(Upserted::Created(Round {
            id,
            deadline,
            is_current,
            is_processed: false,
        }))
    }

    pub async fn set_round_deadline(&mut self, id: RoundId, deadline: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rounds SET deadline = ? WHERE id = ?")
            .bind(deadline)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_round_current(&mut self, id: RoundId, is_current: bool) -> Result<()> {
        sqlx::query("UPDATE rounds SET is_current = ? WHERE id = ?")
            .bind(is_current)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Clear the current flag on every round other than `id`.
    /// Returns how many rounds were cleared.
    pub async fn clear_current_except(&mut self, id: RoundId) -> Result<u64> {
        let result = sqlx::query("UPDATE rounds SET is_current = 0 WHERE is_current = 1 AND id != ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_round_processed(&mut self, id: RoundId) -> Result<()> {
        sqlx::query("UPDATE rounds SET is_processed = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
