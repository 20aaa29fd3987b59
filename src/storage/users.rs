use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::StoreTx;
use crate::types::{LmsError, Result, RoundId, User, UserId};

const USER_COLUMNS: &str = "id, name, is_active, is_admin, re_entry_count, entry_round";

fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        is_admin: row.try_get("is_admin")?,
        re_entry_count: row.try_get("re_entry_count")?,
        entry_round: row.try_get("entry_round")?,
    })
}

impl StoreTx {
    pub async fn create_user(&mut self, name: &str, is_admin: bool) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (name, is_active, is_admin) VALUES (?, 1, ?)")
            .bind(name)
            .bind(is_admin)
            .execute(&mut *self.tx)
            .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            is_active: true,
            is_admin,
            re_entry_count: 0,
            entry_round: None,
        })
    }

    pub async fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn require_user(&mut self, id: UserId) -> Result<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| LmsError::not_found("User", id))
    }

    pub async fn list_users(&mut self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(user_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    pub async fn list_admins(&mut self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE is_admin = 1 ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(user_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    /// Active, non-admin users: everyone still subject to elimination.
    pub async fn competing_users(&mut self) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1 AND is_admin = 0 ORDER BY id"
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(user_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    pub async fn set_user_active(&mut self, id: UserId, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Reactivate a user for a new entry beginning at `entry_round`.
    pub async fn record_re_entry(&mut self, id: UserId, entry_round: RoundId) -> Result<()> {
        sqlx::query(
            "UPDATE users SET is_active = 1, re_entry_count = re_entry_count + 1, entry_round = ? \
             WHERE id = ?",
        )
        .bind(entry_round)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Fails with a foreign-key violation while picks still reference the user.
    pub async fn delete_user(&mut self, id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
