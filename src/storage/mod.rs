//! Persistence layer.
//!
//! SQLite via `sqlx`. Every logical operation (one sync cycle, one
//! finalize, one pick upsert, one batch) runs inside a single [`StoreTx`];
//! dropping the transaction without committing rolls it back.
//!
//! Write transactions are serialised by an in-process lock so that
//! read-then-write sequences (validate a pick, then upsert it) cannot
//! interleave: the last committed transaction wins.

mod fixtures;
mod picks;
mod rounds;
mod users;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::types::Result;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_admin INTEGER NOT NULL DEFAULT 0,
        re_entry_count INTEGER NOT NULL DEFAULT 0,
        entry_round INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS rounds (
        id INTEGER PRIMARY KEY,
        deadline TEXT NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        is_processed INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS fixtures (
        id INTEGER PRIMARY KEY,
        round_id INTEGER NOT NULL REFERENCES rounds(id),
        home_team TEXT NOT NULL,
        away_team TEXT NOT NULL,
        kickoff TEXT NOT NULL,
        status TEXT NOT NULL,
        home_score INTEGER,
        away_score INTEGER,
        winner TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_fixtures_round ON fixtures(round_id)",
    "CREATE TABLE IF NOT EXISTS picks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        round_id INTEGER NOT NULL REFERENCES rounds(id),
        team_name TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, round_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_picks_round ON picks(round_id)",
];

/// Result of a find-or-create lookup keyed by external identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(t) | Self::Existing(t) => t,
        }
    }
}

/// Handle to the pool database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Connect to (creating if needed) the database at `url` and bootstrap
    /// the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(url, "Database ready");
        Ok(store)
    }

    /// A private in-memory database. The single connection is pinned for
    /// the lifetime of the pool so the data is not dropped while idle.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "Schema bootstrapped");
        Ok(())
    }

    /// Open a transaction. Waits for any other open transaction to finish.
    pub async fn begin(&self) -> Result<StoreTx> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(StoreTx { tx, _guard: guard })
    }
}

/// One all-or-nothing unit of work against the store.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl StoreTx {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
