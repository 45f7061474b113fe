//! Database connection management for the XP ledger.
//!
//! One SQLite connection behind an async mutex: every read and write is
//! serialized through it, which is what gives the settlement transaction
//! its read-your-writes and no-lost-update guarantees without a separate
//! lock manager.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Database location based on execution mode
#[derive(Debug, Clone)]
pub enum DbLocation {
    /// System mode: /var/lib/ascend/ascend.db
    System,
    /// User mode: $XDG_DATA_HOME/ascend/ascend.db or ~/.local/share/ascend/ascend.db
    User,
    /// Custom path for testing
    Custom(PathBuf),
}

impl DbLocation {
    pub fn path(&self) -> Result<PathBuf> {
        match self {
            DbLocation::System => Ok(PathBuf::from(crate::config::DATA_DIR).join("ascend.db")),
            DbLocation::User => {
                let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
                    PathBuf::from(xdg_data)
                } else if let Ok(home) = std::env::var("HOME") {
                    PathBuf::from(home).join(".local/share")
                } else {
                    anyhow::bail!("Could not determine user data directory");
                };
                Ok(base_dir.join("ascend").join("ascend.db"))
            }
            DbLocation::Custom(path) => Ok(path.clone()),
        }
    }
}

/// SQLite handle (single connection with mutex).
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open or create the database at the specified location.
    pub async fn open(location: DbLocation) -> Result<Self> {
        let db_path = location.path()?;

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        info!("Opening ledger database at: {}", db_path.display());

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&db_path).context("Failed to open SQLite database")?;

            // WAL for concurrent readers during the sweep
            conn.pragma_update(None, "journal_mode", "WAL")
                .context("Failed to enable WAL mode")?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .context("Failed to set synchronous mode")?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .context("Failed to enable foreign keys")?;

            Ok(conn)
        })
        .await??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create the four ledger tables. Idempotent.
    async fn initialize_schema(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS subjects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    tz_offset_minutes INTEGER NOT NULL DEFAULT 0,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at DATETIME NOT NULL
                )",
                [],
            )?;

            // processed_at is set iff processed - enforced here, not just
            // in the store API
            conn.execute(
                "CREATE TABLE IF NOT EXISTS activity_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject_id INTEGER NOT NULL REFERENCES subjects(id),
                    kind TEXT NOT NULL,
                    occurred_at DATETIME NOT NULL,
                    metrics TEXT NOT NULL,
                    processed INTEGER NOT NULL DEFAULT 0,
                    processed_at DATETIME,
                    CHECK (
                        (processed = 0 AND processed_at IS NULL)
                        OR (processed = 1 AND processed_at IS NOT NULL)
                    )
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_logs_subject_kind
                 ON activity_logs(subject_id, kind, occurred_at)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_logs_unprocessed
                 ON activity_logs(subject_id, kind, processed)",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS xp_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject_id INTEGER NOT NULL REFERENCES subjects(id),
                    xp_type TEXT NOT NULL,
                    amount INTEGER NOT NULL CHECK (amount >= 0),
                    timestamp DATETIME NOT NULL,
                    details TEXT,
                    window_start DATETIME NOT NULL,
                    window_end DATETIME NOT NULL,
                    source_log_id INTEGER UNIQUE REFERENCES activity_logs(id)
                )",
                [],
            )?;
            // The idempotency guard for batch awards: one event per
            // (subject, kind, window). Instant awards are guarded by the
            // UNIQUE source_log_id instead.
            conn.execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_xp_window_guard
                 ON xp_events(subject_id, xp_type, window_start)
                 WHERE source_log_id IS NULL",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_xp_subject_ts
                 ON xp_events(subject_id, timestamp)",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS levels (
                    subject_id INTEGER PRIMARY KEY REFERENCES subjects(id),
                    current_level INTEGER NOT NULL DEFAULT 1,
                    total_xp INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
                    last_updated DATETIME NOT NULL
                )",
                [],
            )?;

            debug!("Ledger schema initialized");
            Ok(())
        })
        .await?;

        Ok(())
    }

    /// Run a closure against the connection on the blocking pool.
    pub async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }

    /// Explicit data reset: drop one subject's logs, events, and level in
    /// a single transaction. The only sanctioned deletion path.
    pub async fn reset_subject_data(&self, subject_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let events = tx.execute("DELETE FROM xp_events WHERE subject_id = ?1", [subject_id])?;
            let logs = tx.execute(
                "DELETE FROM activity_logs WHERE subject_id = ?1",
                [subject_id],
            )?;
            let levels = tx.execute("DELETE FROM levels WHERE subject_id = ?1", [subject_id])?;
            tx.commit()?;
            info!(
                "Reset subject {subject_id}: {events} events, {logs} logs, {levels} level rows"
            );
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_db_creation() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::open(DbLocation::Custom(db_path.clone())).await.unwrap();

        assert!(db_path.exists());

        let tables = db
            .execute(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                     AND name IN ('subjects','activity_logs','xp_events','levels')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let _first = Db::open(DbLocation::Custom(db_path.clone())).await.unwrap();
        let _second = Db::open(DbLocation::Custom(db_path)).await.unwrap();
    }

    #[tokio::test]
    async fn test_processed_at_check_constraint() {
        let temp_dir = tempdir().unwrap();
        let db = Db::open(DbLocation::Custom(temp_dir.path().join("test.db")))
            .await
            .unwrap();

        let result = db
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO subjects (id, name, created_at) VALUES (1, 'kai', '2025-01-01')",
                    [],
                )?;
                // processed without processed_at must be rejected
                conn.execute(
                    "INSERT INTO activity_logs
                     (subject_id, kind, occurred_at, metrics, processed, processed_at)
                     VALUES (1, 'mood', '2025-01-01', '{}', 1, NULL)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
