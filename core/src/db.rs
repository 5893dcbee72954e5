use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use crate::models::RemoteRow;

pub struct Database {
    conn: Connection,
}

fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Single-row table; the CHECK keeps it that way.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sync_lock (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    holder TEXT NOT NULL,
                    acquired_at TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS remote_rows (
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT,
                    PRIMARY KEY (user_id, date)
                );

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Key-value slots ---

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Whole-value replace of a slot.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let now = stamp(Utc::now());
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    /// Run `f` inside one transaction. Nothing `f` wrote survives an error.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // --- Sync in-flight guard ---

    /// Try to take the sync lock. A lock older than `stale_after` is assumed to
    /// belong to a crashed process and is taken over.
    pub fn try_acquire_sync_lock(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM sync_lock WHERE acquired_at < ?1",
            params![stamp(now - stale_after)],
        )?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO sync_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
            params![holder, stamp(now)],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    pub fn release_sync_lock(&self, holder: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_lock WHERE holder = ?1",
            params![holder],
        )?;
        Ok(())
    }

    // --- Remote row store (server side) ---

    pub fn list_remote_rows(&self, user_id: &str) -> Result<Vec<RemoteRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, payload, updated_at FROM remote_rows
             WHERE user_id = ?1 ORDER BY date ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(date, payload, updated_at)| {
                let payload = serde_json::from_str(&payload)
                    .with_context(|| format!("Corrupt payload for remote row {date}"))?;
                Ok(RemoteRow {
                    date,
                    payload,
                    updated_at,
                })
            })
            .collect()
    }

    /// Idempotent upsert keyed by `(user_id, date)`.
    pub fn upsert_remote_row(&self, user_id: &str, row: &RemoteRow) -> Result<()> {
        let payload = serde_json::to_string(&row.payload)?;
        self.conn.execute(
            "INSERT INTO remote_rows (user_id, date, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![user_id, row.date, payload, row.updated_at],
        )?;
        Ok(())
    }

    pub fn delete_remote_row(&self, user_id: &str, date: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM remote_rows WHERE user_id = ?1 AND date = ?2",
            params![user_id, date],
        )?;
        Ok(rows > 0)
    }
}
