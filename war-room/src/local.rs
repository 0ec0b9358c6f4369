// Local durable key-value storage (per-client preferences, queue, roster
// assignments, cached reference documents).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Key holding the persisted session mode ("live" / "simulated").
pub const MODE_KEY: &str = "draftMode";
/// Key holding the self-declared identity.
pub const USER_KEY: &str = "draftUser";
/// Key holding the personal queue (JSON array of item ids).
pub const QUEUE_KEY: &str = "draft_queue";

/// Key holding pool writes the shared store has not accepted yet.
pub const PENDING_KEY: &str = "pending_pool_writes";

/// Key holding one participant's roster slot assignments.
pub fn roster_key(owner: &str) -> String {
    format!("roster_assignments:{owner}")
}

/// SQLite-backed JSON key/value store. Cloning shares the connection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open (or create) the store at `path`. Pass `":memory:"` for an
    /// ephemeral store.
    pub fn open(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create local store directory {}", parent.display())
                    })?;
                }
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open local store at {path}"))?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS local_state (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             );",
        )
        .context("failed to create local store schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Platform data directory location, e.g. `~/.local/share/war-room/local.db`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "war-room")
            .map(|dirs| dirs.data_dir().join("local.db"))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("local store mutex poisoned")
    }

    /// Store `value` as JSON under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("failed to serialize local value")?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO local_state (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![key, json],
            )
            .with_context(|| format!("failed to save local key {key}"))?;
        Ok(())
    }

    /// Load the value under `key`. Missing keys are `Ok(None)`; a value that
    /// no longer matches `T` is an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read local key {key}"))?;

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("failed to decode local key {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but an unreadable value is logged and
    /// treated as missing.
    pub fn get_or_discard<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding unreadable local value: {e:#}");
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM local_state WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove local key {key}"))?;
        Ok(())
    }

    /// Forget everything (the `--reset` flag).
    pub fn clear(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM local_state", [])
            .context("failed to clear local store")?;
        Ok(())
    }
}
