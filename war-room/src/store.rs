// Shared ledger/pool store and its change notifications.
//
// `DraftStore` is the seam between the draft core and whatever persists the
// shared draft. `SqliteStore` is the bundled implementation: one database
// file shared by every client on the machine (or network share), with
// in-process broadcast notifications for pick updates.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::draft::ledger::{Ledger, Pick};
use crate::draft::pool::{Availability, Item, StatLine};
use crate::draft::ItemId;

const NOTIFY_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("pick #{0} is already bound")]
    AlreadyBound(u32),

    #[error("item {0} is already bound to another pick")]
    ItemTaken(ItemId),

    #[error("pick #{0} does not exist in the store")]
    UnknownPick(u32),

    #[error("item {0} does not exist in the store")]
    UnknownItem(ItemId),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Persistent shared storage for the ledger and pool.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load_items(&self) -> Result<Vec<Item>, StoreError>;

    /// All picks in ascending sequence order.
    async fn load_picks(&self) -> Result<Vec<Pick>, StoreError>;

    /// Bind `item_id` to an open pick. Fails if the pick is already bound or
    /// another pick already holds the item.
    async fn update_pick(
        &self,
        pick_number: u32,
        item_id: ItemId,
        item_name: &str,
    ) -> Result<(), StoreError>;

    async fn update_item(
        &self,
        item_id: ItemId,
        availability: &Availability,
    ) -> Result<(), StoreError>;

    /// Receive every pick this store accepts from now on.
    fn subscribe(&self) -> broadcast::Receiver<Pick>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Mutex<Connection>,
    notify: broadcast::Sender<Pick>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. Pass `":memory:"` for tests.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open draft store at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set store pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id           INTEGER PRIMARY KEY,
                name         TEXT NOT NULL,
                position     TEXT NOT NULL,
                team         TEXT NOT NULL,
                availability TEXT NOT NULL DEFAULT 'Available',
                stats        TEXT NOT NULL DEFAULT '{}',
                rank         REAL
            );

            CREATE TABLE IF NOT EXISTS picks (
                pick_number INTEGER PRIMARY KEY,
                round       INTEGER NOT NULL,
                round_pick  INTEGER NOT NULL,
                owner       TEXT NOT NULL,
                item_id     INTEGER,
                item_name   TEXT,
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            ",
        )
        .context("failed to create store schema")?;

        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            notify,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    /// Whether the store already holds a ledger.
    pub fn is_seeded(&self) -> Result<bool, StoreError> {
        let exists: bool = self
            .conn()
            .query_row("SELECT EXISTS(SELECT 1 FROM picks)", [], |row| row.get(0))?;
        Ok(exists)
    }

    /// Populate an empty store with items and a fresh ledger in one
    /// transaction. Returns `false` without touching anything if picks exist.
    pub fn seed(&self, items: &[Item], ledger: &Ledger) -> Result<bool, StoreError> {
        if self.is_seeded()? {
            return Ok(false);
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for item in items {
            let stats = serde_json::to_string(&item.stats)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO items (id, name, position, team, availability, stats, rank)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id as i64,
                    item.name,
                    item.position,
                    item.team,
                    item.availability.to_string(),
                    stats,
                    item.rank,
                ],
            )?;
        }
        for pick in ledger.picks() {
            tx.execute(
                "INSERT INTO picks (pick_number, round, round_pick, owner, item_id, item_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    pick.pick_number,
                    pick.round,
                    pick.round_pick,
                    pick.owner,
                    pick.item_id.map(|id| id as i64),
                    pick.item_name,
                ],
            )?;
        }
        tx.commit()?;
        info!(
            "Seeded draft store with {} items and {} picks",
            items.len(),
            ledger.len()
        );
        Ok(true)
    }

    fn read_pick(conn: &Connection, pick_number: u32) -> Result<Option<Pick>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT pick_number, round, round_pick, owner, item_id, item_name
                 FROM picks WHERE pick_number = ?1",
                params![pick_number],
                row_to_pick,
            )
            .optional()?)
    }
}

fn row_to_pick(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pick> {
    let item_id: Option<i64> = row.get(4)?;
    Ok(Pick {
        pick_number: row.get(0)?,
        round: row.get(1)?,
        round_pick: row.get(2)?,
        owner: row.get(3)?,
        item_id: item_id.map(|id| id as ItemId),
        item_name: row.get(5)?,
    })
}

#[async_trait]
impl DraftStore for SqliteStore {
    async fn load_items(&self) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, position, team, availability, stats, rank FROM items ORDER BY id",
        )?;
        let items = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let availability: String = row.get(4)?;
                let stats_json: String = row.get(5)?;
                Ok(Item {
                    id: id as ItemId,
                    name: row.get(1)?,
                    position: row.get(2)?,
                    team: row.get(3)?,
                    availability: Availability::from(availability),
                    // Stats are display-only; an unreadable blob degrades to blanks.
                    stats: serde_json::from_str::<StatLine>(&stats_json).unwrap_or_default(),
                    rank: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn load_picks(&self) -> Result<Vec<Pick>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT pick_number, round, round_pick, owner, item_id, item_name
             FROM picks ORDER BY pick_number",
        )?;
        let picks = stmt
            .query_map([], row_to_pick)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(picks)
    }

    async fn update_pick(
        &self,
        pick_number: u32,
        item_id: ItemId,
        item_name: &str,
    ) -> Result<(), StoreError> {
        let pick = {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE picks
                 SET item_id = ?1, item_name = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE pick_number = ?3 AND item_id IS NULL
                   AND NOT EXISTS (SELECT 1 FROM picks WHERE item_id = ?1)",
                params![item_id as i64, item_name, pick_number],
            )?;
            if changed == 0 {
                return match Self::read_pick(&conn, pick_number)? {
                    Some(pick) if pick.is_bound() => Err(StoreError::AlreadyBound(pick_number)),
                    Some(_) => Err(StoreError::ItemTaken(item_id)),
                    None => Err(StoreError::UnknownPick(pick_number)),
                };
            }
            Self::read_pick(&conn, pick_number)?.ok_or(StoreError::UnknownPick(pick_number))?
        };

        debug!(pick_number, item_id, "pick bound in store");
        // No subscribers is fine.
        let _ = self.notify.send(pick);
        Ok(())
    }

    async fn update_item(
        &self,
        item_id: ItemId,
        availability: &Availability,
    ) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE items SET availability = ?1 WHERE id = ?2",
            params![availability.to_string(), item_id as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownItem(item_id));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Pick> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::ledger::Rotation;
    use crate::draft::pool::tests::{hitter, pitcher};

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open(":memory:").unwrap();
        let owners = vec!["A".to_string(), "B".to_string()];
        let ledger = Ledger::generate(&owners, 2, Rotation::Snake);
        let items = vec![hitter(1, "One", "C"), pitcher(2, "Two", "SP"), hitter(3, "Three", "OF")];
        assert!(store.seed(&items, &ledger).unwrap());
        store
    }

    #[tokio::test]
    async fn seed_then_load() {
        let store = seeded();
        let items = store.load_items().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].stats.k, Some(200.0));
        assert!(items.iter().all(Item::is_available));

        let picks = store.load_picks().await.unwrap();
        let owners: Vec<&str> = picks.iter().map(|p| p.owner.as_str()).collect();
        assert_eq!(owners, vec!["A", "B", "B", "A"]);
        assert!(picks.iter().all(|p| !p.is_bound()));
    }

    #[tokio::test]
    async fn seed_is_first_time_only() {
        let store = seeded();
        let ledger = Ledger::generate(&["X".to_string()], 1, Rotation::Linear);
        assert!(!store.seed(&[], &ledger).unwrap());
        assert_eq!(store.load_picks().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn update_pick_binds_once() {
        let store = seeded();
        store.update_pick(1, 2, "Two").await.unwrap();
        assert_eq!(
            store.update_pick(1, 3, "Three").await,
            Err(StoreError::AlreadyBound(1))
        );
        assert_eq!(
            store.update_pick(99, 3, "Three").await,
            Err(StoreError::UnknownPick(99))
        );

        let picks = store.load_picks().await.unwrap();
        assert_eq!(picks[0].item_id, Some(2));
        assert_eq!(picks[0].item_name.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn update_pick_refuses_item_held_elsewhere() {
        let store = seeded();
        store.update_pick(1, 2, "Two").await.unwrap();
        assert_eq!(
            store.update_pick(2, 2, "Two").await,
            Err(StoreError::ItemTaken(2))
        );

        let picks = store.load_picks().await.unwrap();
        assert_eq!(picks[1].item_id, None);
        store.update_pick(2, 3, "Three").await.unwrap();
    }

    #[tokio::test]
    async fn update_pick_notifies_subscribers() {
        let store = seeded();
        let mut rx = store.subscribe();
        store.update_pick(2, 1, "One").await.unwrap();
        let pick = rx.recv().await.unwrap();
        assert_eq!(pick.pick_number, 2);
        assert_eq!(pick.owner, "B");
        assert_eq!(pick.item_id, Some(1));

        // Rejected binds do not notify.
        let _ = store.update_pick(2, 3, "Three").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_item_sets_availability() {
        let store = seeded();
        store
            .update_item(3, &Availability::Owned("A".into()))
            .await
            .unwrap();
        let items = store.load_items().await.unwrap();
        assert_eq!(items[2].availability.owner(), Some("A"));
        assert_eq!(
            store.update_item(42, &Availability::Available).await,
            Err(StoreError::UnknownItem(42))
        );
    }
}
