// Draft session: owns the ledger, pool, queue, clock and commentary trigger,
// and applies selections in Live or Simulated mode.
//
// Live writes go to the shared store first. The ledger binding must be
// accepted before anything local changes; a refused binding pulls the store's
// picks in before reporting. The pool write that follows is retried with
// backoff and, if it still fails, parked as a pending write (kept in local
// storage) for the reconciliation sweep.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use super::clock::PickClock;
use super::ledger::{Ledger, Pick};
use super::pool::{Availability, Item, Pool};
use super::queue::Queue;
use super::reconcile::SweepReport;
use super::roster::{owned_items, totals};
use super::turn;
use super::{DraftError, ItemId};
use crate::llm::commentary::{CommentaryRequest, CommentaryTrigger};
use crate::local::{LocalStore, PENDING_KEY};
use crate::store::{DraftStore, StoreError};

// ---------------------------------------------------------------------------
// Mode / backing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Simulated,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("live"),
            Mode::Simulated => f.write_str("simulated"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "simulated" | "sim" | "mock" => Ok(Mode::Simulated),
            other => Err(format!("unknown mode `{other}` (expected live or simulated)")),
        }
    }
}

/// Where selections are written. Fixed for the life of a session.
#[derive(Clone)]
pub enum Backing {
    Live(Arc<dyn DraftStore>),
    Simulated,
}

impl Backing {
    pub fn mode(&self) -> Mode {
        match self {
            Backing::Live(_) => Mode::Live,
            Backing::Simulated => Mode::Simulated,
        }
    }
}

// ---------------------------------------------------------------------------
// Selection types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("the draft is complete")]
    DraftComplete,

    #[error("it is {owner}'s pick, not {acting}'s")]
    TurnViolation { acting: String, owner: String },

    #[error("{item} was already drafted by {owner}")]
    ItemUnavailable { item: String, owner: String },

    #[error("item {0} is not in the player pool")]
    UnknownItem(ItemId),

    #[error("the draft store rejected the pick: {0}")]
    StoreWriteFailure(#[source] StoreError),

    #[error(transparent)]
    Integrity(#[from] DraftError),
}

/// What the user is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPrompt {
    pub pick_number: u32,
    pub round: u32,
    pub round_pick: u32,
    pub owner: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub position: String,
}

impl fmt::Display for DraftPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Draft {} for {}?", self.item_name, self.owner)
    }
}

/// Confirmation step between validation and mutation.
pub trait ConfirmGate {
    fn confirm(&mut self, prompt: &DraftPrompt) -> bool;
}

impl<F> ConfirmGate for F
where
    F: FnMut(&DraftPrompt) -> bool,
{
    fn confirm(&mut self, prompt: &DraftPrompt) -> bool {
        self(prompt)
    }
}

/// A pre-recorded answer, for callers that collected it up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accept,
    Decline,
}

impl ConfirmGate for Confirmation {
    fn confirm(&mut self, _prompt: &DraftPrompt) -> bool {
        *self == Confirmation::Accept
    }
}

/// A pick that just became bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPick {
    pub pick_number: u32,
    pub round: u32,
    pub round_pick: u32,
    pub owner: String,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Drafted(ResolvedPick),
    Declined,
}

/// A pool write the store did not accept; retried by the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub pick_number: u32,
    pub item_id: ItemId,
    pub owner: String,
}

/// Backoff for pool writes after the ledger write was accepted.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
        }
    }
}

/// Write `availability` for `item_id`, retrying with exponential backoff.
pub(crate) async fn write_with_retry(
    store: &dyn DraftStore,
    item_id: ItemId,
    availability: &Availability,
    policy: RetryPolicy,
) -> Result<(), StoreError> {
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match store.update_item(item_id, availability).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= policy.attempts.max(1) => return Err(e),
            Err(e) => {
                warn!(attempt, item_id, "pool write failed, retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DraftSession
// ---------------------------------------------------------------------------

pub struct DraftSession {
    pub(crate) backing: Backing,
    pub(crate) ledger: Ledger,
    pub(crate) pool: Pool,
    pub(crate) queue: Queue,
    pub(crate) clock: PickClock,
    pub(crate) commentary: CommentaryTrigger,
    pub(crate) pending: Vec<PendingWrite>,
    pub(crate) pending_store: Option<LocalStore>,
    pub(crate) retry: RetryPolicy,
}

impl DraftSession {
    pub fn new(
        backing: Backing,
        ledger: Ledger,
        pool: Pool,
        queue: Queue,
        clock: PickClock,
        commentary: CommentaryTrigger,
    ) -> Self {
        Self {
            backing,
            ledger,
            pool,
            queue,
            clock,
            commentary,
            pending: Vec::new(),
            pending_store: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Load the shared ledger and pool from `store`. In Simulated mode the
    /// loaded state becomes a private copy and the store is not used again.
    pub async fn from_store(
        store: Arc<dyn DraftStore>,
        mode: Mode,
        queue: Queue,
        clock: PickClock,
        commentary: CommentaryTrigger,
    ) -> anyhow::Result<Self> {
        let items = store.load_items().await?;
        let picks = store.load_picks().await?;
        let pool = Pool::new(items)?;
        let ledger = Ledger::from_picks(picks)?;
        let backing = match mode {
            Mode::Live => Backing::Live(store),
            Mode::Simulated => Backing::Simulated,
        };
        info!(
            "Draft session ({mode}) loaded: {} items, {} picks, {} bound",
            pool.len(),
            ledger.len(),
            ledger.bound_picks().count()
        );
        Ok(Self::new(backing, ledger, pool, queue, clock, commentary))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep parked pool writes in `local` so a restart does not lose them.
    /// A Live session picks up whatever an earlier run left behind.
    pub fn with_local(mut self, local: LocalStore) -> Self {
        if self.mode() == Mode::Live {
            let saved: Vec<PendingWrite> = local.get_or_discard(PENDING_KEY).unwrap_or_default();
            if !saved.is_empty() {
                info!("Restored {} pool writes awaiting sync", saved.len());
            }
            for write in saved {
                if !self.pending.contains(&write) {
                    self.pending.push(write);
                }
            }
        }
        self.pending_store = Some(local);
        self
    }

    pub(crate) fn persist_pending(&self) {
        if let Some(local) = &self.pending_store {
            if let Err(e) = local.set(PENDING_KEY, &self.pending) {
                warn!("Failed to persist pending pool writes: {e:#}");
            }
        }
    }

    pub fn mode(&self) -> Mode {
        self.backing.mode()
    }

    pub fn store(&self) -> Option<&Arc<dyn DraftStore>> {
        match &self.backing {
            Backing::Live(store) => Some(store),
            Backing::Simulated => None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Queue {
        &mut self.queue
    }

    pub fn clock(&self) -> &PickClock {
        &self.clock
    }

    pub fn current_pick(&self) -> Option<&Pick> {
        turn::current_pick(&self.ledger)
    }

    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// Steps 1-2 of a selection: turn order and item availability. Returns
    /// the confirmation prompt without changing anything.
    pub fn check_selection(&self, item_id: ItemId, acting: &str) -> Result<DraftPrompt, SelectError> {
        let current = self.current_pick().ok_or(SelectError::DraftComplete)?;
        if self.mode() == Mode::Live && current.owner != acting {
            return Err(SelectError::TurnViolation {
                acting: acting.to_string(),
                owner: current.owner.clone(),
            });
        }

        let item = self
            .pool
            .find_by_id(item_id)
            .ok_or(SelectError::UnknownItem(item_id))?;
        if let Some(owner) = item.availability.owner() {
            return Err(SelectError::ItemUnavailable {
                item: item.name.clone(),
                owner: owner.to_string(),
            });
        }

        Ok(DraftPrompt {
            pick_number: current.pick_number,
            round: current.round,
            round_pick: current.round_pick,
            owner: current.owner.clone(),
            item_id,
            item_name: item.name.clone(),
            position: item.position.clone(),
        })
    }

    /// Draft `item_id` into the current pick on behalf of `acting`.
    pub async fn select<G>(
        &mut self,
        item_id: ItemId,
        acting: &str,
        gate: &mut G,
    ) -> Result<Selection, SelectError>
    where
        G: ConfirmGate + ?Sized,
    {
        let prompt = self.check_selection(item_id, acting)?;
        if !gate.confirm(&prompt) {
            info!("Pick #{} declined: {}", prompt.pick_number, prompt.item_name);
            return Ok(Selection::Declined);
        }

        // Optimistic local effects; not rolled back if the store refuses.
        self.queue.dequeue(item_id);
        self.clock.reset();

        if let Backing::Live(store) = &self.backing {
            let store = Arc::clone(store);
            if let Err(e) = store
                .update_pick(prompt.pick_number, item_id, &prompt.item_name)
                .await
            {
                warn!("Store rejected pick #{}: {e}", prompt.pick_number);
                return Err(self.explain_rejection(store.as_ref(), item_id, e).await);
            }

            self.ledger
                .bind(prompt.pick_number, item_id, &prompt.item_name)?;
            self.pool.mark_owned(item_id, &prompt.owner);

            let availability = Availability::Owned(prompt.owner.clone());
            if let Err(e) = write_with_retry(store.as_ref(), item_id, &availability, self.retry).await {
                error!(
                    "Pool write for pick #{} ({}) failed, needs reconciliation: {e}",
                    prompt.pick_number, prompt.item_name
                );
                self.pending.push(PendingWrite {
                    pick_number: prompt.pick_number,
                    item_id,
                    owner: prompt.owner.clone(),
                });
                self.persist_pending();
            }
        } else {
            self.ledger
                .bind(prompt.pick_number, item_id, &prompt.item_name)?;
            self.pool.mark_owned(item_id, &prompt.owner);
        }

        let item = self
            .pool
            .find_by_id(item_id)
            .cloned()
            .ok_or(SelectError::UnknownItem(item_id))?;
        let resolved = ResolvedPick {
            pick_number: prompt.pick_number,
            round: prompt.round,
            round_pick: prompt.round_pick,
            owner: prompt.owner,
            item,
        };
        info!(
            "Pick #{} (R{} P{}): {} selects {} ({})",
            resolved.pick_number,
            resolved.round,
            resolved.round_pick,
            resolved.owner,
            resolved.item.name,
            resolved.item.position
        );
        self.fire_commentary(&resolved);
        Ok(Selection::Drafted(resolved))
    }

    /// The store refused a binding. Pull in its picks so the board is current,
    /// then report the item as taken if another pick now holds it.
    async fn explain_rejection(
        &mut self,
        store: &dyn DraftStore,
        item_id: ItemId,
        err: StoreError,
    ) -> SelectError {
        if !matches!(err, StoreError::AlreadyBound(_) | StoreError::ItemTaken(_)) {
            return SelectError::StoreWriteFailure(err);
        }
        let picks = match store.load_picks().await {
            Ok(picks) => picks,
            Err(load_err) => {
                warn!("Could not reload picks after a refused bind: {load_err}");
                return SelectError::StoreWriteFailure(err);
            }
        };
        let mut report = SweepReport::default();
        if let Some(integrity) = self.apply_snapshot(picks, &mut report) {
            return SelectError::Integrity(integrity);
        }

        match self.pool.find_by_id(item_id) {
            Some(item) => match item.availability.owner() {
                Some(owner) => SelectError::ItemUnavailable {
                    item: item.name.clone(),
                    owner: owner.to_string(),
                },
                None => SelectError::StoreWriteFailure(err),
            },
            None => SelectError::StoreWriteFailure(err),
        }
    }

    /// Enqueue commentary for a freshly bound pick.
    pub(crate) fn fire_commentary(&mut self, resolved: &ResolvedPick) {
        let (owner_totals, owner_roster) = match owned_items(&self.ledger, &self.pool, &resolved.owner) {
            Ok(items) => (
                totals(items.iter().copied()),
                items
                    .iter()
                    .filter(|i| i.id != resolved.item.id)
                    .map(|i| i.name.clone())
                    .collect(),
            ),
            Err(e) => {
                warn!("Commentary context for {} incomplete: {e}", resolved.owner);
                (Default::default(), Vec::new())
            }
        };
        self.commentary.trigger(CommentaryRequest {
            pick_number: resolved.pick_number,
            round: resolved.round,
            owner: resolved.owner.clone(),
            item: resolved.item.clone(),
            owner_totals,
            owner_roster,
        });
    }
}
