// Reconciliation: merge picks pushed by other clients into the local session.
//
// Every incoming pick goes through `apply_notification`, whether it arrived on
// the feed, the store subscription, or a full sweep. Replays are no-ops.

use tracing::{debug, error, info, warn};

use super::ledger::Pick;
use super::pool::Availability;
use super::session::{write_with_retry, Backing, DraftSession, ResolvedPick};
use super::{DraftError, ItemId};
use crate::store::StoreError;

/// Outcome of applying one incoming pick.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Simulated session, or an unbound copy of a pick we hold bound.
    Ignored,
    /// Already known in this exact state.
    Unchanged,
    /// The pick became bound.
    Bound(ResolvedPick),
    /// A bound pick now points at a different item.
    Rebound {
        pick_number: u32,
        previous: ItemId,
        current: ItemId,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub bound: usize,
    pub rebound: usize,
    pub integrity_errors: usize,
    pub pending_cleared: usize,
    pub pending_left: usize,
}

impl DraftSession {
    /// Merge one externally produced pick into local state.
    pub fn apply_notification(&mut self, incoming: Pick) -> Result<Reconciled, DraftError> {
        if matches!(self.backing, Backing::Simulated) {
            return Ok(Reconciled::Ignored);
        }

        let local = self
            .ledger
            .get(incoming.pick_number)
            .ok_or(DraftError::UnknownPick(incoming.pick_number))?;
        if local.owner != incoming.owner {
            return Err(DraftError::OwnerMismatch(incoming.pick_number));
        }

        let Some(item_id) = incoming.item_id else {
            if local.is_bound() {
                debug!(pick = incoming.pick_number, "ignoring unbound copy of a bound pick");
                return Ok(Reconciled::Ignored);
            }
            return Ok(Reconciled::Unchanged);
        };

        if self.pool.find_by_id(item_id).is_none() {
            return Err(DraftError::MissingItem {
                pick_number: incoming.pick_number,
                item_id,
            });
        }

        let previous_item = local.item_id;
        if previous_item == Some(item_id) {
            return Ok(Reconciled::Unchanged);
        }
        if let Some(holder) = self.ledger.pick_for_item(item_id) {
            return Err(DraftError::DoubleBound {
                item_id,
                held_by: holder.pick_number,
                incoming: incoming.pick_number,
            });
        }

        // Round numbering is derived locally; only the binding comes across.
        let merged = Pick {
            item_id: Some(item_id),
            item_name: incoming.item_name,
            ..local.clone()
        };
        let pick_number = merged.pick_number;
        let owner = merged.owner.clone();
        self.ledger.replace(merged)?;
        self.pool.mark_owned(item_id, &owner);
        self.queue.dequeue(item_id);

        if let Some(previous) = previous_item {
            // Last writer wins. Free the old item unless another pick holds it.
            if self.ledger.pick_for_item(previous).is_none() {
                self.pool.mark_available(previous);
            }
            warn!("Pick #{pick_number} rebound from item {previous} to {item_id}");
            return Ok(Reconciled::Rebound {
                pick_number,
                previous,
                current: item_id,
            });
        }

        self.clock.reset();
        let pick = self
            .ledger
            .get(pick_number)
            .ok_or(DraftError::UnknownPick(pick_number))?;
        let item = self
            .pool
            .find_by_id(item_id)
            .cloned()
            .ok_or(DraftError::MissingItem { pick_number, item_id })?;
        let resolved = ResolvedPick {
            pick_number,
            round: pick.round,
            round_pick: pick.round_pick,
            owner,
            item,
        };
        info!(
            "Remote pick #{}: {} took {}",
            resolved.pick_number, resolved.owner, resolved.item.name
        );
        self.fire_commentary(&resolved);
        Ok(Reconciled::Bound(resolved))
    }

    /// Apply every pick of a store snapshot, counting outcomes into
    /// `report`. Returns the first integrity failure, if any.
    pub(crate) fn apply_snapshot(
        &mut self,
        picks: Vec<Pick>,
        report: &mut SweepReport,
    ) -> Option<DraftError> {
        let mut first_error = None;
        report.examined += picks.len();
        for pick in picks {
            let pick_number = pick.pick_number;
            match self.apply_notification(pick) {
                Ok(Reconciled::Bound(_)) => report.bound += 1,
                Ok(Reconciled::Rebound { .. }) => report.rebound += 1,
                Ok(_) => {}
                Err(e) => {
                    error!("Pick #{pick_number} from the store rejected: {e}");
                    report.integrity_errors += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }

    /// Reload every pick from the store, apply each, then retry parked pool
    /// writes. A no-op in Simulated mode.
    pub async fn sweep(&mut self) -> Result<SweepReport, StoreError> {
        let Backing::Live(store) = &self.backing else {
            return Ok(SweepReport::default());
        };
        let store = std::sync::Arc::clone(store);

        let picks = store.load_picks().await?;
        let mut report = SweepReport::default();
        self.apply_snapshot(picks, &mut report);

        let pending = std::mem::take(&mut self.pending);
        for write in pending {
            let availability = Availability::Owned(write.owner.clone());
            match write_with_retry(store.as_ref(), write.item_id, &availability, self.retry).await {
                Ok(()) => {
                    info!(
                        "Sweep: pool write for pick #{} (item {}) completed",
                        write.pick_number, write.item_id
                    );
                    report.pending_cleared += 1;
                }
                Err(e) => {
                    warn!("Sweep: pool write for item {} still failing: {e}", write.item_id);
                    self.pending.push(write);
                }
            }
        }
        report.pending_left = self.pending.len();
        if report.pending_cleared > 0 {
            self.persist_pending();
        }

        if report.bound + report.rebound + report.integrity_errors + report.pending_cleared > 0 {
            info!(?report, "Reconciliation sweep finished");
        } else {
            debug!(?report, "Reconciliation sweep finished");
        }
        Ok(report)
    }
}
