// Draft core: pool, ledger, turn order, selection, reconciliation, queue,
// roster assignment.

pub mod clock;
pub mod ledger;
pub mod pool;
pub mod position;
pub mod queue;
pub mod reconcile;
pub mod roster;
pub mod session;
pub mod turn;

use thiserror::Error;

/// Identifier of a pool item (the ESPN player id).
pub type ItemId = u64;

/// Corrupt or inconsistent draft data. Fatal for the slice of state that
/// produced it; callers stop processing that slice instead of patching it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("duplicate pick number {0} in ledger")]
    DuplicatePick(u32),

    #[error("pick number {0} is not in the ledger")]
    UnknownPick(u32),

    #[error("pick #{pick_number} references item {item_id} which is not in the pool")]
    MissingItem { pick_number: u32, item_id: ItemId },

    #[error("duplicate item id {0} in pool")]
    DuplicateItem(ItemId),

    #[error("pick #{0} owner does not match the ledger")]
    OwnerMismatch(u32),

    #[error("item {item_id} is bound to both pick #{held_by} and pick #{incoming}")]
    DoubleBound {
        item_id: ItemId,
        held_by: u32,
        incoming: u32,
    },
}
