// Pick ledger: the ordered sequence of draft picks and their binding state.

use serde::{Deserialize, Serialize};

use super::{DraftError, ItemId};

/// A single slot in the draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    /// Overall sequence number, 1-based and unique.
    pub pick_number: u32,
    pub round: u32,
    /// Position within the round, 1-based.
    pub round_pick: u32,
    /// Participant who owns this pick. Fixed when the ledger is created.
    pub owner: String,
    /// Bound item, or `None` while the pick is still open.
    pub item_id: Option<ItemId>,
    /// Denormalized display name of the bound item. Never authoritative.
    pub item_name: Option<String>,
}

impl Pick {
    pub fn is_bound(&self) -> bool {
        self.item_id.is_some()
    }

    /// "R3 P7 (#31)" style label.
    pub fn label(&self) -> String {
        format!("R{} P{} (#{})", self.round, self.round_pick, self.pick_number)
    }
}

/// How owner order evolves between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// Order reverses on every even round.
    #[default]
    Snake,
    /// Same order every round.
    Linear,
}

/// Picks sorted by ascending sequence number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    picks: Vec<Pick>,
}

impl Ledger {
    /// Build a ledger from picks in any order. Duplicate sequence numbers
    /// are a data-integrity failure.
    pub fn from_picks(mut picks: Vec<Pick>) -> Result<Self, DraftError> {
        picks.sort_by_key(|p| p.pick_number);
        if let Some(w) = picks.windows(2).find(|w| w[0].pick_number == w[1].pick_number) {
            return Err(DraftError::DuplicatePick(w[0].pick_number));
        }
        Ok(Ledger { picks })
    }

    /// Generate an unbound ledger for `owners` over `rounds` rounds.
    pub fn generate(owners: &[String], rounds: u32, rotation: Rotation) -> Self {
        let per_round = owners.len() as u32;
        let mut picks = Vec::with_capacity((per_round * rounds) as usize);
        for round in 1..=rounds {
            let reversed = rotation == Rotation::Snake && round % 2 == 0;
            for slot in 0..per_round {
                let owner_idx = if reversed { per_round - 1 - slot } else { slot };
                picks.push(Pick {
                    pick_number: (round - 1) * per_round + slot + 1,
                    round,
                    round_pick: slot + 1,
                    owner: owners[owner_idx as usize].clone(),
                    item_id: None,
                    item_name: None,
                });
            }
        }
        Ledger { picks }
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    fn position(&self, pick_number: u32) -> Option<usize> {
        self.picks
            .binary_search_by_key(&pick_number, |p| p.pick_number)
            .ok()
    }

    pub fn get(&self, pick_number: u32) -> Option<&Pick> {
        self.position(pick_number).map(|i| &self.picks[i])
    }

    /// True when every pick is bound (an empty ledger counts as complete).
    pub fn is_complete(&self) -> bool {
        self.picks.iter().all(Pick::is_bound)
    }

    pub fn picks_for<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Pick> + 'a {
        self.picks.iter().filter(move |p| p.owner == owner)
    }

    pub fn bound_picks(&self) -> impl Iterator<Item = &Pick> {
        self.picks.iter().filter(|p| p.is_bound())
    }

    /// The last `n` bound picks, newest first.
    pub fn recent(&self, n: usize) -> Vec<&Pick> {
        self.picks.iter().rev().filter(|p| p.is_bound()).take(n).collect()
    }

    pub fn last_bound(&self) -> Option<&Pick> {
        self.picks.iter().rev().find(|p| p.is_bound())
    }

    /// `(filled, total)` pick counts for one owner.
    pub fn progress(&self, owner: &str) -> (usize, usize) {
        self.picks_for(owner).fold((0, 0), |(filled, total), p| {
            (filled + usize::from(p.is_bound()), total + 1)
        })
    }

    /// Bound item ids for one owner, in pick order.
    pub fn items_for(&self, owner: &str) -> Vec<ItemId> {
        self.picks_for(owner).filter_map(|p| p.item_id).collect()
    }

    /// The pick an item is bound to, if any.
    pub fn pick_for_item(&self, item_id: ItemId) -> Option<&Pick> {
        self.picks.iter().find(|p| p.item_id == Some(item_id))
    }

    /// Bind an item to a pick. Rebinding an already-bound pick is ignored
    /// (picks bind once); the caller has already checked turn order.
    pub(crate) fn bind(
        &mut self,
        pick_number: u32,
        item_id: ItemId,
        item_name: &str,
    ) -> Result<(), DraftError> {
        let idx = self
            .position(pick_number)
            .ok_or(DraftError::UnknownPick(pick_number))?;
        let pick = &mut self.picks[idx];
        if pick.item_id.is_none() {
            pick.item_id = Some(item_id);
            pick.item_name = Some(item_name.to_string());
        }
        Ok(())
    }

    /// Replace the pick with the same sequence number, returning the previous
    /// version.
    pub(crate) fn replace(&mut self, incoming: Pick) -> Result<Pick, DraftError> {
        let idx = self
            .position(incoming.pick_number)
            .ok_or(DraftError::UnknownPick(incoming.pick_number))?;
        Ok(std::mem::replace(&mut self.picks[idx], incoming))
    }
}
