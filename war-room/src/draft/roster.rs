// Roster slot assignment: manual placement of owned items into typed slots,
// validated for ownership, eligibility and uniqueness, plus aggregate totals.
//
// There is no automatic placement. Every change goes through `validate`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::ledger::Ledger;
use super::pool::{Item, Pool};
use super::position::{parse_tag, Eligibility, Position};
use super::{DraftError, ItemId};
use crate::local::{roster_key, LocalStore};

/// A typed roster slot from league.toml.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
    /// Unique slot id, e.g. "OF3".
    pub id: String,
    /// Display/grouping label, e.g. "OF".
    pub label: String,
    pub eligibility: Eligibility,
}

impl SlotDef {
    pub fn accepts(&self, item: &Item) -> bool {
        self.eligibility.accepts(&item.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("no roster slot named {0}")]
    UnknownSlot(String),

    #[error("item {0} is not owned by this participant")]
    NotOwned(ItemId),

    #[error("{name} ({position}) is not eligible for slot {slot}")]
    Ineligible {
        name: String,
        position: String,
        slot: String,
    },

    #[error("{name} is already placed in slot {slot}")]
    AlreadyPlaced { name: String, slot: String },
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// Slot id -> item id for one participant. An item occupies at most one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignments {
    slots: BTreeMap<String, ItemId>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupant(&self, slot_id: &str) -> Option<ItemId> {
        self.slots.get(slot_id).copied()
    }

    /// The slot currently holding `item_id`, if any.
    pub fn slot_of(&self, item_id: ItemId) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, &id)| id == item_id)
            .map(|(slot, _)| slot.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check that `item_id` may be placed in `slot_id`. Pure: nothing changes.
    pub fn validate(
        &self,
        slots: &[SlotDef],
        owned: &[&Item],
        slot_id: &str,
        item_id: ItemId,
    ) -> Result<(), AssignmentError> {
        let slot = slots
            .iter()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| AssignmentError::UnknownSlot(slot_id.to_string()))?;
        let item = owned
            .iter()
            .find(|i| i.id == item_id)
            .ok_or(AssignmentError::NotOwned(item_id))?;
        if !slot.accepts(item) {
            return Err(AssignmentError::Ineligible {
                name: item.name.clone(),
                position: item.position.clone(),
                slot: slot.id.clone(),
            });
        }
        if let Some(other) = self.slot_of(item_id) {
            if other != slot_id {
                return Err(AssignmentError::AlreadyPlaced {
                    name: item.name.clone(),
                    slot: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate and place. An existing occupant of the slot is displaced
    /// back to the unslotted list; no other slot changes.
    pub fn assign(
        &mut self,
        slots: &[SlotDef],
        owned: &[&Item],
        slot_id: &str,
        item_id: ItemId,
    ) -> Result<Option<ItemId>, AssignmentError> {
        self.validate(slots, owned, slot_id, item_id)?;
        Ok(self
            .slots
            .insert(slot_id.to_string(), item_id)
            .filter(|&prev| prev != item_id))
    }

    /// Empty one slot, returning its former occupant.
    pub fn clear(&mut self, slot_id: &str) -> Option<ItemId> {
        self.slots.remove(slot_id)
    }

    /// Drop entries that no longer hold: unknown slots, items the participant
    /// does not own, ineligible items, and repeats of an item already placed.
    /// Returns how many entries were dropped.
    pub fn retain_valid(&mut self, slots: &[SlotDef], owned: &[&Item]) -> usize {
        let before = self.slots.len();
        let mut kept = Assignments::new();
        for def in slots {
            if let Some(item_id) = self.occupant(&def.id) {
                if kept.validate(slots, owned, &def.id, item_id).is_ok() {
                    kept.slots.insert(def.id.clone(), item_id);
                }
            }
        }
        *self = kept;
        before - self.slots.len()
    }

    /// Load a participant's assignments from local storage.
    pub fn load(store: &LocalStore, owner: &str) -> Self {
        match store.get(&roster_key(owner)) {
            Ok(Some(a)) => a,
            Ok(None) => Assignments::new(),
            Err(e) => {
                warn!("Discarding unreadable roster assignments for {owner}: {e:#}");
                Assignments::new()
            }
        }
    }

    pub fn save(&self, store: &LocalStore, owner: &str) -> anyhow::Result<()> {
        store.set(&roster_key(owner), self)
    }
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// Items bound to `owner`'s picks, in pick order. A bound id missing from
/// the pool is a data-integrity failure.
pub fn owned_items<'a>(
    ledger: &Ledger,
    pool: &'a Pool,
    owner: &str,
) -> Result<Vec<&'a Item>, DraftError> {
    ledger
        .picks_for(owner)
        .filter_map(|p| p.item_id.map(|id| (p.pick_number, id)))
        .map(|(pick_number, item_id)| {
            pool.find_by_id(item_id)
                .ok_or(DraftError::MissingItem { pick_number, item_id })
        })
        .collect()
}

/// Candidates for `slot`: owned, eligible, and not placed in another slot.
/// The slot's own occupant stays listed.
pub fn candidates<'a>(
    slot: &SlotDef,
    owned: &[&'a Item],
    assignments: &Assignments,
) -> Vec<&'a Item> {
    owned
        .iter()
        .copied()
        .filter(|item| slot.accepts(item))
        .filter(|item| match assignments.slot_of(item.id) {
            Some(other) => other == slot.id,
            None => true,
        })
        .collect()
}

/// Owned items not placed in any slot.
pub fn unslotted<'a>(owned: &[&'a Item], assignments: &Assignments) -> Vec<&'a Item> {
    owned
        .iter()
        .copied()
        .filter(|item| assignments.slot_of(item.id).is_none())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HittingTotals {
    pub r: f64,
    pub hr: f64,
    pub rbi: f64,
    pub sb: f64,
    pub obp: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchingTotals {
    pub k: f64,
    pub qs: f64,
    pub sv_hd: f64,
    pub era: f64,
    pub whip: f64,
}

/// Aggregates over filled slots. Counting stats are summed, rate stats are
/// plain averages across the category; missing values count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RosterTotals {
    pub hitting: HittingTotals,
    pub pitching: PitchingTotals,
    pub hitters: usize,
    pub pitchers: usize,
}

pub fn totals<'a, I>(items: I) -> RosterTotals
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut t = RosterTotals::default();
    let mut obp_sum = 0.0;
    let mut era_sum = 0.0;
    let mut whip_sum = 0.0;
    for item in items {
        let s = &item.stats;
        if item.is_pitcher() {
            t.pitchers += 1;
            t.pitching.k += s.k.unwrap_or(0.0);
            t.pitching.qs += s.qs.unwrap_or(0.0);
            t.pitching.sv_hd += s.sv_hd.unwrap_or(0.0);
            era_sum += s.era.unwrap_or(0.0);
            whip_sum += s.whip.unwrap_or(0.0);
        } else {
            t.hitters += 1;
            t.hitting.r += s.r.unwrap_or(0.0);
            t.hitting.hr += s.hr.unwrap_or(0.0);
            t.hitting.rbi += s.rbi.unwrap_or(0.0);
            t.hitting.sb += s.sb.unwrap_or(0.0);
            obp_sum += s.obp.unwrap_or(0.0);
        }
    }
    if t.hitters > 0 {
        t.hitting.obp = obp_sum / t.hitters as f64;
    }
    if t.pitchers > 0 {
        t.pitching.era = era_sum / t.pitchers as f64;
        t.pitching.whip = whip_sum / t.pitchers as f64;
    }
    t
}

/// Filled-vs-needed count for one slot label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamNeed {
    pub label: String,
    pub filled: usize,
    pub needed: usize,
}

/// Per-label needs summary for a participant's items.
///
/// Labels naming a position count items whose tag carries that position.
/// Labels that are not a position (the bench) count owned items left over
/// once the positional groups are full.
pub fn team_needs(owned: &[&Item], slots: &[SlotDef]) -> Vec<TeamNeed> {
    let mut needs: Vec<(TeamNeed, Option<Position>)> = Vec::new();
    for slot in slots {
        match needs.iter_mut().find(|(n, _)| n.label == slot.label) {
            Some((need, _)) => need.needed += 1,
            None => needs.push((
                TeamNeed {
                    label: slot.label.clone(),
                    filled: 0,
                    needed: 1,
                },
                Position::from_str_pos(&slot.label),
            )),
        }
    }

    let tags: Vec<Vec<Position>> = owned.iter().map(|i| parse_tag(&i.position)).collect();
    let mut positional_used = 0;
    for (need, pos) in needs.iter_mut() {
        if let Some(pos) = pos {
            need.filled = tags.iter().filter(|t| t.contains(pos)).count();
            positional_used += need.filled.min(need.needed);
        }
    }
    let overflow = owned.len().saturating_sub(positional_used);
    for (need, pos) in needs.iter_mut() {
        if pos.is_none() {
            need.filled = overflow;
        }
    }

    needs.into_iter().map(|(n, _)| n).collect()
}

/// One row of the roster view.
#[derive(Debug)]
pub struct SlotView<'a> {
    pub slot: &'a SlotDef,
    pub occupant: Option<&'a Item>,
    pub candidates: Vec<&'a Item>,
}

/// Everything the roster manager shows for one participant.
#[derive(Debug)]
pub struct RosterView<'a> {
    pub owner: String,
    pub slots: Vec<SlotView<'a>>,
    pub unslotted: Vec<&'a Item>,
    pub totals: RosterTotals,
}

pub fn roster_view<'a>(
    owner: &str,
    slots: &'a [SlotDef],
    owned: &[&'a Item],
    assignments: &Assignments,
) -> RosterView<'a> {
    let slot_views: Vec<SlotView<'a>> = slots
        .iter()
        .map(|slot| SlotView {
            slot,
            occupant: assignments
                .occupant(&slot.id)
                .and_then(|id| owned.iter().copied().find(|i| i.id == id)),
            candidates: candidates(slot, owned, assignments),
        })
        .collect();
    let totals = totals(slot_views.iter().filter_map(|v| v.occupant));
    RosterView {
        owner: owner.to_string(),
        slots: slot_views,
        unslotted: unslotted(owned, assignments),
        totals,
    }
}
