// Message types passed between the feed, the app loop and the console.

use crate::draft::clock::ClockState;
use crate::draft::ledger::Pick;
use crate::draft::pool::{Item, PoolFilter};
use crate::draft::roster::{RosterTotals, TeamNeed};
use crate::draft::ItemId;
use crate::llm::commentary::AnalysisRecord;
use crate::refdata::PlayerDossier;

// ---------------------------------------------------------------------------
// Feed -> app
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected { url: String },
    Disconnected,
    PickUpdated(Pick),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    /// No feed configured, or a simulated session.
    Offline,
}

// ---------------------------------------------------------------------------
// Console -> app
// ---------------------------------------------------------------------------

/// An item named by id or by (partial) name.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRef {
    Id(ItemId),
    Name(String),
}

#[derive(Debug, Clone)]
pub enum UserCommand {
    /// Ask to draft an item into the current pick.
    Draft(ItemRef),
    /// Answer the outstanding draft prompt.
    Confirm(bool),
    QueueAdd(ItemRef),
    QueueRemove(ItemRef),
    ShowQueue,
    Board,
    Pool { filter: PoolFilter, limit: usize },
    /// Show (and select for assignment) a participant's roster.
    Roster { owner: Option<String> },
    Assign { slot: String, item: ItemRef },
    Clear { slot: String },
    Log { limit: usize },
    Analysis { owner: Option<String>, search: String },
    Player(ItemRef),
    /// `None` toggles.
    Audio(Option<bool>),
    Sync,
    Help,
    Quit,
}

// ---------------------------------------------------------------------------
// App -> console
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PickRow {
    pub pick_number: u32,
    pub round: u32,
    pub round_pick: u32,
    pub owner: String,
    pub item_name: Option<String>,
    pub position: Option<String>,
}

impl PickRow {
    pub fn from_pick(pick: &Pick, item: Option<&Item>) -> Self {
        PickRow {
            pick_number: pick.pick_number,
            round: pick.round,
            round_pick: pick.round_pick,
            owner: pick.owner.clone(),
            item_name: item
                .map(|i| i.name.clone())
                .or_else(|| pick.item_name.clone()),
            position: item.map(|i| i.position.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: ItemId,
    pub name: String,
    pub position: String,
    pub team: String,
    pub rank: Option<f64>,
    pub summary: String,
    pub availability: String,
    pub injury: Option<String>,
}

impl ItemRow {
    pub fn from_item(item: &Item) -> Self {
        ItemRow {
            id: item.id,
            name: item.name.clone(),
            position: item.position.clone(),
            team: item.team.clone(),
            rank: item.rank,
            summary: item.stat_summary(),
            availability: item.availability.to_string(),
            injury: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockSnapshot {
    pub pick: PickRow,
    pub remaining_secs: u64,
    pub state: ClockState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnerProgress {
    pub owner: String,
    pub filled: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub league: String,
    pub mode: String,
    pub user: String,
    pub current: Option<PickRow>,
    pub upcoming: Vec<PickRow>,
    pub recent: Vec<PickRow>,
    /// Picks until the user is up; `None` once they have no open picks.
    pub user_turn_in: Option<usize>,
    pub progress: Vec<OwnerProgress>,
    pub pending_writes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotRow {
    pub id: String,
    pub label: String,
    pub occupant: Option<ItemRow>,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterSnapshot {
    pub owner: String,
    pub slots: Vec<SlotRow>,
    pub unslotted: Vec<ItemRow>,
    pub totals: RosterTotals,
    pub needs: Vec<TeamNeed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DossierSnapshot {
    pub item: ItemRow,
    pub dossier: PlayerDossier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Notice(String),
    /// A draft awaiting `yes`/`no`.
    Prompt(String),
    Connection(ConnectionStatus),
    Clock(ClockSnapshot),
    PickMade(PickRow),
    Board(BoardSnapshot),
    /// Most recent bound picks, newest first.
    Log(Vec<PickRow>),
    Pool(Vec<ItemRow>),
    Queue(Vec<ItemRow>),
    Roster(Box<RosterSnapshot>),
    Analysis(Vec<AnalysisRecord>),
    NewAnalysis(AnalysisRecord),
    Dossier(Box<DossierSnapshot>),
    /// Integrity failure; the affected view stops updating.
    Halted(String),
    Help,
}
