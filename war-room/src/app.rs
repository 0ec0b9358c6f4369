// Application state and orchestration logic.
//
// The central event loop that coordinates feed events, store notifications,
// commentary results and user commands from the console. Owns the draft
// session and pushes UI updates to the console printer.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::audio::AudioCue;
use crate::config::Config;
use crate::draft::clock::ClockState;
use crate::draft::ledger::Pick;
use crate::draft::pool::{Item, Pool};
use crate::draft::reconcile::Reconciled;
use crate::draft::roster::{owned_items, roster_view, team_needs, Assignments};
use crate::draft::session::{DraftPrompt, DraftSession, SelectError, Selection};
use crate::draft::{turn, DraftError, ItemId};
use crate::llm::commentary::{AnalysisLog, AnalysisRecord};
use crate::local::LocalStore;
use crate::protocol::{
    BoardSnapshot, ClockSnapshot, ConnectionStatus, DossierSnapshot, FeedEvent, ItemRef, ItemRow,
    OwnerProgress, PickRow, RosterSnapshot, SlotRow, UiUpdate, UserCommand,
};
use crate::refdata::{injury_label, RefData};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Clock refresh cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const UPCOMING_PICKS: usize = 8;
const RECENT_PICKS: usize = 5;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub session: DraftSession,
    /// Self-declared identity.
    pub user: String,
    pub local: LocalStore,
    pub analysis: AnalysisLog,
    pub refdata: RefData,
    pub audio: AudioCue,
    pub connection: ConnectionStatus,
    /// Draft waiting for `yes`/`no`.
    pub pending_prompt: Option<DraftPrompt>,
    /// Participant whose roster is shown and edited.
    pub roster_owner: String,
    pub assignments: Assignments,
    /// Injury status by player id, from the reference data.
    pub injuries: HashMap<String, String>,
    /// Set once an integrity failure stops the board from updating.
    pub halted: Option<String>,
    last_current: Option<u32>,
    last_clock_state: Option<ClockState>,
}

impl AppState {
    pub fn new(
        config: Config,
        mut session: DraftSession,
        user: String,
        local: LocalStore,
        analysis: AnalysisLog,
        refdata: RefData,
        audio: AudioCue,
    ) -> Self {
        let stale: Vec<ItemId> = session
            .queue()
            .items()
            .iter()
            .copied()
            .filter(|id| !session.pool().is_available(*id))
            .collect();
        for id in stale {
            session.queue_mut().dequeue(id);
        }

        let assignments = Assignments::load(&local, &user);
        let last_current = session.current_pick().map(|p| p.pick_number);
        AppState {
            config,
            session,
            roster_owner: user.clone(),
            user,
            local,
            analysis,
            refdata,
            audio,
            connection: ConnectionStatus::Offline,
            pending_prompt: None,
            assignments,
            injuries: HashMap::new(),
            halted: None,
            last_current,
            last_clock_state: None,
        }
    }

    pub fn item_row(&self, item: &Item) -> ItemRow {
        let mut row = ItemRow::from_item(item);
        row.injury = self
            .injuries
            .get(&item.id.to_string())
            .map(|s| injury_label(s));
        row
    }

    fn pick_row(&self, pick: &Pick) -> PickRow {
        let pool = self.session.pool();
        PickRow::from_pick(pick, pick.item_id.and_then(|id| pool.find_by_id(id)))
    }

    pub fn board_snapshot(&self) -> BoardSnapshot {
        let ledger = self.session.ledger();
        BoardSnapshot {
            league: self.config.league.name.clone(),
            mode: self.session.mode().to_string(),
            user: self.user.clone(),
            current: self.session.current_pick().map(|p| self.pick_row(p)),
            upcoming: turn::upcoming(ledger, UPCOMING_PICKS)
                .into_iter()
                .map(|p| self.pick_row(p))
                .collect(),
            recent: ledger
                .recent(RECENT_PICKS)
                .into_iter()
                .map(|p| self.pick_row(p))
                .collect(),
            user_turn_in: turn::picks_until_turn(ledger, &self.user),
            progress: self
                .config
                .league
                .owners
                .iter()
                .map(|owner| {
                    let (filled, total) = ledger.progress(owner);
                    OwnerProgress {
                        owner: owner.clone(),
                        filled,
                        total,
                    }
                })
                .collect(),
            pending_writes: self.session.pending_writes().len(),
        }
    }

    pub fn clock_snapshot(&self) -> Option<ClockSnapshot> {
        let pick = self.session.current_pick()?;
        let clock = self.session.clock();
        Some(ClockSnapshot {
            pick: self.pick_row(pick),
            remaining_secs: clock.remaining_secs(),
            state: clock.state(),
        })
    }

    pub fn roster_snapshot(&self) -> Result<RosterSnapshot, DraftError> {
        let owned = owned_items(self.session.ledger(), self.session.pool(), &self.roster_owner)?;
        let view = roster_view(&self.roster_owner, &self.config.slots, &owned, &self.assignments);
        let slots = view
            .slots
            .iter()
            .map(|v| SlotRow {
                id: v.slot.id.clone(),
                label: v.slot.label.clone(),
                occupant: v.occupant.map(|i| self.item_row(i)),
                candidates: v
                    .candidates
                    .iter()
                    .filter(|c| v.occupant.map_or(true, |o| o.id != c.id))
                    .map(|c| c.name.clone())
                    .collect(),
            })
            .collect();
        Ok(RosterSnapshot {
            owner: view.owner.clone(),
            slots,
            unslotted: view.unslotted.iter().map(|i| self.item_row(i)).collect(),
            totals: view.totals,
            needs: team_needs(&owned, &self.config.slots),
        })
    }

    fn queue_rows(&self) -> Vec<ItemRow> {
        let pool = self.session.pool();
        self.session
            .queue()
            .items()
            .iter()
            .filter_map(|id| pool.find_by_id(*id))
            .map(|i| self.item_row(i))
            .collect()
    }

    fn find_owner(&self, name: &str) -> Option<String> {
        self.config
            .league
            .owners
            .iter()
            .find(|o| o.eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    /// Switch the roster view to `owner`, dropping stored placements that no
    /// longer validate.
    fn select_roster_owner(&mut self, owner: String) -> Result<(), DraftError> {
        let mut assignments = Assignments::load(&self.local, &owner);
        let owned = owned_items(self.session.ledger(), self.session.pool(), &owner)?;
        let dropped = assignments.retain_valid(&self.config.slots, &owned);
        if dropped > 0 {
            info!("Dropped {dropped} stale roster placements for {owner}");
            if let Err(e) = assignments.save(&self.local, &owner) {
                warn!("Failed to save roster assignments for {owner}: {e:#}");
            }
        }
        self.roster_owner = owner;
        self.assignments = assignments;
        Ok(())
    }
}

/// Resolve an item reference against the whole pool. Names match exactly
/// first, then by unique substring (preferring a unique available match).
pub fn resolve_item(pool: &Pool, item: &ItemRef) -> Result<ItemId, String> {
    match item {
        ItemRef::Id(id) => pool
            .find_by_id(*id)
            .map(|i| i.id)
            .ok_or_else(|| format!("No player with id {id}")),
        ItemRef::Name(name) => {
            let needle = name.trim().to_lowercase();
            if needle.is_empty() {
                return Err("Name a player".to_string());
            }
            if let Some(exact) = pool.items().iter().find(|i| i.name.to_lowercase() == needle) {
                return Ok(exact.id);
            }
            let matches: Vec<&Item> = pool
                .items()
                .iter()
                .filter(|i| i.name.to_lowercase().contains(&needle))
                .collect();
            match matches.as_slice() {
                [] => Err(format!("No player matching \"{name}\"")),
                [one] => Ok(one.id),
                many => {
                    let available: Vec<&&Item> = many.iter().filter(|i| i.is_available()).collect();
                    if let [only] = available.as_slice() {
                        return Ok(only.id);
                    }
                    let names: Vec<&str> = many.iter().take(5).map(|i| i.name.as_str()).collect();
                    Err(format!(
                        "\"{name}\" matches {} players: {}",
                        many.len(),
                        names.join(", ")
                    ))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn recv_store(rx: &mut Option<broadcast::Receiver<Pick>>) -> Result<Pick, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run the main application event loop.
///
/// Listens using `tokio::select!` on:
/// 1. Feed events from other clients
/// 2. Pick notifications from the shared store (Live only)
/// 3. Commentary results
/// 4. User commands from the console
/// 5. The clock tick and the reconciliation sweep interval
///
/// Pushes UI updates through `ui_tx`.
pub async fn run(
    mut feed_rx: mpsc::Receiver<FeedEvent>,
    mut analysis_rx: mpsc::Receiver<AnalysisRecord>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started ({} mode)", state.session.mode());

    let mut store_rx = state.session.store().map(|s| s.subscribe());
    // A closed channel is parked instead of polled so select! never spins.
    let mut feed_open = true;
    let mut analysis_open = true;

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.tick().await;
    let mut sweep_interval =
        tokio::time::interval(Duration::from_secs(state.config.app.reconcile.interval_secs));
    sweep_interval.tick().await;

    let _ = ui_tx.send(UiUpdate::Connection(state.connection)).await;
    let _ = ui_tx.send(UiUpdate::Board(state.board_snapshot())).await;
    if let Some(clock) = state.clock_snapshot() {
        state.last_clock_state = Some(clock.state);
        let _ = ui_tx.send(UiUpdate::Clock(clock)).await;
    }

    loop {
        tokio::select! {
            // --- Feed events ---
            event = feed_rx.recv(), if feed_open => {
                match event {
                    Some(event) => handle_feed_event(&mut state, event, &ui_tx).await,
                    None => {
                        debug!("Feed channel closed");
                        feed_open = false;
                    }
                }
            }

            // --- Store notifications ---
            notification = recv_store(&mut store_rx) => {
                match notification {
                    Ok(pick) => apply_remote(&mut state, pick, &ui_tx).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {missed} store notifications, sweeping");
                        run_sweep(&mut state, &ui_tx, false).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Store notification channel closed");
                        store_rx = None;
                    }
                }
            }

            // --- Commentary results ---
            record = analysis_rx.recv(), if analysis_open => {
                match record {
                    Some(record) => {
                        if state.analysis.append(record.clone()) {
                            let _ = ui_tx.send(UiUpdate::NewAnalysis(record)).await;
                        }
                    }
                    None => {
                        debug!("Analysis channel closed");
                        analysis_open = false;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut state, cmd, &ui_tx).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Clock ---
            _ = tick.tick() => handle_tick(&mut state, &ui_tx).await,

            // --- Periodic reconciliation ---
            _ = sweep_interval.tick() => run_sweep(&mut state, &ui_tx, false).await,
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

async fn handle_feed_event(state: &mut AppState, event: FeedEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    match event {
        FeedEvent::Connected { url } => {
            info!("Feed connected ({url})");
            state.connection = ConnectionStatus::Connected;
            let _ = ui_tx.send(UiUpdate::Connection(state.connection)).await;
            // Anything pushed while we were away is only visible in the store.
            run_sweep(state, ui_tx, false).await;
        }
        FeedEvent::Disconnected => {
            info!("Feed disconnected");
            state.connection = ConnectionStatus::Disconnected;
            let _ = ui_tx.send(UiUpdate::Connection(state.connection)).await;
        }
        FeedEvent::PickUpdated(pick) => apply_remote(state, pick, ui_tx).await,
    }
}

async fn apply_remote(state: &mut AppState, pick: Pick, ui_tx: &mpsc::Sender<UiUpdate>) {
    let pick_number = pick.pick_number;
    match state.session.apply_notification(pick) {
        Ok(Reconciled::Bound(resolved)) => {
            let row = state
                .session
                .ledger()
                .get(resolved.pick_number)
                .map(|p| state.pick_row(p));
            if let Some(row) = row {
                let _ = ui_tx.send(UiUpdate::PickMade(row)).await;
            }
            on_ledger_change(state, ui_tx).await;
        }
        Ok(Reconciled::Rebound {
            pick_number,
            previous,
            current,
        }) => {
            let name = |id: ItemId| {
                state
                    .session
                    .pool()
                    .find_by_id(id)
                    .map_or_else(|| id.to_string(), |i| i.name.clone())
            };
            let msg = format!(
                "Pick #{pick_number} changed from {} to {}",
                name(previous),
                name(current)
            );
            let _ = ui_tx.send(UiUpdate::Notice(msg)).await;
            on_ledger_change(state, ui_tx).await;
        }
        Ok(Reconciled::Ignored | Reconciled::Unchanged) => {}
        Err(e) => halt(state, format!("Pick #{pick_number} update rejected: {e}"), ui_tx).await,
    }
}

/// Follow-up after the ledger moved: cancel a stale prompt, announce a new
/// pick on the clock.
async fn on_ledger_change(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    if let Some(prompt) = &state.pending_prompt {
        let stale = state.session.current_pick().map(|p| p.pick_number) != Some(prompt.pick_number)
            || !state.session.pool().is_available(prompt.item_id);
        if stale {
            let msg = format!("Prompt cancelled, the board changed: {prompt}");
            state.pending_prompt = None;
            let _ = ui_tx.send(UiUpdate::Notice(msg)).await;
        }
    }

    let current = state.session.current_pick().map(|p| (p.pick_number, p.owner.clone()));
    let number = current.as_ref().map(|(n, _)| *n);
    if number == state.last_current {
        return;
    }
    state.last_current = number;

    match current {
        Some((_, owner)) => {
            state.audio.announce(&owner);
            if let Some(clock) = state.clock_snapshot() {
                state.last_clock_state = Some(clock.state);
                let _ = ui_tx.send(UiUpdate::Clock(clock)).await;
            }
        }
        None => {
            info!("Draft complete");
            state.last_clock_state = None;
            let _ = ui_tx
                .send(UiUpdate::Notice("The draft is complete".to_string()))
                .await;
        }
    }
}

async fn handle_tick(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let Some(clock) = state.clock_snapshot() else {
        return;
    };
    if state.last_clock_state == Some(clock.state) {
        return;
    }
    state.last_clock_state = Some(clock.state);
    if clock.state != ClockState::Running {
        let _ = ui_tx.send(UiUpdate::Clock(clock)).await;
    }
}

async fn run_sweep(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>, announce: bool) {
    match state.session.sweep().await {
        Ok(report) => {
            if report.integrity_errors > 0 {
                let msg = format!(
                    "{} picks failed integrity checks during sync (see log)",
                    report.integrity_errors
                );
                halt(state, msg, ui_tx).await;
            }
            if report.bound + report.rebound > 0 {
                on_ledger_change(state, ui_tx).await;
                let msg = format!("Synced {} new picks", report.bound + report.rebound);
                let _ = ui_tx.send(UiUpdate::Notice(msg)).await;
            } else if announce {
                let msg = match report.pending_left {
                    0 => "Up to date".to_string(),
                    n => format!("Up to date; {n} pool writes still pending"),
                };
                let _ = ui_tx.send(UiUpdate::Notice(msg)).await;
            }
        }
        Err(e) => {
            warn!("Reconciliation sweep failed: {e}");
            if announce {
                let _ = ui_tx
                    .send(UiUpdate::Notice(format!("Sync failed: {e}")))
                    .await;
            }
        }
    }
}

async fn halt(state: &mut AppState, message: String, ui_tx: &mpsc::Sender<UiUpdate>) {
    error!("{message}");
    state.halted = Some(message.clone());
    let _ = ui_tx.send(UiUpdate::Halted(message)).await;
}

async fn notice(ui_tx: &mpsc::Sender<UiUpdate>, message: impl Into<String>) {
    let _ = ui_tx.send(UiUpdate::Notice(message.into())).await;
}

/// Handle a user command from the console.
async fn handle_user_command(state: &mut AppState, cmd: UserCommand, ui_tx: &mpsc::Sender<UiUpdate>) {
    match cmd {
        UserCommand::Draft(item) => {
            if let Some(reason) = &state.halted {
                notice(ui_tx, format!("Drafting is halted: {reason}")).await;
                return;
            }
            let id = match resolve_item(state.session.pool(), &item) {
                Ok(id) => id,
                Err(msg) => return notice(ui_tx, msg).await,
            };
            match state.session.check_selection(id, &state.user) {
                Ok(prompt) => {
                    let _ = ui_tx.send(UiUpdate::Prompt(prompt.to_string())).await;
                    state.pending_prompt = Some(prompt);
                }
                Err(e) => notice(ui_tx, e.to_string()).await,
            }
        }
        UserCommand::Confirm(yes) => {
            let Some(prompt) = state.pending_prompt.take() else {
                return notice(ui_tx, "Nothing to confirm").await;
            };
            if !yes {
                return notice(ui_tx, format!("Cancelled: {}", prompt.item_name)).await;
            }
            // The pick must still be the one the user agreed to.
            let mut gate = |p: &DraftPrompt| *p == prompt;
            match state.session.select(prompt.item_id, &state.user, &mut gate).await {
                Ok(Selection::Drafted(resolved)) => {
                    let row = state
                        .session
                        .ledger()
                        .get(resolved.pick_number)
                        .map(|p| state.pick_row(p));
                    if let Some(row) = row {
                        let _ = ui_tx.send(UiUpdate::PickMade(row)).await;
                    }
                    on_ledger_change(state, ui_tx).await;
                }
                Ok(Selection::Declined) => {
                    notice(ui_tx, "The board changed before confirmation; draft again").await;
                }
                Err(SelectError::Integrity(e)) => {
                    halt(state, format!("Draft failed integrity check: {e}"), ui_tx).await;
                }
                Err(e) => notice(ui_tx, e.to_string()).await,
            }
        }
        UserCommand::QueueAdd(item) => {
            let id = match resolve_item(state.session.pool(), &item) {
                Ok(id) => id,
                Err(msg) => return notice(ui_tx, msg).await,
            };
            if let Some(owner) = state.session.pool().owner_of(id) {
                return notice(ui_tx, format!("Already drafted by {owner}")).await;
            }
            if !state.session.queue_mut().enqueue(id) {
                notice(ui_tx, "Already queued").await;
            }
            let _ = ui_tx.send(UiUpdate::Queue(state.queue_rows())).await;
        }
        UserCommand::QueueRemove(item) => {
            let id = match resolve_item(state.session.pool(), &item) {
                Ok(id) => id,
                Err(msg) => return notice(ui_tx, msg).await,
            };
            if !state.session.queue_mut().dequeue(id) {
                notice(ui_tx, "Not in your queue").await;
            }
            let _ = ui_tx.send(UiUpdate::Queue(state.queue_rows())).await;
        }
        UserCommand::ShowQueue => {
            let _ = ui_tx.send(UiUpdate::Queue(state.queue_rows())).await;
        }
        UserCommand::Board => {
            let _ = ui_tx.send(UiUpdate::Board(state.board_snapshot())).await;
        }
        UserCommand::Pool { filter, limit } => {
            let rows = state
                .session
                .pool()
                .browse(&filter, limit)
                .into_iter()
                .map(|i| state.item_row(i))
                .collect();
            let _ = ui_tx.send(UiUpdate::Pool(rows)).await;
        }
        UserCommand::Roster { owner } => {
            if let Some(name) = owner {
                let Some(found) = state.find_owner(&name) else {
                    return notice(ui_tx, format!("No participant named {name}")).await;
                };
                if let Err(e) = state.select_roster_owner(found) {
                    return halt(state, format!("Roster unavailable: {e}"), ui_tx).await;
                }
            }
            send_roster(state, ui_tx).await;
        }
        UserCommand::Assign { slot, item } => {
            let id = match resolve_item(state.session.pool(), &item) {
                Ok(id) => id,
                Err(msg) => return notice(ui_tx, msg).await,
            };
            let owned = match owned_items(state.session.ledger(), state.session.pool(), &state.roster_owner) {
                Ok(owned) => owned,
                Err(e) => return halt(state, format!("Roster unavailable: {e}"), ui_tx).await,
            };
            match state.assignments.assign(&state.config.slots, &owned, &slot, id) {
                Ok(displaced) => {
                    if let Some(prev) = displaced {
                        debug!("Slot {slot}: replaced item {prev}");
                    }
                    if let Err(e) = state.assignments.save(&state.local, &state.roster_owner) {
                        warn!("Failed to save roster assignments: {e:#}");
                    }
                    send_roster(state, ui_tx).await;
                }
                Err(e) => notice(ui_tx, e.to_string()).await,
            }
        }
        UserCommand::Clear { slot } => {
            if state.assignments.clear(&slot).is_none() {
                return notice(ui_tx, format!("Slot {slot} is already empty")).await;
            }
            if let Err(e) = state.assignments.save(&state.local, &state.roster_owner) {
                warn!("Failed to save roster assignments: {e:#}");
            }
            send_roster(state, ui_tx).await;
        }
        UserCommand::Log { limit } => {
            let rows = state
                .session
                .ledger()
                .recent(limit)
                .into_iter()
                .map(|p| state.pick_row(p))
                .collect();
            let _ = ui_tx.send(UiUpdate::Log(rows)).await;
        }
        UserCommand::Analysis { owner, search } => {
            let owner = match owner {
                Some(name) => match state.find_owner(&name) {
                    Some(found) => Some(found),
                    None => return notice(ui_tx, format!("No participant named {name}")).await,
                },
                None => None,
            };
            let records = state
                .analysis
                .filtered(owner.as_deref(), &search)
                .into_iter()
                .cloned()
                .collect();
            let _ = ui_tx.send(UiUpdate::Analysis(records)).await;
        }
        UserCommand::Player(item) => {
            let id = match resolve_item(state.session.pool(), &item) {
                Ok(id) => id,
                Err(msg) => return notice(ui_tx, msg).await,
            };
            let dossier = state.refdata.dossier(id).await;
            if let Some(item) = state.session.pool().find_by_id(id) {
                let snapshot = DossierSnapshot {
                    item: state.item_row(item),
                    dossier,
                };
                let _ = ui_tx.send(UiUpdate::Dossier(Box::new(snapshot))).await;
            }
        }
        UserCommand::Audio(setting) => {
            let enabled = setting.unwrap_or(!state.audio.is_enabled());
            state.audio.set_enabled(enabled);
            info!("Audio cues {}", if enabled { "enabled" } else { "disabled" });
            notice(ui_tx, format!("Audio {}", if enabled { "on" } else { "off" })).await;
        }
        UserCommand::Sync => run_sweep(state, ui_tx, true).await,
        UserCommand::Help => {
            let _ = ui_tx.send(UiUpdate::Help).await;
        }
        UserCommand::Quit => {
            // Handled in the main loop
        }
    }
}

async fn send_roster(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    match state.roster_snapshot() {
        Ok(snapshot) => {
            let _ = ui_tx.send(UiUpdate::Roster(Box::new(snapshot))).await;
        }
        Err(e) => halt(state, format!("Roster unavailable: {e}"), ui_tx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::draft::clock::PickClock;
    use crate::draft::ledger::{Ledger, Rotation};
    use crate::draft::pool::tests::{hitter, pitcher};
    use crate::draft::queue::Queue;
    use crate::draft::session::Backing;
    use crate::llm::commentary::tests::FakeGenerator;
    use crate::llm::commentary::CommentaryTrigger;
    use crate::refdata::{DocumentSource, RefDataError};
    use crate::store::{DraftStore, SqliteStore};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoDocuments;

    #[async_trait]
    impl DocumentSource for NoDocuments {
        async fn fetch(&self, file: &str) -> Result<Vec<serde_json::Value>, RefDataError> {
            Err(RefDataError::Status {
                file: file.to_string(),
                status: 503,
            })
        }
    }

    fn items() -> Vec<Item> {
        vec![
            hitter(1, "Aaron Judge", "OF"),
            hitter(2, "Juan Soto", "OF"),
            hitter(3, "Pete Alonso", "1B,DH"),
            pitcher(4, "Tarik Skubal", "SP"),
            hitter(5, "Jose Ramirez", "3B"),
            hitter(6, "Jose Altuve", "2B"),
        ]
    }

    fn state_with(backing: Backing, ledger: Ledger) -> (AppState, mpsc::Receiver<AnalysisRecord>) {
        let config = sample_config();
        let local = LocalStore::in_memory().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let session = DraftSession::new(
            backing,
            ledger,
            Pool::new(items()).unwrap(),
            Queue::load(local.clone()),
            PickClock::new(Duration::from_secs(config.league.pick_clock_secs)),
            CommentaryTrigger::new(FakeGenerator::new("Take"), tx),
        );
        let refdata = RefData::new(Arc::new(NoDocuments), local.clone(), 24);
        let audio = AudioCue::from_config(&config.app.audio);
        let state = AppState::new(
            config,
            session,
            "Adrian".to_string(),
            local.clone(),
            AnalysisLog::load(local),
            refdata,
            audio,
        );
        (state, rx)
    }

    fn simulated() -> (AppState, mpsc::Receiver<AnalysisRecord>) {
        let owners = sample_config().league.owners;
        state_with(Backing::Simulated, Ledger::generate(&owners, 2, Rotation::Snake))
    }

    fn drain(rx: &mut mpsc::Receiver<UiUpdate>) -> Vec<UiUpdate> {
        let mut out = Vec::new();
        while let Ok(u) = rx.try_recv() {
            out.push(u);
        }
        out
    }

    fn notices(updates: &[UiUpdate]) -> Vec<&str> {
        updates
            .iter()
            .filter_map(|u| match u {
                UiUpdate::Notice(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn resolve_by_id_and_name() {
        let pool = Pool::new(items()).unwrap();
        assert_eq!(resolve_item(&pool, &ItemRef::Id(4)), Ok(4));
        assert!(resolve_item(&pool, &ItemRef::Id(99)).is_err());
        assert_eq!(resolve_item(&pool, &ItemRef::Name("aaron judge".into())), Ok(1));
        assert_eq!(resolve_item(&pool, &ItemRef::Name("skub".into())), Ok(4));
        let err = resolve_item(&pool, &ItemRef::Name("jose".into())).unwrap_err();
        assert!(err.contains("matches 2 players"), "{err}");
        assert!(resolve_item(&pool, &ItemRef::Name("nobody".into())).is_err());
    }

    #[test]
    fn resolve_prefers_unique_available_match() {
        let mut pool = Pool::new(items()).unwrap();
        pool.mark_owned(5, "Alex");
        assert_eq!(resolve_item(&pool, &ItemRef::Name("jose".into())), Ok(6));
    }

    #[tokio::test]
    async fn draft_prompt_then_confirm() {
        let (mut state, mut analysis_rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Name("Judge".into())), &ui_tx).await;
        assert_eq!(
            drain(&mut ui_rx),
            vec![UiUpdate::Prompt("Draft Aaron Judge for Adrian?".into())]
        );

        handle_user_command(&mut state, UserCommand::Confirm(true), &ui_tx).await;
        let updates = drain(&mut ui_rx);
        assert!(matches!(&updates[0], UiUpdate::PickMade(row) if row.pick_number == 1));
        assert!(updates
            .iter()
            .any(|u| matches!(u, UiUpdate::Clock(c) if c.pick.pick_number == 2)));
        assert_eq!(state.session.pool().owner_of(1), Some("Adrian"));
        assert!(state.pending_prompt.is_none());
        assert_eq!(analysis_rx.recv().await.unwrap().item_name, "Aaron Judge");
    }

    #[tokio::test]
    async fn declining_and_empty_confirmation() {
        let (mut state, _rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(&mut state, UserCommand::Confirm(true), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(2)), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::Confirm(false), &ui_tx).await;

        let updates = drain(&mut ui_rx);
        assert_eq!(notices(&updates), vec!["Nothing to confirm", "Cancelled: Juan Soto"]);
        assert!(state.session.pool().is_available(2));
    }

    #[tokio::test]
    async fn queue_commands_reject_drafted_items() {
        let (mut state, _rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(&mut state, UserCommand::QueueAdd(ItemRef::Id(3)), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::QueueAdd(ItemRef::Id(3)), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(3)), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::Confirm(true), &ui_tx).await;
        drain(&mut ui_rx);

        // Drafting pruned the queue.
        assert!(state.session.queue().is_empty());
        handle_user_command(&mut state, UserCommand::QueueAdd(ItemRef::Id(3)), &ui_tx).await;
        assert_eq!(notices(&drain(&mut ui_rx)), vec!["Already drafted by Adrian"]);
    }

    #[tokio::test]
    async fn roster_assign_persists() {
        let (mut state, _rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(3)), &ui_tx).await;
        handle_user_command(&mut state, UserCommand::Confirm(true), &ui_tx).await;
        drain(&mut ui_rx);

        handle_user_command(
            &mut state,
            UserCommand::Assign {
                slot: "OF1".into(),
                item: ItemRef::Id(3),
            },
            &ui_tx,
        )
        .await;
        assert_eq!(
            notices(&drain(&mut ui_rx)),
            vec!["Pete Alonso (1B,DH) is not eligible for slot OF1"]
        );

        handle_user_command(
            &mut state,
            UserCommand::Assign {
                slot: "1B".into(),
                item: ItemRef::Id(3),
            },
            &ui_tx,
        )
        .await;
        let updates = drain(&mut ui_rx);
        let Some(UiUpdate::Roster(snapshot)) = updates.last() else {
            panic!("expected roster update");
        };
        let first_base = snapshot.slots.iter().find(|s| s.id == "1B").unwrap();
        assert_eq!(first_base.occupant.as_ref().map(|i| i.id), Some(3));
        assert_eq!(snapshot.totals.hitters, 1);

        let stored = Assignments::load(&state.local, "Adrian");
        assert_eq!(stored.occupant("1B"), Some(3));

        handle_user_command(&mut state, UserCommand::Clear { slot: "1B".into() }, &ui_tx).await;
        assert!(Assignments::load(&state.local, "Adrian").is_empty());
    }

    #[tokio::test]
    async fn roster_for_unknown_owner() {
        let (mut state, _rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        handle_user_command(&mut state, UserCommand::Roster { owner: Some("nobody".into()) }, &ui_tx).await;
        assert_eq!(notices(&drain(&mut ui_rx)), vec!["No participant named nobody"]);

        handle_user_command(&mut state, UserCommand::Roster { owner: Some("mark".into()) }, &ui_tx).await;
        assert_eq!(state.roster_owner, "Mark");
    }

    async fn live_state() -> (AppState, Arc<SqliteStore>, mpsc::Receiver<AnalysisRecord>) {
        let owners = sample_config().league.owners;
        let ledger = Ledger::generate(&owners, 2, Rotation::Snake);
        let store = Arc::new(SqliteStore::open(":memory:").unwrap());
        store.seed(&items(), &ledger).unwrap();
        let (state, rx) = state_with(Backing::Live(store.clone()), ledger);
        (state, store, rx)
    }

    #[tokio::test]
    async fn remote_pick_cancels_stale_prompt() {
        let (mut state, store, _rx) = live_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(1)), &ui_tx).await;
        assert!(state.pending_prompt.is_some());

        store.update_pick(1, 1, "Aaron Judge").await.unwrap();
        let pick = store.load_picks().await.unwrap().remove(0);
        apply_remote(&mut state, pick, &ui_tx).await;

        assert!(state.pending_prompt.is_none());
        let updates = drain(&mut ui_rx);
        assert!(notices(&updates)
            .iter()
            .any(|m| m.starts_with("Prompt cancelled")));
        assert!(updates.iter().any(|u| matches!(u, UiUpdate::PickMade(_))));
    }

    #[tokio::test]
    async fn live_turn_violation_is_a_notice() {
        let (mut state, _store, _rx) = live_state().await;
        state.user = "Will".into();
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(1)), &ui_tx).await;
        assert_eq!(
            notices(&drain(&mut ui_rx)),
            vec!["it is Adrian's pick, not Will's"]
        );
        assert!(state.pending_prompt.is_none());
    }

    #[tokio::test]
    async fn integrity_failure_halts_drafting() {
        let (mut state, _store, _rx) = live_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        let mut bogus = state.session.ledger().get(1).unwrap().clone();
        bogus.item_id = Some(777);
        apply_remote(&mut state, bogus, &ui_tx).await;
        assert!(state.halted.is_some());
        assert!(matches!(drain(&mut ui_rx).as_slice(), [UiUpdate::Halted(_)]));

        handle_user_command(&mut state, UserCommand::Draft(ItemRef::Id(1)), &ui_tx).await;
        assert!(notices(&drain(&mut ui_rx))[0].starts_with("Drafting is halted"));
    }

    #[tokio::test]
    async fn player_dossier_degrades_to_empty() {
        let (mut state, _rx) = simulated();
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        handle_user_command(&mut state, UserCommand::Player(ItemRef::Id(4)), &ui_tx).await;
        match drain(&mut ui_rx).as_slice() {
            [UiUpdate::Dossier(d)] => {
                assert_eq!(d.item.name, "Tarik Skubal");
                assert!(d.dossier.news.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_loop_processes_commands_and_analysis() {
        let (state, analysis_rx) = simulated();
        let (_feed_tx, feed_rx) = mpsc::channel(4);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(feed_rx, analysis_rx, cmd_rx, ui_tx, state));
        cmd_tx.send(UserCommand::Draft(ItemRef::Id(4))).await.unwrap();
        cmd_tx.send(UserCommand::Confirm(true)).await.unwrap();

        let mut saw_pick = false;
        let mut saw_analysis = false;
        while !(saw_pick && saw_analysis) {
            match ui_rx.recv().await.unwrap() {
                UiUpdate::PickMade(row) => {
                    assert_eq!(row.item_name.as_deref(), Some("Tarik Skubal"));
                    saw_pick = true;
                }
                UiUpdate::NewAnalysis(record) => {
                    assert_eq!(record.text, "Take (Tarik Skubal)");
                    saw_analysis = true;
                }
                _ => {}
            }
        }

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        handle.await.unwrap().unwrap();
    }
}
