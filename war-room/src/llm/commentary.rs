// Pick commentary: a fire-and-forget generator call per newly resolved pick,
// collected into an append-only analysis log.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::draft::pool::Item;
use crate::draft::roster::RosterTotals;
use crate::local::LocalStore;

/// Text recorded whenever commentary cannot be produced.
pub const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable";

/// Local storage key for the persisted analysis log.
pub const ANALYSIS_KEY: &str = "analysis_log";

/// Everything a generator needs to react to one pick.
#[derive(Debug, Clone)]
pub struct CommentaryRequest {
    pub pick_number: u32,
    pub round: u32,
    pub owner: String,
    pub item: Item,
    /// Totals over the owner's items including this one.
    pub owner_totals: RosterTotals,
    /// Names of the owner's earlier picks.
    pub owner_roster: Vec<String>,
}

/// External text generator. Never fails: implementations return
/// [`ANALYSIS_UNAVAILABLE`] (or similar) instead of an error.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, request: &CommentaryRequest) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub pick_number: u32,
    pub round: u32,
    pub owner: String,
    pub item_name: String,
    pub position: String,
    pub team: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    fn from_request(req: &CommentaryRequest, text: String) -> Self {
        Self {
            pick_number: req.pick_number,
            round: req.round,
            owner: req.owner.clone(),
            item_name: req.item.name.clone(),
            position: req.item.position.clone(),
            team: req.item.team.clone(),
            text,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Spawns one generator task per pick number, ever.
pub struct CommentaryTrigger {
    generator: Arc<dyn CommentaryGenerator>,
    tx: mpsc::Sender<AnalysisRecord>,
    triggered: HashSet<u32>,
}

impl CommentaryTrigger {
    pub fn new(generator: Arc<dyn CommentaryGenerator>, tx: mpsc::Sender<AnalysisRecord>) -> Self {
        Self {
            generator,
            tx,
            triggered: HashSet::new(),
        }
    }

    /// Start generation for `request` unless its pick was already triggered.
    /// Returns whether a task was spawned. Must be called inside a tokio
    /// runtime.
    pub fn trigger(&mut self, request: CommentaryRequest) -> bool {
        if !self.triggered.insert(request.pick_number) {
            debug!(pick = request.pick_number, "commentary already triggered");
            return false;
        }

        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let text = generator.generate(&request).await;
            let text = if text.trim().is_empty() {
                ANALYSIS_UNAVAILABLE.to_string()
            } else {
                text
            };
            let record = AnalysisRecord::from_request(&request, text);
            if tx.send(record).await.is_err() {
                debug!("analysis receiver dropped");
            }
        });
        true
    }

    pub fn has_triggered(&self, pick_number: u32) -> bool {
        self.triggered.contains(&pick_number)
    }

    /// Record picks whose analysis already exists (e.g. restored from disk).
    pub fn mark_triggered(&mut self, picks: impl IntoIterator<Item = u32>) {
        self.triggered.extend(picks);
    }
}

// ---------------------------------------------------------------------------
// Analysis log
// ---------------------------------------------------------------------------

/// Append-only log, at most one record per pick number.
#[derive(Default)]
pub struct AnalysisLog {
    records: Vec<AnalysisRecord>,
    store: Option<LocalStore>,
}

impl AnalysisLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: LocalStore) -> Self {
        let records = match store.get::<Vec<AnalysisRecord>>(ANALYSIS_KEY) {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Discarding unreadable analysis log: {e:#}");
                Vec::new()
            }
        };
        let mut log = AnalysisLog {
            records: Vec::with_capacity(records.len()),
            store: None,
        };
        for r in records {
            log.append(r);
        }
        log.store = Some(store);
        log
    }

    /// Append a record. A second record for the same pick is dropped.
    pub fn append(&mut self, record: AnalysisRecord) -> bool {
        if self.contains(record.pick_number) {
            return false;
        }
        self.records.push(record);
        if let Some(store) = &self.store {
            if let Err(e) = store.set(ANALYSIS_KEY, &self.records) {
                warn!("Failed to persist analysis log: {e:#}");
            }
        }
        true
    }

    pub fn contains(&self, pick_number: u32) -> bool {
        self.records.iter().any(|r| r.pick_number == pick_number)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pick_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().map(|r| r.pick_number)
    }

    /// Records newest pick first, optionally restricted to one owner and to
    /// records whose item name or text contains `search` (case-insensitive).
    pub fn filtered(&self, owner: Option<&str>, search: &str) -> Vec<&AnalysisRecord> {
        let needle = search.trim().to_lowercase();
        let mut out: Vec<&AnalysisRecord> = self
            .records
            .iter()
            .filter(|r| owner.map_or(true, |o| r.owner == o))
            .filter(|r| {
                needle.is_empty()
                    || r.item_name.to_lowercase().contains(&needle)
                    || r.text.to_lowercase().contains(&needle)
            })
            .collect();
        out.sort_by(|a, b| b.pick_number.cmp(&a.pick_number));
        out
    }
}
