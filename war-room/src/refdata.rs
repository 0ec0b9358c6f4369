// Reference data: static JSON documents (news, injury info, links, league
// draft history) fetched over HTTP and cached in local storage.
//
// Fetch failures never surface to the user. A fresh cache is served as is,
// a stale cache is served when the fetch fails, and with no cache at all the
// document reads as empty.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::draft::ItemId;
use crate::local::LocalStore;

// ---------------------------------------------------------------------------
// Documents and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefDocument {
    PlayerNews,
    PlayerInfo,
    PlayerLinks,
    DraftHistory,
}

impl RefDocument {
    pub const ALL: [RefDocument; 4] = [
        RefDocument::PlayerNews,
        RefDocument::PlayerInfo,
        RefDocument::PlayerLinks,
        RefDocument::DraftHistory,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            RefDocument::PlayerNews => "player-news.json",
            RefDocument::PlayerInfo => "player-info.json",
            RefDocument::PlayerLinks => "player-links.json",
            RefDocument::DraftHistory => "draft-history.json",
        }
    }

    pub fn cache_key(self) -> &'static str {
        match self {
            RefDocument::PlayerNews => "gcs_player_news",
            RefDocument::PlayerInfo => "gcs_player_info",
            RefDocument::PlayerLinks => "gcs_player_links",
            RefDocument::DraftHistory => "gcs_draft_history",
        }
    }
}

#[derive(Debug, Error)]
pub enum RefDataError {
    #[error("HTTP error fetching {file}: {message}")]
    Http { file: String, message: String },

    #[error("{file} returned status {status}")]
    Status { file: String, status: u16 },

    #[error("{file} is not a JSON array")]
    NotAnArray { file: String },
}

/// Where documents come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, file: &str) -> Result<Vec<serde_json::Value>, RefDataError>;
}

pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch(&self, file: &str) -> Result<Vec<serde_json::Value>, RefDataError> {
        let url = format!("{}/{file}", self.base_url);
        let http_err = |e: reqwest::Error| RefDataError::Http {
            file: file.to_string(),
            message: e.to_string(),
        };

        let response = self.http.get(&url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RefDataError::Status {
                file: file.to_string(),
                status: status.as_u16(),
            });
        }
        let value: serde_json::Value = response.json().await.map_err(http_err)?;
        match value {
            serde_json::Value::Array(records) => Ok(records),
            _ => Err(RefDataError::NotAnArray {
                file: file.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// Player ids in these documents are strings; tolerate numbers too.
fn de_player_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid player_id: {other}"))),
    }
}

fn de_loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(deserialize_with = "de_player_id")]
    pub player_id: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub story: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
}

impl NewsItem {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_modified.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(deserialize_with = "de_player_id")]
    pub player_id: String,
    #[serde(default)]
    pub injured_status: Option<String>,
    #[serde(rename = "seasonOutlook", default)]
    pub season_outlook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLinks {
    #[serde(deserialize_with = "de_player_id")]
    pub player_id: String,
    #[serde(default)]
    pub baseball_reference_url: Option<String>,
    #[serde(default)]
    pub fangraphs_url: Option<String>,
    #[serde(default)]
    pub baseball_savant_url: Option<String>,
    #[serde(default)]
    pub espn_url: Option<String>,
}

impl PlayerLinks {
    /// (label, url) pairs for the links that are present.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Baseball Reference", &self.baseball_reference_url),
            ("FanGraphs", &self.fangraphs_url),
            ("Baseball Savant", &self.baseball_savant_url),
            ("ESPN", &self.espn_url),
        ]
        .into_iter()
        .filter_map(|(label, url)| url.as_deref().filter(|u| !u.is_empty()).map(|u| (label, u)))
        .collect()
    }
}

/// One season's league draft record for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftHistoryEntry {
    #[serde(deserialize_with = "de_player_id")]
    pub player_id: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Team_ID", default, deserialize_with = "de_loose_string")]
    pub team: String,
    #[serde(rename = "Round", default)]
    pub round: Option<u32>,
    #[serde(rename = "Pick_Overall", default)]
    pub pick_overall: Option<u32>,
}

// ---------------------------------------------------------------------------
// Injury status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjurySeverity {
    Healthy,
    DayToDay,
    Out,
    Other,
}

/// Short display label for an injury status string.
pub fn injury_label(status: &str) -> String {
    match status.trim().to_uppercase().as_str() {
        "ACTIVE" => "Healthy".to_string(),
        "DAY_TO_DAY" => "DTD".to_string(),
        "SEVEN_DAY_IL" => "IL-7".to_string(),
        "TEN_DAY_IL" => "IL-10".to_string(),
        "FIFTEEN_DAY_IL" => "IL-15".to_string(),
        "SIXTY_DAY_IL" => "IL-60".to_string(),
        _ => status.to_string(),
    }
}

pub fn injury_severity(status: &str) -> InjurySeverity {
    let s = status.trim().to_uppercase();
    match s.as_str() {
        "ACTIVE" => InjurySeverity::Healthy,
        "DAY_TO_DAY" | "DTD" => InjurySeverity::DayToDay,
        "OUT" => InjurySeverity::Out,
        _ if s.contains("IL") => InjurySeverity::Out,
        _ => InjurySeverity::Other,
    }
}

// ---------------------------------------------------------------------------
// Dossier
// ---------------------------------------------------------------------------

pub const MAX_NEWS: usize = 10;

const MAX_CACHE_HOURS: u64 = 24 * 365;

/// Everything known about one player from the reference documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerDossier {
    pub player_id: String,
    pub info: Option<PlayerInfo>,
    pub links: Option<PlayerLinks>,
    /// Newest first, at most [`MAX_NEWS`].
    pub news: Vec<NewsItem>,
    /// Newest season first.
    pub history: Vec<DraftHistoryEntry>,
}

impl PlayerDossier {
    pub fn assemble(
        player_id: ItemId,
        news: Vec<NewsItem>,
        info: Vec<PlayerInfo>,
        links: Vec<PlayerLinks>,
        history: Vec<DraftHistoryEntry>,
    ) -> Self {
        let id = player_id.to_string();

        let mut news: Vec<NewsItem> = news.into_iter().filter(|n| n.player_id == id).collect();
        // Undated stories sort last.
        news.sort_by(|a, b| b.published().cmp(&a.published()));
        news.truncate(MAX_NEWS);

        let mut history: Vec<DraftHistoryEntry> =
            history.into_iter().filter(|h| h.player_id == id).collect();
        history.sort_by(|a, b| b.year.cmp(&a.year));

        PlayerDossier {
            info: info.into_iter().find(|i| i.player_id == id),
            links: links.into_iter().find(|l| l.player_id == id),
            player_id: id,
            news,
            history,
        }
    }

    pub fn injury_label(&self) -> Option<String> {
        self.info
            .as_ref()
            .and_then(|i| i.injured_status.as_deref())
            .map(injury_label)
    }

    pub fn is_injured(&self) -> bool {
        self.info
            .as_ref()
            .and_then(|i| i.injured_status.as_deref())
            .is_some_and(|s| injury_severity(s) != InjurySeverity::Healthy)
    }
}

// ---------------------------------------------------------------------------
// Cached access
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CachedDocument {
    fetched_at: DateTime<Utc>,
    records: Vec<serde_json::Value>,
}

pub struct RefData {
    source: Arc<dyn DocumentSource>,
    store: LocalStore,
    ttl: Duration,
}

impl RefData {
    pub fn new(source: Arc<dyn DocumentSource>, store: LocalStore, cache_hours: u64) -> Self {
        Self {
            source,
            store,
            ttl: Duration::hours(cache_hours.min(MAX_CACHE_HOURS) as i64),
        }
    }

    fn read_cache(&self, doc: RefDocument) -> Option<CachedDocument> {
        match self.store.get::<CachedDocument>(doc.cache_key()) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Discarding unreadable cache for {}: {e:#}", doc.file_name());
                None
            }
        }
    }

    /// Raw records of `doc`, honouring the cache rules above.
    pub async fn records(&self, doc: RefDocument) -> Vec<serde_json::Value> {
        let cached = self.read_cache(doc);
        if let Some(c) = &cached {
            if Utc::now() - c.fetched_at < self.ttl {
                debug!("Using cached {}", doc.file_name());
                return c.records.clone();
            }
        }

        match self.source.fetch(doc.file_name()).await {
            Ok(records) => {
                info!("Fetched {} ({} records)", doc.file_name(), records.len());
                let entry = CachedDocument {
                    fetched_at: Utc::now(),
                    records,
                };
                if let Err(e) = self.store.set(doc.cache_key(), &entry) {
                    warn!("Failed to cache {}: {e:#}", doc.file_name());
                }
                entry.records
            }
            Err(e) => {
                warn!("Reference fetch failed: {e}");
                cached.map(|c| c.records).unwrap_or_default()
            }
        }
    }

    /// Typed records of `doc`. Records that do not decode are skipped.
    pub async fn load<T: DeserializeOwned>(&self, doc: RefDocument) -> Vec<T> {
        let records = self.records(doc).await;
        let total = records.len();
        let decoded: Vec<T> = records
            .into_iter()
            .filter_map(|r| serde_json::from_value(r).ok())
            .collect();
        if decoded.len() < total {
            warn!(
                "Skipped {} undecodable records in {}",
                total - decoded.len(),
                doc.file_name()
            );
        }
        decoded
    }

    pub async fn dossier(&self, player_id: ItemId) -> PlayerDossier {
        let (news, info, links, history) = tokio::join!(
            self.load::<NewsItem>(RefDocument::PlayerNews),
            self.load::<PlayerInfo>(RefDocument::PlayerInfo),
            self.load::<PlayerLinks>(RefDocument::PlayerLinks),
            self.load::<DraftHistoryEntry>(RefDocument::DraftHistory),
        );
        PlayerDossier::assemble(player_id, news, info, links, history)
    }

    /// Refresh every document whose cache has expired. Returns how many
    /// documents have records afterwards.
    pub async fn warm_cache(&self) -> usize {
        let loads = RefDocument::ALL.map(|doc| self.records(doc));
        futures_util::future::join_all(loads)
            .await
            .iter()
            .filter(|records| !records.is_empty())
            .count()
    }

    /// Injury status keyed by player id, for pool listings.
    pub async fn injury_statuses(&self) -> HashMap<String, String> {
        self.load::<PlayerInfo>(RefDocument::PlayerInfo)
            .await
            .into_iter()
            .filter_map(|i| i.injured_status.map(|s| (i.player_id, s)))
            .collect()
    }
}
