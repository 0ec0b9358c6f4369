// Change-notification feed: a WebSocket client that turns pushed pick rows
// into `FeedEvent`s for the app loop, reconnecting with backoff.

use std::time::Duration;

use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::draft::ledger::Pick;
use crate::draft::ItemId;
use crate::protocol::FeedEvent;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// A pick row as pushed by the store. Accepts both the crate's field names
/// and the column names of the shared draft sheet.
#[derive(Debug, Deserialize)]
struct WirePick {
    #[serde(alias = "Overall Pick")]
    pick_number: u32,
    #[serde(default, alias = "Round")]
    round: u32,
    #[serde(default, alias = "Pick")]
    round_pick: u32,
    #[serde(alias = "Owner")]
    owner: String,
    #[serde(default, alias = "ESPN PlayerID", deserialize_with = "de_item_id")]
    item_id: Option<ItemId>,
    #[serde(default, alias = "Selection")]
    item_name: Option<String>,
}

impl From<WirePick> for Pick {
    fn from(w: WirePick) -> Self {
        Pick {
            pick_number: w.pick_number,
            round: w.round,
            round_pick: w.round_pick,
            owner: w.owner,
            item_id: w.item_id,
            item_name: w.item_name.filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Item ids arrive as numbers, numeric strings, empty strings or null.
fn de_item_id<'de, D>(deserializer: D) -> Result<Option<ItemId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(alias = "new")]
    record: serde_json::Value,
}

const PICK_TABLES: &[&str] = &["picks", "draft-order"];

/// Parse one feed message into a pick update.
///
/// Accepts `{"type":"UPDATE","table":"picks","record":{..}}` envelopes
/// (`INSERT` too) or a bare pick object. Anything else is `None`.
pub fn parse_message(text: &str) -> Option<Pick> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring non-JSON feed message: {e}");
            return None;
        }
    };

    if value.get("type").is_some() {
        let envelope: Envelope = match serde_json::from_value(value) {
            Ok(env) => env,
            Err(e) => {
                warn!("Ignoring malformed feed envelope: {e}");
                return None;
            }
        };
        if !matches!(envelope.kind.as_str(), "UPDATE" | "INSERT") {
            debug!(kind = %envelope.kind, "ignoring feed event type");
            return None;
        }
        if let Some(table) = &envelope.table {
            if !PICK_TABLES.contains(&table.as_str()) {
                debug!(%table, "ignoring feed event for another table");
                return None;
            }
        }
        return parse_pick(envelope.record);
    }

    parse_pick(value)
}

fn parse_pick(value: serde_json::Value) -> Option<Pick> {
    match serde_json::from_value::<WirePick>(value) {
        Ok(w) => Some(w.into()),
        Err(e) => {
            warn!("Ignoring feed record that is not a pick: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Connection handling
// ---------------------------------------------------------------------------

/// Connect to `url` and forward events through `tx` forever, reconnecting
/// with exponential backoff capped at `max_backoff`. Returns when the
/// receiver is dropped.
pub async fn run(url: String, max_backoff: Duration, tx: mpsc::Sender<FeedEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Feed connected to {url}");
                backoff = INITIAL_BACKOFF;
                if tx
                    .send(FeedEvent::Connected { url: url.clone() })
                    .await
                    .is_err()
                {
                    return;
                }

                let (_write, read) = ws_stream.split();
                if process_message_stream(read, &tx, &url).await.is_err() {
                    return;
                }
                if tx.send(FeedEvent::Disconnected).await.is_err() {
                    return;
                }
                info!("Feed disconnected from {url}");
            }
            Err(e) => {
                warn!("Feed connection to {url} failed: {e}");
            }
        }

        debug!("Reconnecting to feed in {backoff:?}");
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff, max_backoff);
    }
}

pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max.max(INITIAL_BACKOFF))
}

/// Read messages from any [`Stream`] of WebSocket results, forwarding parsed
/// pick updates through `tx`. Returns `Err(())` once the receiver is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<FeedEvent>,
    url: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                debug!("Feed message: {}", text.as_str());
                if let Some(pick) = parse_message(text.as_str()) {
                    if tx.send(FeedEvent::PickUpdated(pick)).await.is_err() {
                        return Err(());
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Feed {url} sent close frame");
                break;
            }
            Err(e) => {
                warn!("Feed error from {url}: {e}");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
