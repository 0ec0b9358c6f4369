// Resource pool: draftable items and their availability.
//
// Depletion is represented purely through the availability field; items are
// never removed, so "who owns X" stays answerable after the draft ends.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::position::{is_pitcher_tag, Position};
use super::{DraftError, ItemId};

/// Sentinel stored in the availability column for undrafted items.
pub const AVAILABLE: &str = "Available";

/// Availability of an item: the `Available` sentinel or the owner's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Availability {
    Available,
    Owned(String),
}

impl Availability {
    pub fn owner(&self) -> Option<&str> {
        match self {
            Availability::Available => None,
            Availability::Owned(owner) => Some(owner),
        }
    }
}

impl From<String> for Availability {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == AVAILABLE {
            Availability::Available
        } else {
            Availability::Owned(trimmed.to_string())
        }
    }
}

impl From<Availability> for String {
    fn from(a: Availability) -> Self {
        match a {
            Availability::Available => AVAILABLE.to_string(),
            Availability::Owned(owner) => owner,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => f.write_str(AVAILABLE),
            Availability::Owned(owner) => f.write_str(owner),
        }
    }
}

/// Projected statistics carried by every item. Hitting fields are `None` for
/// pitchers and vice versa; blank cells in the source also land as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub r: Option<f64>,
    pub hr: Option<f64>,
    pub rbi: Option<f64>,
    pub sb: Option<f64>,
    pub obp: Option<f64>,
    pub k: Option<f64>,
    pub qs: Option<f64>,
    pub era: Option<f64>,
    pub whip: Option<f64>,
    pub sv_hd: Option<f64>,
}

/// A single draftable item (player).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Composite category tag, e.g. "SP,RP" or "1B/DH".
    pub position: String,
    pub team: String,
    pub availability: Availability,
    #[serde(default)]
    pub stats: StatLine,
    /// Average draft position, used for default ordering.
    pub rank: Option<f64>,
}

impl Item {
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    pub fn is_pitcher(&self) -> bool {
        is_pitcher_tag(&self.position)
    }

    /// One-line stat summary in the style of the draft board.
    pub fn stat_summary(&self) -> String {
        let s = &self.stats;
        if self.is_pitcher() {
            format!(
                "{} K, {} QS, {} ERA, {} WHIP",
                fmt_count(s.k),
                fmt_count(s.qs),
                fmt_rate(s.era, 2),
                fmt_rate(s.whip, 3)
            )
        } else {
            format!(
                "{} R, {} HR, {} RBI, {} SB, {} OBP",
                fmt_count(s.r),
                fmt_count(s.hr),
                fmt_count(s.rbi),
                fmt_count(s.sb),
                fmt_rate(s.obp, 3)
            )
        }
    }
}

fn fmt_count(v: Option<f64>) -> String {
    format!("{}", v.unwrap_or(0.0).round() as i64)
}

fn fmt_rate(v: Option<f64>, places: usize) -> String {
    match v {
        Some(x) => format!("{x:.places$}"),
        None => "N/A".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// The catalog of items, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

impl Pool {
    /// Build a pool. Duplicate ids are a data-integrity failure.
    pub fn new(items: Vec<Item>) -> Result<Self, DraftError> {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if index.insert(item.id, i).is_some() {
                return Err(DraftError::DuplicateItem(item.id));
            }
        }
        Ok(Pool { items, index })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn find_by_id(&self, id: ItemId) -> Option<&Item> {
        self.index.get(&id).map(|&i| &self.items[i])
    }

    /// True iff the item exists and carries the `Available` sentinel.
    pub fn is_available(&self, id: ItemId) -> bool {
        self.find_by_id(id).is_some_and(Item::is_available)
    }

    /// Name of the participant holding the item, if drafted.
    pub fn owner_of(&self, id: ItemId) -> Option<&str> {
        self.find_by_id(id).and_then(|i| i.availability.owner())
    }

    /// Record `owner` as the holder of `id`. Returns the previous availability,
    /// or `None` if the id is unknown.
    pub(crate) fn mark_owned(&mut self, id: ItemId, owner: &str) -> Option<Availability> {
        let idx = *self.index.get(&id)?;
        let item = &mut self.items[idx];
        let previous = std::mem::replace(
            &mut item.availability,
            Availability::Owned(owner.to_string()),
        );
        Some(previous)
    }

    /// Put `id` back into the available set. Only used when a remote rebind
    /// frees an item no pick holds any more.
    pub(crate) fn mark_available(&mut self, id: ItemId) -> Option<Availability> {
        let idx = *self.index.get(&id)?;
        Some(std::mem::replace(
            &mut self.items[idx].availability,
            Availability::Available,
        ))
    }

    /// Available items matching `filter`, sorted, truncated to `limit`.
    pub fn browse(&self, filter: &PoolFilter, limit: usize) -> Vec<&Item> {
        let needle = filter.search.trim().to_lowercase();
        let mut matches: Vec<&Item> = self
            .items
            .iter()
            .filter(|i| i.is_available())
            .filter(|i| {
                needle.is_empty()
                    || i.name.to_lowercase().contains(&needle)
                    || i.team.to_lowercase().contains(&needle)
            })
            .filter(|i| match filter.position {
                Some(pos) => super::position::parse_tag(&i.position).contains(&pos),
                None => true,
            })
            .collect();

        matches.sort_by(|a, b| compare_by(a, b, filter.sort, filter.descending));
        matches.truncate(limit);
        matches
    }
}

/// Column the pool browser sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Rank,
    Name,
    Position,
    Team,
    R,
    HR,
    RBI,
    SB,
    OBP,
    K,
    QS,
    ERA,
    WHIP,
    SvHd,
}

impl SortKey {
    pub fn from_str_key(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADP" | "RANK" => Some(SortKey::Rank),
            "NAME" | "PLAYER" => Some(SortKey::Name),
            "POS" | "POSITION" => Some(SortKey::Position),
            "TEAM" => Some(SortKey::Team),
            "R" => Some(SortKey::R),
            "HR" => Some(SortKey::HR),
            "RBI" => Some(SortKey::RBI),
            "SB" => Some(SortKey::SB),
            "OBP" => Some(SortKey::OBP),
            "K" => Some(SortKey::K),
            "QS" => Some(SortKey::QS),
            "ERA" => Some(SortKey::ERA),
            "WHIP" => Some(SortKey::WHIP),
            "SV+H" | "SVHD" | "SV" => Some(SortKey::SvHd),
            _ => None,
        }
    }

    fn numeric(&self, item: &Item) -> Option<f64> {
        let s = &item.stats;
        match self {
            SortKey::Rank => item.rank,
            SortKey::R => s.r,
            SortKey::HR => s.hr,
            SortKey::RBI => s.rbi,
            SortKey::SB => s.sb,
            SortKey::OBP => s.obp,
            SortKey::K => s.k,
            SortKey::QS => s.qs,
            SortKey::ERA => s.era,
            SortKey::WHIP => s.whip,
            SortKey::SvHd => s.sv_hd,
            SortKey::Name | SortKey::Position | SortKey::Team => None,
        }
    }

    fn text<'a>(&self, item: &'a Item) -> &'a str {
        match self {
            SortKey::Name => &item.name,
            SortKey::Position => &item.position,
            SortKey::Team => &item.team,
            _ => "",
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, SortKey::Name | SortKey::Position | SortKey::Team)
    }
}

/// Search/filter/sort settings for browsing available items.
#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    pub search: String,
    pub position: Option<Position>,
    pub sort: SortKey,
    pub descending: bool,
}

fn compare_by(a: &Item, b: &Item, key: SortKey, descending: bool) -> Ordering {
    if key.is_numeric() {
        // Missing values sort last in either direction.
        match (key.numeric(a), key.numeric(b)) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if descending { ord.reverse() } else { ord }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        }
    } else {
        let ord = key.text(a).to_lowercase().cmp(&key.text(b).to_lowercase());
        if descending { ord.reverse() } else { ord }
    }
}

// ---------------------------------------------------------------------------
// CSV seed loading
// ---------------------------------------------------------------------------

/// Raw player-pool row using the column names of the league's sheet export.
/// Every field is optional here; normalization happens in `Item::try_from`.
#[derive(Debug, Deserialize)]
struct PoolRow {
    #[serde(rename = "ESPN PlayerID", default)]
    id: Option<String>,
    #[serde(rename = "Player", default)]
    name: Option<String>,
    #[serde(rename = "Position", default)]
    position: Option<String>,
    #[serde(rename = "Team", default)]
    team: Option<String>,
    #[serde(rename = "ADP", default)]
    adp: Option<String>,
    #[serde(rename = "Availability", default)]
    availability: Option<String>,
    #[serde(rename = "ZIPSR", default)]
    r: Option<String>,
    #[serde(rename = "ZIPSHR", default)]
    hr: Option<String>,
    #[serde(rename = "ZIPSRBI", default)]
    rbi: Option<String>,
    #[serde(rename = "ZIPSSB", default)]
    sb: Option<String>,
    #[serde(rename = "ZIPSOBP", default)]
    obp: Option<String>,
    #[serde(rename = "ZIPSK", default)]
    k: Option<String>,
    #[serde(rename = "ZIPSQS", default)]
    qs: Option<String>,
    #[serde(rename = "ZIPSERA", default)]
    era: Option<String>,
    #[serde(rename = "ZIPSWHIP", default)]
    whip: Option<String>,
    #[serde(rename = "ZIPSSV+HDs", default)]
    sv_hd: Option<String>,
}

/// Parse a numeric cell. Blank, "N/A" and unparseable cells become `None`.
pub(crate) fn parse_number(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl TryFrom<PoolRow> for Item {
    type Error = String;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("missing ESPN PlayerID")?;
        let id: ItemId = id
            .parse()
            .map_err(|_| format!("non-numeric ESPN PlayerID `{id}`"))?;
        let name = row
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("item {id} has no player name"))?;

        let n = |cell: &Option<String>| parse_number(cell.as_deref());
        Ok(Item {
            id,
            name,
            position: row.position.unwrap_or_default().trim().to_string(),
            team: row.team.unwrap_or_default().trim().to_string(),
            availability: Availability::from(row.availability.unwrap_or_default()),
            stats: StatLine {
                r: n(&row.r),
                hr: n(&row.hr),
                rbi: n(&row.rbi),
                sb: n(&row.sb),
                obp: n(&row.obp),
                k: n(&row.k),
                qs: n(&row.qs),
                era: n(&row.era),
                whip: n(&row.whip),
                sv_hd: n(&row.sv_hd),
            },
            rank: n(&row.adp),
        })
    }
}

/// Load items from a player-pool CSV file.
pub fn load_csv(path: &Path) -> anyhow::Result<Vec<Item>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open player pool {}", path.display()))?;
    load_csv_from_reader(file)
}

/// Load items from any reader producing CSV text. Rows that cannot be
/// normalized are skipped with a warning rather than failing the whole load.
pub fn load_csv_from_reader<R: Read>(reader: R) -> anyhow::Result<Vec<Item>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut items = Vec::new();
    for (line, result) in rdr.deserialize::<PoolRow>().enumerate() {
        let row = result.with_context(|| format!("malformed player pool row {}", line + 2))?;
        match Item::try_from(row) {
            Ok(item) => items.push(item),
            Err(reason) => warn!("Skipping player pool row {}: {}", line + 2, reason),
        }
    }
    Ok(items)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn hitter(id: ItemId, name: &str, position: &str) -> Item {
        Item {
            id,
            name: name.to_string(),
            position: position.to_string(),
            team: "NYY".to_string(),
            availability: Availability::Available,
            stats: StatLine {
                r: Some(90.0),
                hr: Some(30.0),
                rbi: Some(95.0),
                sb: Some(10.0),
                obp: Some(0.350),
                ..StatLine::default()
            },
            rank: Some(id as f64),
        }
    }

    pub(crate) fn pitcher(id: ItemId, name: &str, position: &str) -> Item {
        Item {
            id,
            name: name.to_string(),
            position: position.to_string(),
            team: "LAD".to_string(),
            availability: Availability::Available,
            stats: StatLine {
                k: Some(200.0),
                qs: Some(18.0),
                era: Some(3.20),
                whip: Some(1.10),
                sv_hd: Some(0.0),
                ..StatLine::default()
            },
            rank: Some(id as f64),
        }
    }

    #[test]
    fn availability_sentinel_round_trip() {
        assert_eq!(Availability::from("Available".to_string()), Availability::Available);
        assert_eq!(Availability::from("".to_string()), Availability::Available);
        assert_eq!(
            Availability::from("Garrett".to_string()),
            Availability::Owned("Garrett".to_string())
        );
        assert_eq!(String::from(Availability::Available), "Available");
    }

    #[test]
    fn availability_serializes_as_plain_string() {
        let json = serde_json::to_string(&Availability::Owned("Tim".into())).unwrap();
        assert_eq!(json, "\"Tim\"");
        let parsed: Availability = serde_json::from_str("\"Available\"").unwrap();
        assert_eq!(parsed, Availability::Available);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = Pool::new(vec![hitter(1, "A", "C"), hitter(1, "B", "1B")]).unwrap_err();
        assert_eq!(err, DraftError::DuplicateItem(1));
    }

    #[test]
    fn find_and_availability() {
        let mut pool = Pool::new(vec![hitter(1, "A", "C"), pitcher(2, "B", "SP")]).unwrap();
        assert!(pool.is_available(1));
        assert!(!pool.is_available(99));
        assert!(pool.find_by_id(99).is_none());

        let prev = pool.mark_owned(1, "Will").unwrap();
        assert_eq!(prev, Availability::Available);
        assert!(!pool.is_available(1));
        assert_eq!(pool.owner_of(1), Some("Will"));
        // Items are never removed.
        assert_eq!(pool.len(), 2);
        assert!(pool.mark_owned(99, "Will").is_none());
    }

    #[test]
    fn browse_filters_and_sorts() {
        let mut pool = Pool::new(vec![
            hitter(3, "Aaron Judge", "OF"),
            hitter(1, "Shohei Ohtani", "DH"),
            pitcher(2, "Paul Skenes", "SP"),
            hitter(4, "Freddie Freeman", "1B"),
        ])
        .unwrap();
        pool.mark_owned(4, "Alex");

        let all = pool.browse(&PoolFilter::default(), 100);
        let ids: Vec<ItemId> = all.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let filter = PoolFilter {
            search: "LAD".into(),
            ..PoolFilter::default()
        };
        let found = pool.browse(&filter, 100);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Paul Skenes");

        let filter = PoolFilter {
            position: Some(Position::Outfield),
            ..PoolFilter::default()
        };
        assert_eq!(pool.browse(&filter, 100)[0].id, 3);

        let filter = PoolFilter {
            sort: SortKey::Name,
            descending: true,
            ..PoolFilter::default()
        };
        let names: Vec<&str> = pool.browse(&filter, 2).iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Shohei Ohtani", "Paul Skenes"]);
    }

    #[test]
    fn numeric_sort_puts_missing_last() {
        let mut unranked = hitter(9, "Unranked", "C");
        unranked.rank = None;
        let pool = Pool::new(vec![unranked, hitter(5, "Five", "C"), hitter(2, "Two", "C")]).unwrap();
        for descending in [false, true] {
            let filter = PoolFilter {
                descending,
                ..PoolFilter::default()
            };
            let ids: Vec<ItemId> = pool.browse(&filter, 10).iter().map(|i| i.id).collect();
            assert_eq!(*ids.last().unwrap(), 9);
        }
    }

    #[test]
    fn load_csv_normalizes_rows() {
        let csv = "\
ESPN PlayerID,Player,Position,Team,ADP,Availability,ZIPSR,ZIPSHR,ZIPSRBI,ZIPSSB,ZIPSOBP,ZIPSK,ZIPSQS,ZIPSERA,ZIPSWHIP,ZIPSSV+HDs
39832,Shohei Ohtani,DH,LAD,1.2,Available,110,45,100,20,0.390,,,,,
42404,Paul Skenes,SP,PIT,12,Available,,,,,,210,20,2.80,1.02,
,No Id,C,SEA,,Available,,,,,,,,,,
abc,Bad Id,C,SEA,,Available,,,,,,,,,,
31662,Old Pick,1B,ATL,N/A,Tim,80,25,90,5,0.360,,,,,
";
        let items = load_csv_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(items.len(), 3);

        let ohtani = &items[0];
        assert_eq!(ohtani.id, 39832);
        assert_eq!(ohtani.rank, Some(1.2));
        assert_eq!(ohtani.stats.hr, Some(45.0));
        assert_eq!(ohtani.stats.k, None);
        assert!(!ohtani.is_pitcher());

        let skenes = &items[1];
        assert!(skenes.is_pitcher());
        assert_eq!(skenes.stats.era, Some(2.80));

        let taken = &items[2];
        assert_eq!(taken.rank, None);
        assert_eq!(taken.availability, Availability::Owned("Tim".into()));
    }

    #[test]
    fn load_csv_tolerates_missing_stat_columns() {
        let csv = "ESPN PlayerID,Player,Position\n7,Somebody,SS\n";
        let items = load_csv_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_available());
        assert_eq!(items[0].stats, StatLine::default());
    }

    #[test]
    fn stat_summary_by_category() {
        assert_eq!(
            hitter(1, "A", "1B").stat_summary(),
            "90 R, 30 HR, 95 RBI, 10 SB, 0.350 OBP"
        );
        assert_eq!(
            pitcher(2, "B", "SP").stat_summary(),
            "200 K, 18 QS, 3.20 ERA, 1.100 WHIP"
        );
    }
}
