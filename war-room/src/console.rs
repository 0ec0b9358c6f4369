// Line-oriented console front end.
//
// Reads commands from stdin and forwards them to the app loop as
// UserCommand messages; prints UiUpdate messages as they arrive.

use std::fmt::Write as _;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::draft::clock::ClockState;
use crate::draft::pool::{PoolFilter, SortKey};
use crate::draft::position::Position;
use crate::protocol::{
    BoardSnapshot, ClockSnapshot, ConnectionStatus, DossierSnapshot, ItemRef, ItemRow, PickRow,
    RosterSnapshot, UiUpdate, UserCommand,
};
use crate::llm::commentary::AnalysisRecord;

const DEFAULT_POOL_LIMIT: usize = 25;
const DEFAULT_LOG_LIMIT: usize = 15;

pub const HELP: &str = "\
Commands:
  draft <player>            ask to draft a player into the current pick (d)
  yes | no                  answer the draft prompt (y / n)
  queue                     show your queue
  queue add <player>        add a player to your queue
  queue rm <player>         remove a player from your queue
  board                     picks on the clock, upcoming and recent (b)
  pool [pos=P] [sort=K] [desc] [limit=N] [text]
                            browse available players (p)
  roster [owner]            show a roster (r)
  assign <slot> <player>    place an owned player in a slot
  clear <slot>              empty a slot
  log [n]                   most recent picks
  analysis [owner=X] [text] pick commentary (a)
  player <player>           news, injury and history for a player
  audio [on|off]            toggle owner audio cues
  sync                      reconcile with the shared store now
  help                      this text (?)
  quit                      exit (q)
Players are named by id or by (partial) name.";

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn item_ref(arg: &str) -> Result<ItemRef, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err("Name a player".to_string());
    }
    Ok(match arg.parse() {
        Ok(id) => ItemRef::Id(id),
        Err(_) => ItemRef::Name(arg.to_string()),
    })
}

fn parse_pool(args: &[&str]) -> Result<UserCommand, String> {
    let mut filter = PoolFilter::default();
    let mut limit = DEFAULT_POOL_LIMIT;
    let mut search = Vec::new();
    for arg in args {
        if let Some(pos) = arg.strip_prefix("pos=") {
            filter.position =
                Some(Position::from_str_pos(pos).ok_or_else(|| format!("Unknown position {pos}"))?);
        } else if let Some(key) = arg.strip_prefix("sort=") {
            filter.sort = SortKey::from_str_key(key).ok_or_else(|| format!("Unknown sort column {key}"))?;
        } else if let Some(n) = arg.strip_prefix("limit=") {
            limit = n.parse().map_err(|_| format!("Bad limit {n}"))?;
        } else if arg.eq_ignore_ascii_case("desc") {
            filter.descending = true;
        } else {
            search.push(*arg);
        }
    }
    filter.search = search.join(" ");
    Ok(UserCommand::Pool { filter, limit })
}

/// Parse one input line. Blank lines are `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };
    let rest = args.join(" ");

    let cmd = match verb.to_lowercase().as_str() {
        "draft" | "d" => UserCommand::Draft(item_ref(&rest)?),
        "yes" | "y" => UserCommand::Confirm(true),
        "no" | "n" => UserCommand::Confirm(false),
        "queue" => match args.split_first() {
            None => UserCommand::ShowQueue,
            Some((&"add", tail)) => UserCommand::QueueAdd(item_ref(&tail.join(" "))?),
            Some((&("rm" | "remove"), tail)) => UserCommand::QueueRemove(item_ref(&tail.join(" "))?),
            Some((other, _)) => return Err(format!("Unknown queue action {other}")),
        },
        "board" | "b" => UserCommand::Board,
        "pool" | "p" => parse_pool(args)?,
        "roster" | "r" => UserCommand::Roster {
            owner: (!rest.is_empty()).then_some(rest),
        },
        "assign" => match args.split_first() {
            Some((slot, tail)) if !tail.is_empty() => UserCommand::Assign {
                slot: slot.to_uppercase(),
                item: item_ref(&tail.join(" "))?,
            },
            _ => return Err("Usage: assign <slot> <player>".to_string()),
        },
        "clear" => match args {
            [slot] => UserCommand::Clear {
                slot: slot.to_uppercase(),
            },
            _ => return Err("Usage: clear <slot>".to_string()),
        },
        "log" => UserCommand::Log {
            limit: match args {
                [] => DEFAULT_LOG_LIMIT,
                [n] => n.parse().map_err(|_| format!("Bad count {n}"))?,
                _ => return Err("Usage: log [n]".to_string()),
            },
        },
        "analysis" | "a" => {
            let mut owner = None;
            let mut search = Vec::new();
            for arg in args {
                match arg.strip_prefix("owner=") {
                    Some(o) => owner = Some(o.to_string()),
                    None => search.push(*arg),
                }
            }
            UserCommand::Analysis {
                owner,
                search: search.join(" "),
            }
        }
        "player" | "info" => UserCommand::Player(item_ref(&rest)?),
        "audio" => UserCommand::Audio(match args {
            [] => None,
            [s] if s.eq_ignore_ascii_case("on") => Some(true),
            [s] if s.eq_ignore_ascii_case("off") => Some(false),
            _ => return Err("Usage: audio [on|off]".to_string()),
        }),
        "sync" => UserCommand::Sync,
        "help" | "?" => UserCommand::Help,
        "quit" | "exit" | "q" => UserCommand::Quit,
        other => return Err(format!("Unknown command {other}; type help")),
    };
    Ok(Some(cmd))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn pick_label(row: &PickRow) -> String {
    format!("#{} (R{} P{})", row.pick_number, row.round, row.round_pick)
}

fn pick_line(row: &PickRow) -> String {
    match &row.item_name {
        Some(name) => format!(
            "{:<16} {:<10} {}{}",
            pick_label(row),
            row.owner,
            name,
            row.position
                .as_deref()
                .map(|p| format!(" ({p})"))
                .unwrap_or_default()
        ),
        None => format!("{:<16} {:<10} -", pick_label(row), row.owner),
    }
}

fn item_line(row: &ItemRow) -> String {
    let rank = row.rank.map_or_else(|| "-".to_string(), |r| format!("{r:.0}"));
    let mut line = format!(
        "{:>6} {:>5}  {:<24} {:<8} {:<4} {}",
        row.id, rank, row.name, row.position, row.team, row.summary
    );
    if let Some(injury) = &row.injury {
        let _ = write!(line, " [{injury}]");
    }
    if row.availability != crate::draft::pool::AVAILABLE {
        let _ = write!(line, " <{}>", row.availability);
    }
    line
}

fn clock_line(clock: &ClockSnapshot) -> String {
    let state = match clock.state {
        ClockState::Running => "",
        ClockState::Warning => " (hurry)",
        ClockState::Expired => " (time expired)",
    };
    format!(
        "On the clock: {} {} - {}s{state}",
        pick_label(&clock.pick),
        clock.pick.owner,
        clock.remaining_secs
    )
}

fn board(b: &BoardSnapshot) -> String {
    let mut out = format!("{} [{}] you are {}\n", b.league, b.mode, b.user);
    match &b.current {
        Some(cur) => {
            let _ = writeln!(out, "Current: {} {}", pick_label(cur), cur.owner);
        }
        None => out.push_str("The draft is complete\n"),
    }
    match b.user_turn_in {
        Some(0) => out.push_str("You are on the clock\n"),
        Some(n) => {
            let _ = writeln!(out, "Your next pick in {n}");
        }
        None => {}
    }
    if !b.upcoming.is_empty() {
        out.push_str("Upcoming:\n");
        for row in &b.upcoming {
            let _ = writeln!(out, "  {}", pick_line(row));
        }
    }
    if !b.recent.is_empty() {
        out.push_str("Recent:\n");
        for row in &b.recent {
            let _ = writeln!(out, "  {}", pick_line(row));
        }
    }
    out.push_str("Progress:");
    for p in &b.progress {
        let _ = write!(out, " {} {}/{}", p.owner, p.filled, p.total);
    }
    if b.pending_writes > 0 {
        let _ = write!(out, "\n{} pool writes awaiting sync", b.pending_writes);
    }
    out
}

fn roster(r: &RosterSnapshot) -> String {
    let mut out = format!("Roster: {}\n", r.owner);
    for slot in &r.slots {
        let occupant = slot
            .occupant
            .as_ref()
            .map_or_else(|| "-".to_string(), |i| format!("{} ({})", i.name, i.position));
        let _ = write!(out, "  {:<5} {occupant}", slot.id);
        if !slot.candidates.is_empty() {
            let _ = write!(out, "    could take: {}", slot.candidates.join(", "));
        }
        out.push('\n');
    }
    if !r.unslotted.is_empty() {
        out.push_str("Unslotted:\n");
        for item in &r.unslotted {
            let _ = writeln!(out, "  {}", item_line(item));
        }
    }
    let h = &r.totals.hitting;
    let p = &r.totals.pitching;
    let _ = writeln!(
        out,
        "Totals: R {:.0} HR {:.0} RBI {:.0} SB {:.0} OBP {:.3} | K {:.0} QS {:.0} ERA {:.2} WHIP {:.2} SV+H {:.0}",
        h.r, h.hr, h.rbi, h.sb, h.obp, p.k, p.qs, p.era, p.whip, p.sv_hd
    );
    out.push_str("Needs:");
    for need in &r.needs {
        let _ = write!(out, " {} {}/{}", need.label, need.filled, need.needed);
    }
    out
}

fn analysis_line(record: &AnalysisRecord) -> String {
    format!(
        "#{} {} took {} ({}, {}): {}",
        record.pick_number, record.owner, record.item_name, record.position, record.team, record.text
    )
}

fn dossier(d: &DossierSnapshot) -> String {
    let mut out = item_line(&d.item);
    if let Some(label) = d.dossier.injury_label() {
        let _ = write!(out, "\nStatus: {label}");
    }
    if let Some(outlook) = d.dossier.info.as_ref().and_then(|i| i.season_outlook.as_deref()) {
        let _ = write!(out, "\nOutlook: {outlook}");
    }
    if !d.dossier.news.is_empty() {
        out.push_str("\nNews:");
        for n in &d.dossier.news {
            let date = n
                .published()
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let _ = write!(out, "\n  {date} {}", n.headline);
        }
    }
    if !d.dossier.history.is_empty() {
        out.push_str("\nDraft history:");
        for h in &d.dossier.history {
            let slot = match (h.round, h.pick_overall) {
                (Some(r), Some(p)) => format!("R{r} #{p}"),
                _ => "-".to_string(),
            };
            let _ = write!(out, "\n  {} {} {slot}", h.year, h.team);
        }
    }
    if let Some(links) = &d.dossier.links {
        for (label, url) in links.entries() {
            let _ = write!(out, "\n{label}: {url}");
        }
    }
    out
}

fn rows<T>(items: &[T], empty: &str, line: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items.iter().map(line).collect::<Vec<_>>().join("\n")
}

/// Text shown for one update.
pub fn render(update: &UiUpdate) -> String {
    match update {
        UiUpdate::Notice(msg) => msg.clone(),
        UiUpdate::Prompt(msg) => format!("{msg} [yes/no]"),
        UiUpdate::Connection(status) => match status {
            ConnectionStatus::Connected => "Feed connected".to_string(),
            ConnectionStatus::Disconnected => "Feed disconnected, reconnecting".to_string(),
            ConnectionStatus::Offline => "Feed offline".to_string(),
        },
        UiUpdate::Clock(clock) => clock_line(clock),
        UiUpdate::PickMade(row) => format!("Pick in: {}", pick_line(row)),
        UiUpdate::Board(b) => board(b),
        UiUpdate::Log(picks) => rows(picks, "No picks yet", pick_line),
        UiUpdate::Pool(items) => rows(items, "No matching players", item_line),
        UiUpdate::Queue(items) => rows(items, "Your queue is empty", item_line),
        UiUpdate::Roster(r) => roster(r),
        UiUpdate::Analysis(records) => rows(records, "No commentary yet", analysis_line),
        UiUpdate::NewAnalysis(record) => analysis_line(record),
        UiUpdate::Dossier(d) => dossier(d),
        UiUpdate::Halted(reason) => format!("HALTED: {reason}"),
        UiUpdate::Help => HELP.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// Print updates and read commands until the user quits or stdin closes.
pub async fn run(mut ui_rx: mpsc::Receiver<UiUpdate>, cmd_tx: mpsc::Sender<UserCommand>) -> anyhow::Result<()> {
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(update) = ui_rx.recv().await {
            let text = render(&update);
            if stdout.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(cmd)) => {
                debug!(?cmd, "console command");
                let quit = matches!(cmd, UserCommand::Quit);
                if cmd_tx.send(cmd).await.is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(msg) => println!("{msg}"),
        }
    }

    info!("Console closed");
    let _ = cmd_tx.send(UserCommand::Quit).await;
    drop(cmd_tx);
    let _ = printer.await;
    Ok(())
}
