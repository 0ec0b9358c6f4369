// Draft room entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open local storage, resolve mode and identity
// 4. Open the shared store, seeding an empty one
// 5. Build the draft session
// 6. Create mpsc channels
// 7. Spawn the feed task (if configured)
// 8. Spawn app logic task
// 9. Run the console until the user quits
// 10. Cleanup on exit

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use war_room::app;
use war_room::audio::AudioCue;
use war_room::config;
use war_room::console;
use war_room::draft::clock::PickClock;
use war_room::draft::ledger::Ledger;
use war_room::draft::pool::load_csv;
use war_room::draft::queue::Queue;
use war_room::draft::session::{DraftSession, Mode};
use war_room::feed;
use war_room::llm::client::LlmClient;
use war_room::llm::commentary::{AnalysisLog, CommentaryTrigger};
use war_room::local::{LocalStore, MODE_KEY, USER_KEY};
use war_room::refdata::{HttpSource, RefData, RefDocument};
use war_room::store::{DraftStore, SqliteStore};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "war-room", version, about = "Shared snake-draft room")]
struct Args {
    /// Session mode: live (shared store) or simulated (private copy).
    #[arg(long, env = "WAR_ROOM_MODE")]
    mode: Option<Mode>,

    /// Participant you are drafting as.
    #[arg(long, env = "WAR_ROOM_USER")]
    user: Option<String>,

    /// Clear local state (queue, roster placements, caches) before starting.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize tracing
    init_tracing()?;
    info!("War room starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, {} owners, {} rounds",
        config.league.name,
        config.league.owners.len(),
        config.league.rounds
    );

    // 3. Local storage, mode and identity
    let local_path = if config.app.local.path.is_empty() {
        LocalStore::default_path()
            .context("no platform data directory; set local.path in app.toml")?
            .to_string_lossy()
            .into_owned()
    } else {
        config.app.local.path.clone()
    };
    let local = LocalStore::open(&local_path)?;
    info!("Local storage at {local_path}");
    if args.reset {
        local.clear()?;
        info!("Local state cleared");
    }

    // Unreadable saved choices are treated like a first run.
    let mode = match args.mode {
        Some(mode) => mode,
        None => local.get_or_discard::<Mode>(MODE_KEY).unwrap_or(Mode::Live),
    };
    let requested_user = match args.user {
        Some(user) => user,
        None => match local.get_or_discard::<String>(USER_KEY) {
            Some(user) => user,
            None => bail!("no participant selected; pass --user <name>"),
        },
    };
    let Some(user) = config
        .league
        .owners
        .iter()
        .find(|o| o.eq_ignore_ascii_case(requested_user.trim()))
        .cloned()
    else {
        bail!(
            "{requested_user} is not a participant (expected one of {})",
            config.league.owners.join(", ")
        );
    };
    local.set(MODE_KEY, &mode)?;
    local.set(USER_KEY, &user)?;
    info!("Drafting as {user} ({mode})");

    // 4. Shared store
    let store = Arc::new(SqliteStore::open(&config.app.store.path)?);
    if !store.is_seeded()? {
        let items = load_csv(Path::new(&config.app.store.seed_csv))?;
        let ledger = Ledger::generate(
            &config.league.owners,
            config.league.rounds,
            config.league.rotation,
        );
        store.seed(&items, &ledger)?;
    }

    // 5. Draft session
    let (analysis_tx, analysis_rx) = mpsc::channel(64);
    let llm_client = LlmClient::from_config(&config);
    match &llm_client {
        LlmClient::Active(_) => info!("LLM client initialized (API key configured)"),
        LlmClient::Disabled => info!("LLM client disabled (no API key)"),
    }
    let analysis = AnalysisLog::load(local.clone());
    let mut commentary = CommentaryTrigger::new(Arc::new(llm_client), analysis_tx);
    commentary.mark_triggered(analysis.pick_numbers());

    let session = DraftSession::from_store(
        store.clone() as Arc<dyn DraftStore>,
        mode,
        Queue::load(local.clone()),
        PickClock::new(Duration::from_secs(config.league.pick_clock_secs)),
        commentary,
    )
    .await
    .context("failed to load the draft from the store")?
    .with_local(local.clone());

    let refdata = RefData::new(
        Arc::new(HttpSource::new(config.app.refdata.base_url.clone())),
        local.clone(),
        config.app.refdata.cache_hours,
    );
    let cached = refdata.warm_cache().await;
    info!("{cached} of {} reference documents available", RefDocument::ALL.len());
    let injuries = refdata.injury_statuses().await;
    info!("Loaded injury status for {} players", injuries.len());

    let audio = AudioCue::from_config(&config.app.audio);
    let feed_url = config.app.feed.url.clone();
    let feed_max_backoff = Duration::from_secs(config.app.feed.reconnect_max_secs);

    let mut app_state = app::AppState::new(config, session, user, local.clone(), analysis, refdata, audio);
    app_state.injuries = injuries;

    // 6. Channels
    let (feed_tx, feed_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 7. Feed task
    let feed_handle = if mode == Mode::Live && !feed_url.is_empty() {
        Some(tokio::spawn(feed::run(feed_url, feed_max_backoff, feed_tx)))
    } else {
        if mode == Mode::Live {
            warn!("No feed URL configured; relying on store notifications and sweeps");
        }
        drop(feed_tx);
        None
    };

    // 8. App logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(feed_rx, analysis_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 9. Console (blocks until quit or end of input)
    info!("Application ready");
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {}", e);
    }

    // 10. Cleanup: wait for app task to finish (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    // The feed reconnects forever
    if let Some(handle) = feed_handle {
        handle.abort();
    }

    info!("War room shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("war-room.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("war_room=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
