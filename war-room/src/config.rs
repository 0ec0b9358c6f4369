// Configuration loading and parsing (league.toml, app.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::draft::ledger::Rotation;
use crate::draft::position::Eligibility;
use crate::draft::roster::SlotDef;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    /// Roster slots in league order, eligibility already parsed.
    pub slots: Vec<SlotDef>,
    pub app: AppConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    roster: RosterSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    /// Participant names. Sorted when loaded.
    pub owners: Vec<String>,
    pub rounds: u32,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default = "default_pick_clock_secs")]
    pub pick_clock_secs: u64,
}

fn default_pick_clock_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
struct RosterSection {
    slots: Vec<RawSlot>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSlot {
    id: String,
    label: String,
    eligible: Vec<String>,
}

// ---------------------------------------------------------------------------
// app.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreSection,
    #[serde(default)]
    pub local: LocalSection,
    #[serde(default)]
    pub feed: FeedSection,
    pub refdata: RefdataSection,
    pub reconcile: ReconcileSection,
    pub llm: LlmConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Shared SQLite database holding the ledger and pool.
    pub path: String,
    /// CSV used to seed an empty store.
    pub seed_csv: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LocalSection {
    /// Local key/value database. Empty means the platform data directory.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSection {
    /// WebSocket URL pushing pick updates. Empty disables the remote feed.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

fn default_reconnect_max_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefdataSection {
    pub base_url: String,
    pub cache_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSection {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub enabled: bool,
    /// External player executable, e.g. "mpv" or "afplay".
    #[serde(default = "default_player_command")]
    pub player_command: String,
    #[serde(default)]
    pub player_args: Vec<String>,
    #[serde(default = "default_audio_dir")]
    pub dir: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            player_command: default_player_command(),
            player_args: Vec::new(),
            dir: default_audio_dir(),
        }
    }
}

fn default_player_command() -> String {
    "mpv".to_string()
}

fn default_audio_dir() -> String {
    "audio/owners".to_string()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml`,
/// `config/app.toml`, and (optionally) `config/credentials.toml`, all
/// relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;
    let mut league = league_file.league;
    league.owners.sort();
    let slots = build_slots(&league_file.roster.slots)?;

    // --- app.toml (required) ---
    let app_path = config_dir.join("app.toml");
    let app_text = read_file(&app_path)?;
    let app: AppConfig = toml::from_str(&app_text).map_err(|e| ConfigError::ParseError {
        path: app_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        league,
        slots,
        app,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

fn build_slots(raw: &[RawSlot]) -> Result<Vec<SlotDef>, ConfigError> {
    raw.iter()
        .map(|s| {
            let eligibility =
                Eligibility::from_config(&s.eligible).map_err(|message| {
                    ConfigError::ValidationError {
                        field: format!("roster.slots.{}.eligible", s.id),
                        message,
                    }
                })?;
            Ok(SlotDef {
                id: s.id.clone(),
                label: s.label.clone(),
                eligibility,
            })
        })
        .collect()
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        // create_new so an existing user file is never overwritten
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;
    if league.owners.is_empty() {
        return Err(invalid("league.owners", "must list at least one owner"));
    }
    if let Some(w) = league.owners.windows(2).find(|w| w[0] == w[1]) {
        return Err(invalid("league.owners", format!("duplicate owner `{}`", w[0])));
    }
    if league.owners.iter().any(|o| o.trim().is_empty()) {
        return Err(invalid("league.owners", "owner names must not be blank"));
    }
    if league.rounds == 0 {
        return Err(invalid("league.rounds", "must be greater than 0"));
    }
    if league.pick_clock_secs == 0 {
        return Err(invalid("league.pick_clock_secs", "must be greater than 0"));
    }

    if config.slots.is_empty() {
        return Err(invalid("roster.slots", "must define at least one slot"));
    }
    let mut ids: Vec<&str> = config.slots.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
        return Err(invalid("roster.slots", format!("duplicate slot id `{}`", w[0])));
    }

    let app = &config.app;
    if app.store.path.trim().is_empty() {
        return Err(invalid("store.path", "must not be empty"));
    }
    if app.refdata.cache_hours == 0 {
        return Err(invalid("refdata.cache_hours", "must be greater than 0"));
    }
    if app.reconcile.interval_secs == 0 {
        return Err(invalid("reconcile.interval_secs", "must be greater than 0"));
    }
    if app.llm.max_tokens == 0 {
        return Err(invalid("llm.max_tokens", "must be greater than 0"));
    }
    if !app.feed.url.is_empty()
        && !(app.feed.url.starts_with("ws://") || app.feed.url.starts_with("wss://"))
    {
        return Err(invalid(
            "feed.url",
            format!("must be a ws:// or wss:// URL, got {}", app.feed.url),
        ));
    }
    if app.audio.enabled && app.audio.player_command.trim().is_empty() {
        return Err(invalid("audio.player_command", "required when audio is enabled"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// The shipped defaults, parsed without touching the filesystem.
    pub(crate) fn sample_config() -> Config {
        let league: LeagueFile = toml::from_str(include_str!("../defaults/league.toml")).unwrap();
        let app: AppConfig = toml::from_str(include_str!("../defaults/app.toml")).unwrap();
        let mut league_config = league.league;
        league_config.owners.sort();
        Config {
            slots: build_slots(&league.roster.slots).unwrap(),
            league: league_config,
            app,
            credentials: CredentialsConfig::default(),
        }
    }

    /// Crate root containing `defaults/`, from either the crate or repo root.
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else if cwd.join("war-room/defaults").exists() {
            cwd.join("war-room")
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    /// Temp dir with the default league.toml and app.toml copied into config/.
    fn temp_config(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("war_room_{name}_{}", std::process::id()));
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();
        let root = project_root();
        fs::copy(root.join("defaults/league.toml"), config_dir.join("league.toml")).unwrap();
        fs::copy(root.join("defaults/app.toml"), config_dir.join("app.toml")).unwrap();
        tmp
    }

    fn rewrite(tmp: &Path, file: &str, from: &str, to: &str) {
        let path = tmp.join("config").join(file);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(from), "{file} does not contain {from:?}");
        fs::write(&path, text.replacen(from, to, 1)).unwrap();
    }

    fn expect_validation_field(result: Result<Config, ConfigError>, expected: &str) {
        match result.unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_default_config() {
        let tmp = temp_config("defaults");
        let config = load_config_from(&tmp).expect("should load valid config");

        assert_eq!(
            config.league.owners,
            vec!["Adrian", "Alex", "Anil", "Daniel", "Garrett", "Mark", "Tim", "Will"]
        );
        assert_eq!(config.league.rotation, Rotation::Snake);
        assert_eq!(config.league.pick_clock_secs, 60);
        assert_eq!(config.slots.len(), 21);
        assert_eq!(config.slots[0].id, "C1");
        assert_eq!(config.slots.last().unwrap().eligibility, Eligibility::Any);

        let dh = config.slots.iter().find(|s| s.id == "DH").unwrap();
        assert!(dh.eligibility.accepts("OF"));
        assert!(!dh.eligibility.accepts("SP"));

        assert_eq!(config.app.refdata.cache_hours, 24);
        assert!(config.credentials.anthropic_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn owners_are_sorted_on_load() {
        let tmp = temp_config("sorted");
        rewrite(
            &tmp,
            "league.toml",
            "owners = [",
            "owners = [\"Zed\", ",
        );
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.league.owners.last().map(String::as_str), Some("Zed"));
        assert_eq!(config.league.owners.first().map(String::as_str), Some("Adrian"));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = temp_config("creds");
        fs::write(
            tmp.join("config/credentials.toml"),
            "anthropic_api_key = \"sk-ant-test-key\"\n",
        )
        .unwrap();
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(
            config.credentials.anthropic_api_key.as_deref(),
            Some("sk-ant-test-key")
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_rounds() {
        let tmp = temp_config("rounds");
        rewrite(&tmp, "league.toml", "rounds = 21", "rounds = 0");
        expect_validation_field(load_config_from(&tmp), "league.rounds");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_duplicate_owner() {
        let tmp = temp_config("dup_owner");
        rewrite(&tmp, "league.toml", "\"Will\"", "\"Will\", \"Will\"");
        expect_validation_field(load_config_from(&tmp), "league.owners");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_unknown_slot_position() {
        let tmp = temp_config("bad_slot");
        rewrite(&tmp, "league.toml", "eligible = [\"SS\"]", "eligible = [\"QB\"]");
        expect_validation_field(load_config_from(&tmp), "roster.slots.SS.eligible");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_non_websocket_feed_url() {
        let tmp = temp_config("feed_url");
        rewrite(&tmp, "app.toml", "url = \"\"", "url = \"http://example.com\"");
        expect_validation_field(load_config_from(&tmp), "feed.url");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_league_toml_is_file_not_found() {
        let tmp = temp_config("missing");
        fs::remove_file(tmp.join("config/league.toml")).unwrap();
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::FileNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = temp_config("malformed");
        fs::write(tmp.join("config/app.toml"), "this is = = not toml").unwrap();
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ParseError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_only() {
        let tmp = std::env::temp_dir().join(format!("war_room_ensure_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("defaults/league.toml"), "default").unwrap();
        fs::write(tmp.join("defaults/app.toml"), "default").unwrap();
        fs::write(tmp.join("defaults/credentials.toml.example"), "x").unwrap();
        fs::write(tmp.join("config/app.toml"), "user").unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config/league.toml")]);
        assert_eq!(fs::read_to_string(tmp.join("config/app.toml")).unwrap(), "user");
        assert!(!tmp.join("config/credentials.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_without_any_dirs_errors() {
        let tmp = std::env::temp_dir().join(format!("war_room_nodirs_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        assert!(matches!(
            ensure_config_files(&tmp),
            Err(ConfigError::DefaultsCopyError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }
}
