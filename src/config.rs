//! Application-level configuration loading: phase timings, capacity limits and game defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::GameSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SPYSTER_CONFIG_PATH";
/// Default cap on simultaneously open WebSocket connections.
const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Durations driving the phase timers and connection bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long the role briefing stays on screen before questioning starts.
    pub role_display: Duration,
    /// Length of the voting window.
    pub vote: Duration,
    /// Dramatic pause between the vote closing and the scoreboard.
    pub reveal: Duration,
    /// How long the scoreboard stays up before the next round.
    pub scoring: Duration,
    /// Time a dropped connection keeps its participant marked connected.
    pub disconnect_grace: Duration,
    /// Maximum time a disconnected participant may still reclaim their seat.
    pub reconnect_window: Duration,
    /// Minimum disconnection time before the host may remove a participant.
    pub removal_threshold: Duration,
    /// Interval of the countdown re-broadcast while questioning or voting.
    pub state_tick: Duration,
    /// Upper bound for a single outbound WebSocket write.
    pub send_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            role_display: Duration::from_secs(5),
            vote: Duration::from_secs(60),
            reveal: Duration::from_secs(3),
            scoring: Duration::from_secs(10),
            disconnect_grace: Duration::from_secs(30),
            reconnect_window: Duration::from_secs(300),
            removal_threshold: Duration::from_secs(60),
            state_tick: Duration::from_secs(1),
            send_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Phase and connection timings.
    pub timings: Timings,
    /// Cap on open WebSocket connections.
    pub max_connections: usize,
    /// Optional directory of extra location packs, one JSON file per pack.
    pub content_dir: Option<PathBuf>,
    /// Settings a fresh session starts with.
    pub defaults: GameSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            content_dir: None,
            defaults: GameSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        max_connections = app_config.max_connections,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; every key is optional.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    timings: RawTimings,
    max_connections: Option<usize>,
    content_dir: Option<PathBuf>,
    round_duration_minutes: Option<u32>,
    num_rounds: Option<u32>,
    location_pack: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Timing overrides, expressed in whole seconds.
struct RawTimings {
    role_display_secs: Option<u64>,
    vote_secs: Option<u64>,
    reveal_secs: Option<u64>,
    scoring_secs: Option<u64>,
    disconnect_grace_secs: Option<u64>,
    reconnect_window_secs: Option<u64>,
    removal_threshold_secs: Option<u64>,
    state_tick_millis: Option<u64>,
    send_timeout_millis: Option<u64>,
}

impl From<RawTimings> for Timings {
    fn from(raw: RawTimings) -> Self {
        let base = Timings::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };
        let millis = |value: Option<u64>, fallback: Duration| {
            value
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        Self {
            role_display: secs(raw.role_display_secs, base.role_display),
            vote: secs(raw.vote_secs, base.vote),
            reveal: secs(raw.reveal_secs, base.reveal),
            scoring: secs(raw.scoring_secs, base.scoring),
            disconnect_grace: secs(raw.disconnect_grace_secs, base.disconnect_grace),
            reconnect_window: secs(raw.reconnect_window_secs, base.reconnect_window),
            removal_threshold: secs(raw.removal_threshold_secs, base.removal_threshold),
            state_tick: millis(raw.state_tick_millis, base.state_tick),
            send_timeout: millis(raw.send_timeout_millis, base.send_timeout),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let mut defaults = GameSettings::default();
        if let Some(minutes) = raw.round_duration_minutes {
            defaults.round_duration_minutes = minutes;
        }
        if let Some(rounds) = raw.num_rounds {
            defaults.num_rounds = rounds;
        }
        if let Some(pack) = raw.location_pack.filter(|pack| !pack.trim().is_empty()) {
            defaults.location_pack = pack;
        }
        Self {
            timings: raw.timings.into(),
            max_connections: raw
                .max_connections
                .filter(|max| *max > 0)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            content_dir: raw.content_dir,
            defaults,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
