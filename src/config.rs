//! Application-level configuration loading: listener, storage and poll limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CLASSROOM_POLL_CONFIG_PATH";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_PING_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_OPTIONS: usize = 10;
const DEFAULT_MAX_DURATION_SECS: u32 = 3_600;
const DEFAULT_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// TCP port the HTTP/WebSocket listener binds to.
    pub port: u16,
    /// MongoDB connection string; the in-memory store is used when absent.
    pub mongo_uri: Option<String>,
    /// MongoDB database name override.
    pub mongo_db: Option<String>,
    /// Period of the `pollTimeUpdate` broadcast.
    pub tick_interval: Duration,
    /// Period of the liveness `ping` broadcast.
    pub ping_interval: Duration,
    /// Upper bound on the number of options per poll.
    pub max_options: usize,
    /// Upper bound on a poll's answering window, in seconds.
    pub max_duration_secs: u32,
    /// Default page size of `GET /api/polls`; realtime history is never truncated.
    pub history_limit: u32,
    /// Refuse answers submitted after the countdown reached zero.
    pub reject_late_answers: bool,
}

impl AppConfig {
    /// Load the configuration from disk, then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
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
        };

        config.with_overrides(|key| env::var(key).ok())
    }

    /// Apply `PORT`/`SERVER_PORT`, `MONGO_URI`/`MONGODB_URI` and `MONGO_DB` overrides.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = non_empty("PORT").or_else(|| non_empty("SERVER_PORT")) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(err) => warn!(value = %raw, error = %err, "ignoring invalid port override"),
            }
        }
        if let Some(uri) = non_empty("MONGO_URI").or_else(|| non_empty("MONGODB_URI")) {
            self.mongo_uri = Some(uri);
        }
        if let Some(db) = non_empty("MONGO_DB") {
            self.mongo_db = Some(db);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mongo_uri: None,
            mongo_db: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            max_options: DEFAULT_MAX_OPTIONS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            reject_late_answers: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    mongo: RawMongo,
    poll: RawPoll,
    timers: RawTimers,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMongo {
    uri: Option<String>,
    database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPoll {
    max_options: Option<usize>,
    max_duration_secs: Option<u32>,
    history_limit: Option<u32>,
    reject_late_answers: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTimers {
    tick_interval_ms: Option<u64>,
    ping_interval_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            port: value.port.unwrap_or(defaults.port),
            mongo_uri: value.mongo.uri.filter(|uri| !uri.trim().is_empty()),
            mongo_db: value.mongo.database.filter(|db| !db.trim().is_empty()),
            tick_interval: value
                .timers
                .tick_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            ping_interval: value
                .timers
                .ping_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            max_options: value
                .poll
                .max_options
                .filter(|max| *max >= 2)
                .unwrap_or(defaults.max_options),
            max_duration_secs: value
                .poll
                .max_duration_secs
                .filter(|max| *max > 0)
                .unwrap_or(defaults.max_duration_secs),
            history_limit: value
                .poll
                .history_limit
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.history_limit),
            reject_late_answers: value
                .poll
                .reject_late_answers
                .unwrap_or(defaults.reject_late_answers),
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
