use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::file_store::FileMailbox;

pub const BUILTIN_BUS_CONFIG: &str = include_str!("data/bus_config.json");

pub const CONFIG_PATH_ENV: &str = "COMMAND_BUS_CONFIG_PATH";
pub const MAILBOX_PATH_ENV: &str = "COMMAND_BUS_PATH";

const DEFAULT_MAILBOX_PATH: &str = "data/bus/commands.json";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    mailbox_path: PathBuf,
    poll_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mailbox_path: PathBuf::from(DEFAULT_MAILBOX_PATH),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl BusConfig {
    /// The compiled-in configuration.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_BUS_CONFIG).unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, BusConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| BusConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = BusConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn mailbox_path(&self) -> &Path {
        &self.mailbox_path
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    /// Poll period, never shorter than 10 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn with_mailbox_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mailbox_path = path.into();
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn open_mailbox(&self) -> FileMailbox {
        FileMailbox::new(self.mailbox_path.clone())
    }
}

#[derive(Debug, Error)]
pub enum BusConfigError {
    #[error("failed to parse bus config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read bus config from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BusConfigMetadata {
    path: Option<PathBuf>,
}

impl BusConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// File the config came from; `None` for the builtin.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Resolve the bus config from an optional override file, falling back to the
/// builtin, then apply an optional direct mailbox path.
pub fn load_bus_config(
    config_path: Option<PathBuf>,
    mailbox_override: Option<PathBuf>,
) -> (BusConfig, BusConfigMetadata) {
    let (config, metadata) = match config_path {
        Some(path) => match BusConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "command_bus::config",
                    path = %path.display(),
                    "bus_config.loaded=file"
                );
                (config, BusConfigMetadata::new(Some(path)))
            }
            Err(err) => {
                tracing::warn!(
                    target: "command_bus::config",
                    path = %path.display(),
                    error = %err,
                    "bus_config.load_failed"
                );
                builtin_with_log()
            }
        },
        None => builtin_with_log(),
    };

    let config = match mailbox_override {
        Some(path) => {
            tracing::info!(
                target: "command_bus::config",
                mailbox = %path.display(),
                "bus_config.mailbox_override"
            );
            config.with_mailbox_path(path)
        }
        None => config,
    };
    (config, metadata)
}

/// [`load_bus_config`] driven by `COMMAND_BUS_CONFIG_PATH` and
/// `COMMAND_BUS_PATH`.
pub fn load_bus_config_from_env() -> (BusConfig, BusConfigMetadata) {
    let config_path = env_path(CONFIG_PATH_ENV);
    let mailbox_override = env_path(MAILBOX_PATH_ENV);
    load_bus_config(config_path, mailbox_override)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn builtin_with_log() -> (BusConfig, BusConfigMetadata) {
    tracing::info!(target: "command_bus::config", "bus_config.loaded=builtin");
    (BusConfig::builtin(), BusConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_matches_defaults() {
        let config = BusConfig::builtin();
        assert_eq!(config, BusConfig::default());
        assert_eq!(config.mailbox_path(), Path::new("data/bus/commands.json"));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = BusConfig::from_json_str(r#"{"poll_interval_ms": 400}"#).expect("parse");
        assert_eq!(config.poll_interval_ms(), 400);
        assert_eq!(config.mailbox_path(), Path::new(DEFAULT_MAILBOX_PATH));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = BusConfig::default().with_poll_interval_ms(0);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn override_file_is_used() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("bus.json");
        fs::write(
            &path,
            r#"{"mailbox_path": "/srv/bots/commands.json", "poll_interval_ms": 250}"#,
        )
        .expect("write config");

        let (config, metadata) = load_bus_config(Some(path.clone()), None);
        assert_eq!(config.mailbox_path(), Path::new("/srv/bots/commands.json"));
        assert_eq!(config.poll_interval_ms(), 250);
        assert_eq!(metadata.path(), Some(path.as_path()));
    }

    #[test]
    fn unreadable_override_falls_back_to_builtin() {
        let dir = TempDir::new().expect("temp dir");
        let (config, metadata) = load_bus_config(Some(dir.path().join("missing.json")), None);
        assert_eq!(config, BusConfig::builtin());
        assert!(metadata.path().is_none());
    }

    #[test]
    fn malformed_override_falls_back_to_builtin() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("bus.json");
        fs::write(&path, "{ poll_interval_ms: ").expect("write config");
        assert!(matches!(
            BusConfig::from_file(&path),
            Err(BusConfigError::Parse(_))
        ));
        let (config, _) = load_bus_config(Some(path), None);
        assert_eq!(config, BusConfig::builtin());
    }

    #[test]
    fn mailbox_override_wins_over_file() {
        let dir = TempDir::new().expect("temp dir");
        let mailbox = dir.path().join("elsewhere.json");
        let (config, _) = load_bus_config(None, Some(mailbox.clone()));
        assert_eq!(config.mailbox_path(), mailbox.as_path());
        assert_eq!(config.open_mailbox().path(), mailbox.as_path());
    }
}
