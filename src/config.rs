use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    common::{error::HelperError, types::APP_NAME},
    trade::RegistrySettings,
    watcher::{default_triggers, TriggerConfig, TriggerSet},
};

const CONFIG_FILE_NAME: &str = "config.json";
const SOCKET_FILE_NAME: &str = "poe-helper.sock";
const HISTORY_FILE_NAME: &str = "trades.jsonl";
// Upper bound for every configured duration
const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Process configuration. Every field has a default, so a partial file only
/// overrides what it names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_path: PathBuf,
    pub dependencies: Vec<String>,
    pub triggers: Vec<TriggerConfig>,
    pub socket_path: PathBuf,
    pub game_window_classes: Vec<String>,
    pub hideout_command: String,
    pub dedup_bucket_secs: u64,
    pub max_trade_age_secs: u64,
    pub sweep_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub selection_timeout_secs: u64,
    pub shutdown_grace_ms: u64,
    pub history_path: PathBuf,
    pub notify_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            dependencies: vec!["rofi".to_string()],
            triggers: default_triggers(),
            socket_path: default_socket_path(),
            game_window_classes: vec!["pathofexile".to_string(), "steam_app_238960".to_string()],
            hideout_command: "/hideout".to_string(),
            dedup_bucket_secs: 60,
            max_trade_age_secs: 15 * 60,
            sweep_interval_secs: 30,
            poll_interval_ms: 250,
            connect_timeout_ms: 2000,
            response_timeout_ms: 5000,
            selection_timeout_secs: 5 * 60,
            shutdown_grace_ms: 2000,
            history_path: default_history_path(),
            notify_command: "notify-send".to_string(),
        }
    }
}

impl Config {
    /// Reads the config from `path`, or from the default location when no
    /// path is given. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, HelperError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("No config directory on this system, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(HelperError::Config(format!(
                    "Cannot read {} - {}",
                    path.display(),
                    error
                )))
            }
        };

        let config: Config = serde_json::from_str(&text).map_err(|error| {
            HelperError::Config(format!("Malformed {} - {}", path.display(), error))
        })?;
        config.validate()?;
        info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), HelperError> {
        if self.game_window_classes.is_empty() {
            return Err(HelperError::Config(
                "game_window_classes must name at least one class".to_string(),
            ));
        }
        if self.triggers.is_empty() {
            return Err(HelperError::Config(
                "At least one trigger is required".to_string(),
            ));
        }
        let durations = [
            ("dedup_bucket_secs", Duration::from_secs(self.dedup_bucket_secs)),
            ("max_trade_age_secs", Duration::from_secs(self.max_trade_age_secs)),
            ("sweep_interval_secs", self.sweep_interval()),
            ("poll_interval_ms", self.poll_interval()),
            ("connect_timeout_ms", self.connect_timeout()),
            ("response_timeout_ms", self.response_timeout()),
            ("selection_timeout_secs", self.selection_timeout()),
            ("shutdown_grace_ms", self.shutdown_grace()),
        ];
        for (name, value) in durations {
            if value > MAX_DURATION {
                return Err(HelperError::Config(format!(
                    "{} must be at most {} seconds",
                    name,
                    MAX_DURATION.as_secs()
                )));
            }
        }
        let zero = durations
            .into_iter()
            .filter(|(name, _)| !matches!(*name, "selection_timeout_secs" | "shutdown_grace_ms"))
            .find(|(_, value)| value.is_zero());
        if let Some((name, _)) = zero {
            return Err(HelperError::Config(format!("{} must be greater than 0", name)));
        }
        Ok(())
    }

    pub fn compile_triggers(&self) -> Result<TriggerSet, HelperError> {
        TriggerSet::compile(&self.triggers)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            dedup_bucket: Duration::from_secs(self.dedup_bucket_secs),
            max_age: Duration::from_secs(self.max_trade_age_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".local/share/Steam/steamapps/common/Path of Exile/logs/Client.txt")
}

fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_FILE_NAME)
}

fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join(HISTORY_FILE_NAME)
}
