use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_db_path;
use crate::error::ConfigError;
use crate::rollover::DEFAULT_CHECK_INTERVAL;

fn default_user_id() -> String {
    "local".to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL.as_secs()
}

fn default_notifications() -> bool {
    true
}

fn default_log_filter() -> String {
    "habit_streaks=info".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_interval_secs")]
    pub rollover_interval_secs: u64,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            user_id: default_user_id(),
            rollover_interval_secs: default_interval_secs(),
            notifications: default_notifications(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("habit-streaks")
            .join("config.toml")
    }

    /// Load from `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&raw)?)
    }

    /// Never below one second.
    pub fn rollover_interval(&self) -> Duration {
        Duration::from_secs(self.rollover_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("{}_{}", name, std::process::id()));
        path
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(&temp_file("habit_streaks_missing.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rollover_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file() {
        let path = temp_file("habit_streaks_partial.toml");
        fs::write(&path, "user_id = \"alice\"\nrollover_interval_secs = 0\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.user_id, "alice");
        assert!(config.notifications);
        assert_eq!(config.rollover_interval(), Duration::from_secs(1));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let path = temp_file("habit_streaks_bad.toml");
        fs::write(&path, "user_id = [").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        let _ = fs::remove_file(path);
    }
}
