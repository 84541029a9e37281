use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_HOST_APP_ID: &str = "com.social.media.decondition";

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GateConfig {
    /// Identifier of the gate itself; never monitored
    #[serde(default = "default_host_app_id")]
    pub host_app_id: String,

    /// How long a solved puzzle keeps a target open
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How far back each poll looks for foreground events
    #[serde(default = "default_poll_lookback_secs")]
    pub poll_lookback_secs: u64,

    /// Preference store location (defaults to the platform data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// CSV of `puzzle,solution` lines (defaults to the builtin bank)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puzzle_file: Option<PathBuf>,
}

fn default_host_app_id() -> String {
    DEFAULT_HOST_APP_ID.to_string()
}

fn default_grace_window_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_lookback_secs() -> u64 {
    10
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            host_app_id: default_host_app_id(),
            grace_window_secs: default_grace_window_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_lookback_secs: default_poll_lookback_secs(),
            store_path: None,
            puzzle_file: None,
        }
    }
}

impl GateConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_lookback(&self) -> Duration {
        Duration::from_secs(self.poll_lookback_secs)
    }

    /// Configured store path, or `preferences.json` in the platform data directory
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::platform::data_dir()?.join("preferences.json")),
        }
    }
}

/// Get the platform-specific default config path
pub fn get_config_path() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/puzzle-gate/config.yaml"))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from(
            "/Library/Application Support/puzzle-gate/config.yaml",
        ))
    }

    #[cfg(target_os = "windows")]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData")
                .unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push("puzzle-gate");
        path.push("config.yaml");
        Ok(path)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        anyhow::bail!("Unsupported operating system")
    }
}

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<GateConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: GateConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(GateConfig::default());
    }
    load_config(path)
}

/// Save configuration to a YAML file
pub fn save_config(path: &Path, config: &GateConfig) -> Result<()> {
    validate_config(config)?;

    let content = serde_yaml::to_string(config)
        .context("Failed to serialize config to YAML")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &GateConfig) -> Result<()> {
    if config.host_app_id.trim().is_empty() {
        anyhow::bail!("host_app_id must not be empty");
    }

    if config.grace_window_secs == 0 {
        anyhow::bail!("grace_window_secs must be greater than zero");
    }

    if config.poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be greater than zero");
    }

    // A shorter look-back would leave gaps between polls
    if config.poll_lookback_secs < config.poll_interval_secs {
        anyhow::bail!(
            "poll_lookback_secs ({}) must be at least poll_interval_secs ({})",
            config.poll_lookback_secs,
            config.poll_interval_secs
        );
    }

    Ok(())
}

/// Example configuration file with comprehensive documentation
///
/// The content is loaded from example-config.yaml at compile time
pub const EXAMPLE_CONFIG: &str = include_str!("../example-config.yaml");

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_yaml_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let file = create_temp_yaml_config("{}\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config, GateConfig::default());
        assert_eq!(config.host_app_id, DEFAULT_HOST_APP_ID);
        assert_eq!(config.grace_window(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.poll_lookback(), Duration::from_secs(10));
    }

    #[test]
    fn example_config_is_valid() {
        let config: GateConfig = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let file = create_temp_yaml_config("grace_window_secs: 30\npuzzle_file: /tmp/puzzles.csv\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.grace_window_secs, 30);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.puzzle_file, Some(PathBuf::from("/tmp/puzzles.csv")));
    }

    #[test]
    fn zero_intervals_fail_validation() {
        let config = GateConfig {
            grace_window_secs: 0,
            ..GateConfig::default()
        };
        assert!(validate_config(&config).is_err());

        let config = GateConfig {
            poll_interval_secs: 0,
            ..GateConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn short_lookback_fails_validation() {
        let config = GateConfig {
            poll_interval_secs: 5,
            poll_lookback_secs: 3,
            ..GateConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn empty_host_fails_validation() {
        let config = GateConfig {
            host_app_id: "  ".to_string(),
            ..GateConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzle-gate").join("config.yaml");
        let config = GateConfig {
            store_path: Some(dir.path().join("prefs.json")),
            ..GateConfig::default()
        };

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, GateConfig::default());
        assert!(load_config(&dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = GateConfig {
            store_path: Some(PathBuf::from("/tmp/prefs.json")),
            ..GateConfig::default()
        };
        assert_eq!(config.resolved_store_path().unwrap(), PathBuf::from("/tmp/prefs.json"));
    }
}
