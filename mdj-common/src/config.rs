//! Configuration loading, root folder resolution, and engine tuning

use crate::events::QuotaLevel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Quota warning thresholds as percentages of the storage budget.
///
/// The classification boundaries are part of the storage contract:
/// below `warning_pct` is normal, then warning, danger, and critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaThresholds {
    pub warning_pct: f64,
    pub danger_pct: f64,
    pub critical_pct: f64,
}

impl Default for QuotaThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 70.0,
            danger_pct: 85.0,
            critical_pct: 95.0,
        }
    }
}

impl QuotaThresholds {
    /// Classify a usage percentage into a warning level
    pub fn classify(&self, percentage: f64) -> QuotaLevel {
        if percentage < self.warning_pct {
            QuotaLevel::Normal
        } else if percentage < self.danger_pct {
            QuotaLevel::Warning
        } else if percentage < self.critical_pct {
            QuotaLevel::Danger
        } else {
            QuotaLevel::Critical
        }
    }
}

/// Engine tuning parameters.
///
/// The defaults mirror the values the console shipped with; sessions with
/// unusual input patterns can override them from the `[tuning]` section of
/// the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Debounce window for session control actions (milliseconds).
    ///
    /// Operations arriving within this span of the last accepted operation
    /// are buffered and collapsed by priority instead of executed.
    pub debounce_window_ms: u64,

    /// Quota warning classification thresholds
    pub quota_thresholds: QuotaThresholds,

    /// Storage budget for the local audio cache (bytes)
    pub storage_budget_bytes: u64,

    /// Base delay for database open retries (milliseconds, scaled by attempt)
    pub open_retry_base_ms: u64,

    /// Number of retries before the binary store is declared unavailable
    pub open_retry_count: u32,

    /// Period of the background quota monitor (seconds)
    pub quota_refresh_secs: u64,

    /// EventBus channel capacity
    pub event_bus_capacity: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            debounce_window_ms: 100,
            quota_thresholds: QuotaThresholds::default(),
            storage_budget_bytes: 512 * 1024 * 1024,
            open_retry_base_ms: 1000,
            open_retry_count: 2,
            quota_refresh_secs: 30,
            event_bus_capacity: 256,
        }
    }
}

/// Config file contents (`config.toml` under the config directory or the
/// root folder)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub tuning: Tuning,
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_config_file(None) {
        if let Some(root) = config.root_folder {
            return root;
        }
    }

    // Priority 4: OS-dependent compiled default
    let fallback = default_root_folder();
    tracing::debug!("Using default root folder: {}", fallback.display());
    fallback
}

/// Load the config file, trying an explicit path first, then the platform
/// config directory
pub fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_config_path()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?,
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(&path)?;
    toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Default config file location (`~/.config/magic-dj/config.toml` or the
/// platform equivalent)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("magic-dj").join("config.toml"))
}

/// OS-dependent default root folder for the engine's local data
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("magic-dj"))
        .unwrap_or_else(|| PathBuf::from(".magic-dj"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning_values() {
        let tuning = Tuning::default();
        assert_eq!(tuning.debounce_window_ms, 100);
        assert_eq!(tuning.quota_thresholds.warning_pct, 70.0);
        assert_eq!(tuning.quota_thresholds.danger_pct, 85.0);
        assert_eq!(tuning.quota_thresholds.critical_pct, 95.0);
        assert_eq!(tuning.open_retry_base_ms, 1000);
        assert_eq!(tuning.open_retry_count, 2);
    }

    #[test]
    fn test_classify_levels() {
        let t = QuotaThresholds::default();
        assert_eq!(t.classify(0.0), QuotaLevel::Normal);
        assert_eq!(t.classify(69.9), QuotaLevel::Normal);
        assert_eq!(t.classify(70.0), QuotaLevel::Warning);
        assert_eq!(t.classify(84.9), QuotaLevel::Warning);
        assert_eq!(t.classify(85.0), QuotaLevel::Danger);
        assert_eq!(t.classify(94.9), QuotaLevel::Danger);
        assert_eq!(t.classify(95.0), QuotaLevel::Critical);
        assert_eq!(t.classify(120.0), QuotaLevel::Critical);
    }

    #[test]
    fn test_cli_arg_wins() {
        let root = resolve_root_folder(Some(Path::new("/tmp/mdj-test-root")), "MDJ_TEST_UNSET");
        assert_eq!(root, PathBuf::from("/tmp/mdj-test-root"));
    }

    #[test]
    fn test_tuning_from_partial_toml() {
        // Fields absent from the file must keep their defaults
        let parsed: Tuning = toml::from_str("debounce_window_ms = 250").unwrap();
        assert_eq!(parsed.debounce_window_ms, 250);
        assert_eq!(parsed.quota_thresholds, QuotaThresholds::default());
        assert_eq!(parsed.open_retry_count, 2);
    }
}
