//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for the monthly state files.
    pub log_base: PathBuf,
    /// How many months (counting back from the current one) to scan when the
    /// file store cannot enumerate files during a path rename.
    pub rename_window_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_base: PathBuf::from("log"),
            rename_window_months: 12,
        }
    }
}

/// Environment overrides, applied after file/host configuration.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(base) = std::env::var("CHUTE_LOG_BASE")
        && !base.trim().is_empty()
    {
        cfg.log_base = PathBuf::from(base);
    }
    if let Ok(raw) = std::env::var("CHUTE_RENAME_WINDOW_MONTHS") {
        match raw.parse::<u32>() {
            Ok(months) if months > 0 => cfg.rename_window_months = months,
            _ => {
                tracing::warn!("invalid CHUTE_RENAME_WINDOW_MONTHS, ignoring: {raw}");
            }
        }
    }
}
