//! Runtime configuration for the sync core.

use serde::{Deserialize, Serialize};

use crate::sync::{SYNC_FOREGROUND_INTERVAL_SECS, SYNC_INTERVAL_JITTER_SECS, SYNC_MAX_PUSH_PASSES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub foreground_interval_secs: u64,
    pub interval_jitter_secs: u64,
    /// Upper bound on immediate re-pushes of a record edited mid-flight.
    pub max_push_passes: usize,
    /// Sync with the backend (best effort) before serving a list call.
    pub pull_before_list: bool,
    /// Flag synced records that vanished from a full server listing.
    pub flag_missing_remote: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            foreground_interval_secs: SYNC_FOREGROUND_INTERVAL_SECS,
            interval_jitter_secs: SYNC_INTERVAL_JITTER_SECS,
            max_push_passes: SYNC_MAX_PUSH_PASSES,
            pull_before_list: true,
            flag_missing_remote: true,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `POCKETLEDGER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = read("POCKETLEDGER_SYNC_INTERVAL_SECS") {
            match value.trim().parse() {
                Ok(secs) => config.foreground_interval_secs = secs,
                Err(_) => {
                    log::warn!("[Sync] Ignoring invalid POCKETLEDGER_SYNC_INTERVAL_SECS '{}'", value)
                }
            }
        }
        if let Some(value) = read("POCKETLEDGER_SYNC_JITTER_SECS") {
            match value.trim().parse() {
                Ok(secs) => config.interval_jitter_secs = secs,
                Err(_) => {
                    log::warn!("[Sync] Ignoring invalid POCKETLEDGER_SYNC_JITTER_SECS '{}'", value)
                }
            }
        }
        if let Some(value) = read("POCKETLEDGER_PULL_BEFORE_LIST") {
            config.pull_before_list = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("POCKETLEDGER_SYNC_INTERVAL_SECS", "120"),
            ("POCKETLEDGER_PULL_BEFORE_LIST", "off"),
        ]
        .into_iter()
        .collect();
        let config = SyncConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.foreground_interval_secs, 120);
        assert_eq!(config.interval_jitter_secs, SYNC_INTERVAL_JITTER_SECS);
        assert!(!config.pull_before_list);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = SyncConfig::from_lookup(|key| {
            (key == "POCKETLEDGER_SYNC_JITTER_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config, SyncConfig::default());
    }
}
