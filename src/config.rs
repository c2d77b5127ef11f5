use std::path::Path;

use serde::{Deserialize, Serialize};

/// Server tunables, loadable from a TOML file. Every field has a default
/// so the file is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entries fetched per leaderboard page; a requester outside this
    /// window is reported as "beyond" rather than ranked exactly.
    pub leaderboard_page_size: usize,
    /// How long a fetched leaderboard page may be served from cache.
    pub leaderboard_cache_seconds: u64,
    /// Notifications returned per list call.
    pub notification_page_size: usize,
    /// Login session lifetime.
    pub session_ttl_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leaderboard_page_size: 50,
            leaderboard_cache_seconds: 10,
            notification_page_size: 50,
            session_ttl_days: 5,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = toml::from_str("leaderboard_page_size = 10").unwrap();
        assert_eq!(config.leaderboard_page_size, 10);
        assert_eq!(config.notification_page_size, 50);
        assert_eq!(config.session_ttl_days, 5);
    }
}
