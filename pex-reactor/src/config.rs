//! Reactor configuration: defaults, TOML file, environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// PEX reactor configuration.
/// File: ~/.config/pex/config.toml or /etc/pex/config.toml.
/// Env overrides: PEX_SEEDS (comma-separated), PEX_ENSURE_PEERS_PERIOD_SECS,
/// PEX_MAX_MSG_COUNT_BY_PEER.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactorConfig {
    /// Seed addresses dialed only when fully isolated. Resolved by the
    /// connection manager, not here.
    #[serde(default)]
    pub seeds: Vec<String>,
    /// Seconds between ensure-peers runs (default 30).
    #[serde(default = "default_ensure_peers_period_secs")]
    pub ensure_peers_period_secs: u64,
    /// Messages one peer may send us per flush window (default 1000).
    #[serde(default = "default_max_msg_count_by_peer")]
    pub max_msg_count_by_peer: u16,
    /// Seconds between counter flushes (default 3600).
    #[serde(default = "default_msg_flush_interval_secs")]
    pub msg_flush_interval_secs: u64,
    /// Outbound connections ensure-peers maintains (default 10).
    #[serde(default = "default_min_outbound_peers")]
    pub min_outbound_peers: usize,
}

fn default_ensure_peers_period_secs() -> u64 {
    30
}
fn default_max_msg_count_by_peer() -> u16 {
    1000
}
fn default_msg_flush_interval_secs() -> u64 {
    3600
}
fn default_min_outbound_peers() -> usize {
    10
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            ensure_peers_period_secs: default_ensure_peers_period_secs(),
            max_msg_count_by_peer: default_max_msg_count_by_peer(),
            msg_flush_interval_secs: default_msg_flush_interval_secs(),
            min_outbound_peers: default_min_outbound_peers(),
        }
    }
}

impl ReactorConfig {
    pub fn ensure_peers_period(&self) -> Duration {
        Duration::from_secs(self.ensure_peers_period_secs)
    }

    pub fn msg_flush_interval(&self) -> Duration {
        Duration::from_secs(self.msg_flush_interval_secs)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> ReactorConfig {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("PEX_SEEDS") {
        c.seeds = s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Ok(s) = std::env::var("PEX_ENSURE_PEERS_PERIOD_SECS") {
        if let Ok(v) = s.parse::<u64>() {
            c.ensure_peers_period_secs = v;
        }
    }
    if let Ok(s) = std::env::var("PEX_MAX_MSG_COUNT_BY_PEER") {
        if let Ok(v) = s.parse::<u16>() {
            c.max_msg_count_by_peer = v;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/pex/config.toml"));
    }
    out.push(PathBuf::from("/etc/pex/config.toml"));
    out
}

fn load_file() -> Option<ReactorConfig> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<ReactorConfig>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ReactorConfig::default();
        assert!(c.seeds.is_empty());
        assert_eq!(c.ensure_peers_period(), Duration::from_secs(30));
        assert_eq!(c.max_msg_count_by_peer, 1000);
        assert_eq!(c.msg_flush_interval(), Duration::from_secs(3600));
        assert_eq!(c.min_outbound_peers, 10);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let c: ReactorConfig = toml::from_str(
            r#"
            seeds = ["seed1.example.org:26656", "seed2.example.org:26656"]
            ensure_peers_period_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.seeds.len(), 2);
        assert_eq!(c.ensure_peers_period_secs, 5);
        assert_eq!(c.max_msg_count_by_peer, 1000);
        assert_eq!(c.min_outbound_peers, 10);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(toml::from_str::<ReactorConfig>("bogus = 1").is_err());
    }
}
