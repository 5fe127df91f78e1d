//! On-disk daemon configuration, loaded from `$DEPECHE_DATA_DIR/config.toml`
//! with pure-default fallback when no file exists (spec.md §6's "default
//! ports" plus the identity/storage surface the original reads out of
//! `depeche.config` via `configparser`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// This node's presentation to the rest of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Self-echo filter for UDP announcements (spec.md §4.4). Randomly
    /// generated on first run and then persisted, matching the original's
    /// `uuid.uuid4()` callsign.
    #[serde(default = "default_callsign")]
    pub callsign: String,
    /// The alias this node presents to new contacts during rendezvous.
    #[serde(default = "default_alias")]
    pub alias: String,
}

/// Ports and timing (spec.md §6 "Default ports").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_announce_port")]
    pub announce_port: u16,
    #[serde(default = "default_rendezvous_base_port")]
    pub rendezvous_base_port: u16,
    #[serde(default = "default_exchange_base_port")]
    pub exchange_base_port: u16,
    #[serde(default = "default_rendezvous_timeout_secs")]
    pub rendezvous_timeout_secs: u64,
    /// How many times a stored message is re-offered for forwarding before
    /// it's no longer picked up by `messages_to_forward`.
    #[serde(default = "default_forward_cap")]
    pub forward_cap: u32,
}

/// Where persistent state lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Empty = platform default (`default_data_dir`).
    #[serde(default)]
    pub data_dir: String,
}

fn default_callsign() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_alias() -> String {
    "anonymous".to_string()
}

fn default_announce_port() -> u16 {
    27272
}

fn default_rendezvous_base_port() -> u16 {
    27273
}

fn default_exchange_base_port() -> u16 {
    27272
}

fn default_rendezvous_timeout_secs() -> u64 {
    60
}

fn default_forward_cap() -> u32 {
    5
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            callsign: default_callsign(),
            alias: default_alias(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            announce_port: default_announce_port(),
            rendezvous_base_port: default_rendezvous_base_port(),
            exchange_base_port: default_exchange_base_port(),
            rendezvous_timeout_secs: default_rendezvous_timeout_secs(),
            forward_cap: default_forward_cap(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from the default config file location, falling back to (and
    /// persisting) defaults if none exists yet.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, toml::to_string(&config)?)?;
            Ok(config)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEPECHE_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".depeche"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/depeche"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_ports() {
        let config = DaemonConfig::default();
        assert_eq!(config.network.announce_port, 27272);
        assert_eq!(config.network.exchange_base_port, 27272);
        assert_eq!(config.network.rendezvous_base_port, 27273);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DaemonConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let back: DaemonConfig = toml::from_str(&text).expect("parse");
        assert_eq!(back.identity.callsign, config.identity.callsign);
    }
}
