//! Node configuration.
//!
//! A `NodeConfig` can be built in code, parsed from TOML, or resolved the
//! usual way: [`NodeConfig::load`] reads the file named by `$I6P_CONFIG`
//! (falling back to `i6p/config.toml` under the XDG config directory) and
//! then lets `I6P_*` environment variables override individual fields.
//! Every knob carries the protocol default, so a missing file is not an
//! error and a partial file only pins what it names.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use i6p_core::ratchet::DEFAULT_MAX_SKIP;
use i6p_transfer::bulk::TransferConfig;
use i6p_transfer::chunker::DEFAULT_CHUNK_SIZE;
use i6p_transfer::compress::CompressionLevel;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IPv6 listen address. Port 0 = OS-assigned.
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capabilities advertised in the HELLO.
    pub capabilities: BTreeMap<String, String>,
    /// Out-of-order tolerance of secure-channel receivers.
    pub ratchet_max_skip: u64,
    /// Resumption ticket lifetime in seconds.
    pub ticket_lifetime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Bytes per chunk.
    pub chunk_size: usize,
    pub parallel_streams: usize,
    pub parallel_workers: usize,
    pub compression: CompressionLevel,
}

impl TransferSettings {
    /// The equivalent bulk-transfer configuration.
    pub fn to_transfer_config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size,
            compression: self.compression,
            parallel_streams: self.parallel_streams,
            parallel_workers: self.parallel_workers,
            ..TransferConfig::default()
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            session: SessionConfig::default(),
            transfer: TransferSettings::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capabilities: BTreeMap::new(),
            ratchet_max_skip: DEFAULT_MAX_SKIP,
            ticket_lifetime_secs: 24 * 60 * 60,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_streams: 8,
            parallel_workers: 4,
            compression: CompressionLevel::Fast,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("writing config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing config: {0}")]
    Encode(#[from] toml::ser::Error),
}

// ── Resolution ────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Full resolution: defaults, then the config file if present, then
    /// `I6P_*` environment overrides on top.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses exactly one file, no environment involved.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Serializes to pretty TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_owned(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })
    }

    /// `$I6P_CONFIG` if set, else `i6p/config.toml` under the XDG config
    /// directory (`$XDG_CONFIG_HOME`, falling back to `~/.config`).
    pub fn default_path() -> PathBuf {
        if let Ok(explicit) = std::env::var("I6P_CONFIG") {
            return PathBuf::from(explicit);
        }
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("i6p")
            .join("config.toml")
    }

    /// Every overridable field funnels through [`env_override`]; the env
    /// names follow the `I6P_<SECTION>__<FIELD>` convention.
    fn apply_env_overrides(&mut self) {
        env_override(&mut self.network.listen_addr, "I6P_NETWORK__LISTEN_ADDR");
        env_override(&mut self.transfer.chunk_size, "I6P_TRANSFER__CHUNK_SIZE");
        env_override(
            &mut self.transfer.parallel_streams,
            "I6P_TRANSFER__PARALLEL_STREAMS",
        );
        env_override(
            &mut self.transfer.parallel_workers,
            "I6P_TRANSFER__PARALLEL_WORKERS",
        );
        env_override(&mut self.transfer.compression, "I6P_TRANSFER__COMPRESSION");
        env_override(
            &mut self.session.ratchet_max_skip,
            "I6P_SESSION__RATCHET_MAX_SKIP",
        );
        env_override(
            &mut self.session.ticket_lifetime_secs,
            "I6P_SESSION__TICKET_LIFETIME_SECS",
        );
    }
}

/// Replaces `target` with the parsed value of the environment variable
/// `key`, if set. A value that does not parse is logged and ignored rather
/// than aborting resolution.
fn env_override<T>(target: &mut T, key: &str)
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(err) => {
            tracing::warn!(key, value = %raw, error = %err, "ignoring unparseable env override");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.transfer.chunk_size, 256 * 1024);
        assert_eq!(config.transfer.parallel_streams, 8);
        assert_eq!(config.transfer.parallel_workers, 4);
        assert_eq!(config.transfer.compression, CompressionLevel::Fast);
        assert_eq!(config.session.ratchet_max_skip, 1000);
        assert_eq!(config.session.ticket_lifetime_secs, 86_400);
        assert!(config.network.listen_addr.is_ipv6());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = NodeConfig::default();
        config
            .session
            .capabilities
            .insert("role".to_string(), "server".to_string());
        config.transfer.chunk_size = 65_536;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.transfer.chunk_size, 65_536);
        assert_eq!(parsed.session.capabilities["role"], "server");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: NodeConfig = toml::from_str("[transfer]\nchunk_size = 1024\n").unwrap();
        assert_eq!(parsed.transfer.chunk_size, 1024);
        assert_eq!(parsed.transfer.parallel_streams, 8);
        assert_eq!(parsed.session.ratchet_max_skip, 1000);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("i6p-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = NodeConfig::default();
        config.transfer.parallel_streams = 2;
        config
            .session
            .capabilities
            .insert("role".to_string(), "relay".to_string());
        config.save(&path).unwrap();

        let loaded = NodeConfig::load_from(&path).unwrap();
        assert_eq!(loaded.transfer.parallel_streams, 2);
        assert_eq!(loaded.session.capabilities["role"], "relay");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_from_missing_file_is_a_read_error() {
        let missing = std::env::temp_dir().join("i6p-config-not-there.toml");
        assert!(matches!(
            NodeConfig::load_from(&missing).unwrap_err(),
            ConfigError::Read { .. }
        ));
    }

    #[test]
    fn env_override_parses_and_ignores_garbage() {
        // A key only this test uses, so parallel tests cannot interfere.
        let key = "I6P_TEST__ENV_OVERRIDE";
        let mut value = 5usize;

        std::env::set_var(key, "12");
        env_override(&mut value, key);
        assert_eq!(value, 12);

        std::env::set_var(key, "not a number");
        env_override(&mut value, key);
        assert_eq!(value, 12);

        std::env::remove_var(key);
        env_override(&mut value, key);
        assert_eq!(value, 12);
    }

    #[test]
    fn env_override_handles_every_field_type() {
        let mut addr: SocketAddr = "[::1]:0".parse().unwrap();
        let key = "I6P_TEST__LISTEN_ADDR";
        std::env::set_var(key, "[::1]:4433");
        env_override(&mut addr, key);
        assert_eq!(addr.port(), 4433);
        std::env::remove_var(key);

        let mut level = CompressionLevel::Fast;
        let key = "I6P_TEST__COMPRESSION";
        std::env::set_var(key, "best");
        env_override(&mut level, key);
        assert_eq!(level, CompressionLevel::Best);
        std::env::remove_var(key);
    }

    #[test]
    fn transfer_settings_convert() {
        let settings = TransferSettings {
            chunk_size: 4096,
            parallel_streams: 2,
            parallel_workers: 1,
            compression: CompressionLevel::Best,
        };
        let config = settings.to_transfer_config();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.parallel_streams, 2);
        assert_eq!(config.parallel_workers, 1);
        assert_eq!(config.compression, CompressionLevel::Best);
        assert_eq!(config.erasure_data, 0);
    }
}
