use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{common::ConfigError, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub spatial: SpatialConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Finds the configuration file in the working directory.
    pub fn locate() -> Result<&'static str, ConfigError> {
        ["config.toml", "config.default.toml"]
            .into_iter()
            .find(|p| Path::new(p).exists())
            .ok_or(ConfigError::NotFound)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(Self::locate()?)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Err(ConfigError::Empty(path.to_string()));
        }
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.sample_window == 0 {
            return Err(ConfigError::Invalid("sync.sample_window must be at least 1".into()));
        }
        if self.sync.heartbeat_timeout_ms <= self.sync.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(
                "sync.heartbeat_timeout_ms must exceed sync.heartbeat_interval_ms".into(),
            ));
        }
        if self.spatial.min_gain > self.spatial.max_gain {
            return Err(ConfigError::Invalid(
                "spatial.min_gain must not exceed spatial.max_gain".into(),
            ));
        }
        if self.spatial.tick_ms == 0 {
            return Err(ConfigError::Invalid("spatial.tick_ms must be positive".into()));
        }
        if self.storage.backend == StorageBackend::Filesystem && self.storage.root.is_none() {
            return Err(ConfigError::Invalid(
                "storage.root is required for the filesystem backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.schedule_lead_ms, 750);
        assert_eq!(config.sync.sample_window, 20);
        assert_eq!(config.room.cleanup_grace_secs, 60);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.provider.base_url.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9000

            [sync]
            schedule_lead_ms = 1200

            [spatial]
            falloff = 0.1

            [storage]
            backend = "filesystem"
            root = "/var/lib/tandem"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sync.schedule_lead_ms, 1200);
        assert_eq!(config.sync.heartbeat_timeout_ms, 15_000);
        assert_eq!(config.spatial.falloff, 0.1);
        assert_eq!(config.storage.root.as_deref(), Some("/var/lib/tandem"));
        assert_eq!(
            config.logging.and_then(|l| l.level).as_deref(),
            Some("debug")
        );
    }

    #[test]
    fn rejects_inverted_gain_bounds() {
        let err = Config::parse("[spatial]\nmin_gain = 0.9\nmax_gain = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn filesystem_backend_needs_root() {
        let err = Config::parse("[storage]\nbackend = \"filesystem\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let config = Config::parse(include_str!("../../config.default.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.sync.schedule_lead_ms, defaults.sync.schedule_lead_ms);
        assert_eq!(config.spatial.min_gain, defaults.spatial.min_gain);
        assert_eq!(config.room.client_radius, defaults.room.client_radius);
        assert_eq!(config.storage.keep_backups, defaults.storage.keep_backups);
    }
}
