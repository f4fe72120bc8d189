use serde::Deserialize;

use crate::utils::BusError;

/// Top-level configuration for a node.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub node: NodeSettings,
    pub registry: RegistrySettings,
    pub requests: RequestSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Identity of this node and the control namespace it speaks on.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NodeSettings {
    pub id: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegistrySettings {
    /// Period of alive announcements. Peers silent for twice this long are
    /// reported down.
    pub alive_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RequestSettings {
    pub beat_millis: u64,
    pub default_timeout_beats: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Settings as read from files or environment, every value optional.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub node: Option<PartialNodeSettings>,
    pub registry: Option<PartialRegistrySettings>,
    pub requests: Option<PartialRequestSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialNodeSettings {
    pub id: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRegistrySettings {
    pub alive_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRequestSettings {
    pub beat_millis: Option<u64>,
    pub default_timeout_beats: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                id: "switchboard".to_string(),
                namespace: "sb".to_string(),
            },
            registry: RegistrySettings {
                alive_interval_secs: 30,
            },
            requests: RequestSettings {
                beat_millis: 1000,
                default_timeout_beats: 30,
            },
            storage: StorageSettings {
                path: "data/switchboard".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every value missing from `partial` with its default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Self::default();
        let node = partial.node.unwrap_or_default();
        let registry = partial.registry.unwrap_or_default();
        let requests = partial.requests.unwrap_or_default();
        let storage = partial.storage.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Self {
            node: NodeSettings {
                id: node.id.unwrap_or(default.node.id),
                namespace: node.namespace.unwrap_or(default.node.namespace),
            },
            registry: RegistrySettings {
                alive_interval_secs: registry
                    .alive_interval_secs
                    .unwrap_or(default.registry.alive_interval_secs),
            },
            requests: RequestSettings {
                beat_millis: requests.beat_millis.unwrap_or(default.requests.beat_millis),
                default_timeout_beats: requests
                    .default_timeout_beats
                    .unwrap_or(default.requests.default_timeout_beats),
            },
            storage: StorageSettings {
                path: storage.path.unwrap_or(default.storage.path),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.node.id.trim().is_empty() {
            return Err(BusError::Config("node.id must not be empty".into()));
        }
        if self.node.namespace.trim().is_empty() || self.node.namespace.contains(['|', ':']) {
            return Err(BusError::Config(format!(
                "node.namespace {:?} must be non-empty and free of '|' and ':'",
                self.node.namespace
            )));
        }
        if self.registry.alive_interval_secs == 0 {
            return Err(BusError::Config(
                "registry.alive_interval_secs must be positive".into(),
            ));
        }
        if self.requests.beat_millis == 0 || self.requests.default_timeout_beats == 0 {
            return Err(BusError::Config(
                "requests.beat_millis and requests.default_timeout_beats must be positive".into(),
            ));
        }
        if self.storage.path.trim().is_empty() {
            return Err(BusError::Config("storage.path must not be empty".into()));
        }
        Ok(())
    }
}
