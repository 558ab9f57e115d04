//! Provider configuration loading and resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::ConfigError;

pub const CONFIG_ENV: &str = "AGENT_RELAY_CONFIG";

/// How to launch one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overlaid on the environment inherited from this process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Provider name to launch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, alias = "mcpServers")]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl ProvidersConfig {
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Where the provider config file comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Named by the caller (flag or environment); it must exist.
    Explicit(PathBuf),
    /// Fallback location; a missing file means no providers.
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Default(p) => p,
        }
    }
}

/// Resolve the provider config path: explicit flag, `AGENT_RELAY_CONFIG`,
/// `./agent-relay.json`, then `$HOME/.agent-relay/providers.json`.
pub fn resolve_config_path(explicit: Option<&str>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Explicit(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from("agent-relay.json");
    if cwd_config.exists() {
        return ConfigSource::Default(cwd_config);
    }

    ConfigSource::Default(default_config_path())
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".agent-relay").join("providers.json")
}

/// Load the provider mapping from a resolved source.
pub fn load_from(source: &ConfigSource) -> Result<ProvidersConfig, ConfigError> {
    let path = source.path();
    match std::fs::read_to_string(path) {
        Ok(text) => ProvidersConfig::from_json(path, &text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match source {
            ConfigSource::Default(_) => {
                tracing::debug!(path = %path.display(), "no provider config, starting empty");
                Ok(ProvidersConfig::default())
            }
            ConfigSource::Explicit(_) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        },
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn load_providers(explicit: Option<&str>) -> Result<ProvidersConfig, ConfigError> {
    load_from(&resolve_config_path(explicit))
}
