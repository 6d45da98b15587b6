//! YAML configuration loading for the bot shell: a named-variant
//! `ConfigError` over a single-document load, no multi-file discovery or
//! env overlay, since `bot.yml`/`borg.yml` are each a single document read
//! once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn default_uri_format() -> String {
    wireproto::DEFAULT_URI_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_period_secs() -> f64 {
    15.0
}

/// One bot's settings: room, nick, optional passcode, and the services to
/// run under it.
#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    pub room: String,
    pub nick: String,
    #[serde(default)]
    pub passcode: String,
    #[serde(default = "default_uri_format")]
    pub uri_format: String,
    #[serde(default = "default_true")]
    pub handle_pings: bool,
    #[serde(default = "default_max_restarts")]
    pub services_max_restarts: u32,
    #[serde(default = "default_restart_period_secs")]
    pub services_max_restarts_period: f64,
    /// Service name -> the static registry key that builds it (see
    /// `crate::services::registry`).
    #[serde(default)]
    pub services: HashMap<String, String>,
}

impl BotSection {
    pub fn uri(&self) -> String {
        self.uri_format
            .replace("{room}", &self.room)
            .replace("{0}", &self.room)
    }
}

#[derive(Debug, Deserialize)]
struct BotDocument {
    bot: BotSection,
}

/// A single-room bot configuration, loaded from `bot.yml`.
#[derive(Debug, Clone)]
pub struct BotConfig(pub BotSection);

impl BotConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<BotConfig, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let doc: BotDocument =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(BotConfig(doc.bot))
    }
}

#[derive(Debug, Deserialize)]
struct BorgDocument {
    borg: HashMap<String, BotDocument>,
}

/// A multi-room configuration, loaded from `borg.yml`: each named entry is a
/// complete `bot:`-wrapped section of its own.
#[derive(Debug, Clone)]
pub struct BorgConfig(pub HashMap<String, BotSection>);

impl BorgConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<BorgConfig, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let doc: BorgDocument =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        let bots = doc.borg.into_iter().map(|(name, d)| (name, d.bot)).collect();
        Ok(BorgConfig(bots))
    }
}
