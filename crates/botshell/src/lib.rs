//! Composes [`chatclient`], [`nickauth`], and [`rtsup`] into a runnable bot
//! shell, configured from YAML and shipped with a handful of example
//! services under [`services`].

pub mod bot;
pub mod config;
mod services;

pub use bot::{Bot, BotContext};
pub use config::{BorgConfig, BotConfig, BotSection, ConfigError};
