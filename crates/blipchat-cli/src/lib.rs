//! BlipChat CLI library
//!
//! Configuration, session wiring and command handlers behind the `blipchat`
//! binary.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod stdio;

pub use app::BlipApp;
pub use cli::{Cli, Commands};
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
