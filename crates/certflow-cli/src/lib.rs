//! The `certflow` command-line interface.
//!
//! Runs the dashboard server or a single create/send batch from the
//! terminal, configured from `config.toml`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
