//! Command-line interface for music-courier.
//!
//! This module provides CLI commands for downloading from configured music
//! services and for managing the configuration.

mod commands;

pub use commands::{Cli, Commands, Kind, run_command};
