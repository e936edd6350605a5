//! Music Courier - download tracks, albums, playlists and discographies.
//!
//! Descriptors come from pluggable music services; every track then runs
//! through one pipeline that gates on quality, resolves a path, fetches the
//! payload, picks a cover, converts the codec and writes tags.

pub mod cli;
pub mod config;
pub mod convert;
pub mod cover;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod quality;
pub mod service;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for a run stopped with Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("music_courier=info".parse()?))
        .init();

    match cli::run_command(&args) {
        Err(e)
            if e
                .downcast_ref::<error::Error>()
                .is_some_and(error::Error::is_interrupted) =>
        {
            eprintln!("Interrupted");
            std::process::exit(EXIT_INTERRUPTED);
        }
        result => result,
    }
}
