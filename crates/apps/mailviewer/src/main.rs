//! mailviewer - Inspect the development outbox from the command line
//!
//! Opens the outbox configured in ~/.config/mail-viewer/outbox.json (or the
//! file given with `--config`, or the `MAILVIEWER_*` environment variables)
//! and runs one subcommand against it.

use anyhow::Result;
use clap::Parser;
use log::error;
use outbox::OutboxSettings;

mod args;
mod commands;

use args::Args;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    // Bootstrap config and data directories
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = match &args.config {
        Some(path) => OutboxSettings::from_file(path)?,
        None => OutboxSettings::load()?,
    };

    commands::execute(&settings, args.config.as_deref(), args.command)
}
