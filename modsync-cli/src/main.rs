//! modsync: replay repository history into a module registry.
//!
//! # Usage
//!
//! ```text
//! modsync sync --module <dir>:<identity>... [--repo PATH] [--registry-dir DIR]
//!              [--all-branches] [--create --create-visibility public|private]
//!              [--error-format text|json]
//! modsync status [--registry-dir DIR] [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "modsync",
    version,
    about = "Sync module snapshots from git history into a registry",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push every unsynced module commit to the registry.
    Sync(SyncArgs),

    /// Show modules and sync points recorded in the registry.
    Status(StatusArgs),
}

/// `~/.modsync/registry`
pub(crate) fn default_registry_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".modsync").join("registry"))
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
