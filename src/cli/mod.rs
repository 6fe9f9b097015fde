//! CLI module for catalog-migrate.
//!
//! Subcommands:
//! - `init`: Create the engine's tables and the initial phase record
//! - `assess`: Score source data quality
//! - `migrate`: Migrate one collection
//! - `run`: Migrate every collection in dependency order
//! - `phase`: Show or change the cutover phase
//! - `history`: Show recent run history
//! - `runs`: Show the latest run per collection
//! - `count`: Count migrated documents for an owner

mod history;
mod init;
mod migrate;
mod phase;

use clap::{Parser, Subcommand};
use serde::Serialize;

pub use phase::PhaseCommand;

use crate::config::Config;
use crate::context::Context;
use crate::models::Collection;

/// Phased catalog migration - relational source to document target
#[derive(Parser)]
#[command(name = "catalog-migrate")]
#[command(about = "Phased catalog migration from a relational source to a document store")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the engine's tables and the initial phase record
    Init,

    /// Assess source data quality (products)
    Assess,

    /// Migrate a single collection
    Migrate {
        /// brands, categories or products
        collection: Collection,
    },

    /// Migrate brands, categories and products in order
    Run,

    /// Show or change the migration phase
    Phase {
        #[command(subcommand)]
        command: PhaseCommand,
    },

    /// Show recent run history
    History {
        /// Maximum entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show the latest run per collection and its status
    Runs,

    /// Count migrated documents owned by a store
    Count {
        #[arg(long)]
        collection: Collection,

        /// Owner (store) id
        #[arg(long)]
        owner: i64,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        match self.command {
            Command::Init => self.run_init().await,
            Command::Assess => self.run_assess().await,
            Command::Migrate { collection } => self.run_migrate(collection).await,
            Command::Run => self.run_full().await,
            Command::Phase { ref command } => command.run().await,
            Command::History { limit } => self.run_history(limit).await,
            Command::Runs => self.run_runs().await,
            Command::Count { collection, owner } => self.run_count(collection, owner).await,
        }
    }
}

/// Loads config and connects both stores.
async fn connect() -> color_eyre::Result<Context> {
    let config = Config::load()?;
    tracing::debug!(page_size = config.source.page_size, workers = config.workers(), "Loaded configuration");
    Ok(Context::connect(config).await?)
}

fn print_json<T: Serialize>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
