//! History and run-state command handlers.

use color_eyre::Result;

use crate::di::FromRef;
use crate::services::MigrationOrchestrator;

use super::{connect, print_json, App};

impl App {
    pub async fn run_history(&self, limit: usize) -> Result<()> {
        let ctx = connect().await?;
        let entries = MigrationOrchestrator::from_ref(&ctx).history(limit).await?;
        print_json(&entries)
    }

    /// Latest run per collection, including runs still in progress.
    pub async fn run_runs(&self) -> Result<()> {
        let ctx = connect().await?;
        let states = MigrationOrchestrator::from_ref(&ctx).runs().await?;
        print_json(&states)
    }
}
