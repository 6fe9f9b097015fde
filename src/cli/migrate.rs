//! Assessment and migration command handlers.

use color_eyre::Result;

use crate::di::FromRef;
use crate::models::Collection;
use crate::services::MigrationOrchestrator;

use super::{connect, print_json, App};

impl App {
    pub async fn run_assess(&self) -> Result<()> {
        let ctx = connect().await?;
        let report = MigrationOrchestrator::from_ref(&ctx)
            .assess_data_quality()
            .await?;
        print_json(&report)
    }

    pub async fn run_migrate(&self, collection: Collection) -> Result<()> {
        let ctx = connect().await?;
        let result = MigrationOrchestrator::from_ref(&ctx)
            .migrate(collection)
            .await?;
        print_json(&result)
    }

    pub async fn run_full(&self) -> Result<()> {
        let ctx = connect().await?;
        let run = MigrationOrchestrator::from_ref(&ctx)
            .run_full_migration()
            .await?;
        print_json(&run)
    }

    pub async fn run_count(&self, collection: Collection, owner: i64) -> Result<()> {
        let ctx = connect().await?;
        let count = MigrationOrchestrator::from_ref(&ctx)
            .count_by_owner(collection, owner)
            .await?;
        println!("{}", count);
        Ok(())
    }
}
