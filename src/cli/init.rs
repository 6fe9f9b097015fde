//! Init command handler.

use color_eyre::Result;

use crate::config::Config;
use crate::context::Context;
use crate::repositories::SourceReader;
use crate::schema::bootstrap;

use super::App;

impl App {
    /// Apply the bootstrap schema to the target database, create the phase
    /// record if this is the first run, and check the source is reachable.
    pub async fn run_init(&self) -> Result<()> {
        let config = Config::load()?;
        let (_, target) = Context::create_clients(&config)?;

        tracing::info!("Bootstrapping target schema...");
        let result = bootstrap(&target).await?;
        if result.applied_migrations.is_empty() {
            tracing::info!(
                "Schema already at v{}, no migrations needed",
                result.current_version
            );
        } else {
            tracing::info!(
                "Schema migrations complete: v{} -> v{}, applied: {:?}",
                result.previous_version,
                result.current_version,
                result.applied_migrations
            );
        }

        let ctx = Context::connect(config).await?;
        tracing::info!("Current phase: {}", ctx.phase.get_phase().await);

        match ctx.source.ping().await {
            Ok(()) => tracing::info!("Source database reachable"),
            Err(e) => tracing::warn!(error = %e, "Source database unreachable; backfills will fail"),
        }
        Ok(())
    }
}
