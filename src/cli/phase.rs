//! Phase management commands.

use clap::Subcommand;
use color_eyre::Result;
use serde_json::json;

use crate::models::MigrationPhase;
use crate::services::TargetHealth;

use super::{connect, print_json};

#[derive(Subcommand)]
pub enum PhaseCommand {
    /// Print the current phase and its audit trail
    Show,

    /// Transition forward to the next phase (rollback goes through check-rollback)
    Set {
        /// DUAL_WRITE_SOURCE_PRIMARY, DUAL_WRITE_TARGET_PRIMARY or TARGET_ONLY
        phase: MigrationPhase,

        /// Reason recorded in the audit trail
        #[arg(long, default_value = "operator request")]
        reason: String,
    },

    /// Decide whether the cutover should be rolled back
    CheckRollback {
        /// Failed target operations since cutover
        #[arg(long)]
        failed: u64,

        /// Total target operations since cutover
        #[arg(long)]
        total: u64,

        /// Roll back to DUAL_WRITE_SOURCE_PRIMARY if warranted
        #[arg(long)]
        apply: bool,
    },
}

impl PhaseCommand {
    pub async fn run(&self) -> Result<()> {
        let ctx = connect().await?;
        let controller = &ctx.phase;

        match self {
            PhaseCommand::Show => {
                let record = controller.record().await;
                let transitions = controller.transitions().await?;
                print_json(&json!({
                    "phase": record.phase,
                    "entered_at": record.entered_at,
                    "read_authority": record.phase.read_authority(),
                    "requires_dual_write": record.phase.requires_dual_write(),
                    "transitions": transitions,
                }))
            }
            PhaseCommand::Set { phase, reason } => {
                let transition = controller.transition_with_reason(*phase, reason).await?;
                print_json(&transition)
            }
            PhaseCommand::CheckRollback {
                failed,
                total,
                apply,
            } => {
                let health = TargetHealth::new(*failed, *total);
                let decision = if *apply {
                    controller.rollback_if_degraded(&health).await?
                } else {
                    controller.evaluate_rollback(&health).await
                };
                print_json(&json!({
                    "decision": decision,
                    "phase": controller.get_phase().await,
                }))
            }
        }
    }
}
