//! Migration services.
//!
//! Services orchestrate repositories and hold the business rules, using the
//! `FromContext` derive macro for dependency injection.

mod migrators;
mod orchestrator;
mod phase;
mod pipeline;
pub mod quality;
mod runs;
pub mod transform;

pub use migrators::{BrandMigrator, CategoryMigrator, ProductMigrator};
pub use orchestrator::{FullMigration, MigrationOrchestrator};
pub use phase::{PhaseController, RollbackDecision, RollbackPolicy, TargetHealth};
pub use pipeline::{with_retry, Pipeline, Tally};
pub use quality::{assess, QualityAccumulator};
pub use runs::{RunGuard, RunRegistry};
