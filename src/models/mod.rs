//! Domain models for the catalog migration.

mod collection;
mod document;
mod history;
mod phase;
mod quality;
mod result;
mod run;
mod source;

pub use collection::{Collection, SourceTable};
pub use document::{
    BrandDocument, CategoryDocument, ProductDocument, SourceMetadata, StoredDocument,
    TargetDocument, FALLBACK_SOURCE_ID, MIGRATION_SOURCE_TAG,
};
pub use history::{HistoryEntry, HistoryRecord};
pub use phase::{MigrationPhase, PhaseRecord, PhaseTransition, ReadAuthority};
pub use quality::{DataQualityReport, RecordIssues};
pub use result::{MigrationResult, MigrationStatus};
pub use run::RunState;
pub use source::SourceRecord;

/// Generates a new ULID string.
pub fn generate_ulid() -> String {
    ulid::Ulid::new().to_string()
}
