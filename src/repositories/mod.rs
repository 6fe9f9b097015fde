//! Store access behind narrow traits.
//!
//! Each trait has one PostgreSQL implementation and one in-memory fake in
//! [`memory`] with identical semantics.

mod history;
pub mod memory;
mod phase;
mod runs;
mod source;
mod target;

pub use history::{HistoryLog, PostgresHistoryLog};
pub use phase::{PhaseStore, PostgresPhaseStore};
pub use runs::{PostgresRunLock, RunClaim, RunLock};
pub use source::{PostgresSourceReader, SourceReader};
pub use target::{classify_upsert, PostgresTargetStore, TargetStore, UpsertOutcome};
