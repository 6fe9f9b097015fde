//! Application error types and their classification.
//!
//! Per-record failures (validation, duplicate keys, a single timed-out write)
//! are recovered inside a migration run and land in `MigrationResult.errors`.
//! Only total store unreachability fails a collection, and only caller misuse
//! (illegal phase change, overlapping runs) is returned synchronously.

use thiserror::Error;

use crate::models::{Collection, MigrationPhase};

/// Which side of the migration an I/O failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Source,
    Target,
    Phase,
    History,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreKind::Source => "source",
            StoreKind::Target => "target",
            StoreKind::Phase => "phase",
            StoreKind::History => "history",
        };
        f.write_str(name)
    }
}

/// A record that cannot be mapped into the target schema at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("record {source_id} has no natural key and no usable fallback identifier")]
    MissingIdentity { source_id: i64 },

    #[error("category {source_id} references parent {parent_id} which was not migrated")]
    UnresolvedParent { source_id: i64, parent_id: i64 },
}

/// Application-level errors for the migration engine.
#[derive(Error, Debug)]
pub enum AppError {
    // Store errors
    #[error("{store} store unreachable: {message}")]
    Connectivity { store: StoreKind, message: String },

    #[error("{store} store timed out after {timeout_ms}ms during {operation}")]
    Timeout {
        store: StoreKind,
        operation: String,
        timeout_ms: u128,
    },

    #[error("Query failed: {message}")]
    Query { message: String, query: String },

    // Record errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error(
        "Duplicate key '{key}' in {collection}: owned by source record {existing_source_id}, \
         rejected source record {incoming_source_id}"
    )]
    DuplicateKey {
        collection: Collection,
        key: String,
        existing_source_id: i64,
        incoming_source_id: i64,
    },

    // Caller errors
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidPhaseTransition {
        from: MigrationPhase,
        to: MigrationPhase,
    },

    #[error("A {collection} migration is already in progress")]
    RunInProgress { collection: Collection },

    #[error("Source system is decommissioned in phase {0}; backfill is no longer possible")]
    SourceDecommissioned(MigrationPhase),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a connectivity failure on the given store.
    pub fn connectivity(store: StoreKind, message: impl Into<String>) -> Self {
        AppError::Connectivity {
            store,
            message: message.into(),
        }
    }

    /// Stable application code used to prefix recorded error descriptions.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connectivity { .. } => "CONNECTIVITY_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Query { .. } => "QUERY_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Transform(_) => "VALIDATION_ERROR",
            AppError::DuplicateKey { .. } => "DUPLICATE_KEY",
            AppError::InvalidPhaseTransition { .. } => "INVALID_PHASE_TRANSITION",
            AppError::RunInProgress { .. } => "RUN_IN_PROGRESS",
            AppError::SourceDecommissioned(_) => "SOURCE_DECOMMISSIONED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures that a retry against the same store might fix.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            AppError::Connectivity { .. } | AppError::Timeout { .. }
        )
    }

    /// Renders the error the way it is stored in `MigrationResult.errors`.
    pub fn describe(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}
