//! Core traits for SQL database abstraction.
//!
//! - [`SqlExecutor`] - Execute statements and queries with positional parameters
//! - [`Transaction`] - Transaction lifecycle management
//! - [`DbClient`] - Connection pool and transaction creation

use async_trait::async_trait;

use crate::db::row::{RowStream, SqlParams};
use crate::error::AppError;

/// Executes SQL against a database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes one or more statements without parameters or results.
    ///
    /// Use this for DDL (CREATE TABLE, CREATE INDEX).
    async fn execute_sql(&self, sql: &str) -> Result<(), AppError>;

    /// Executes a parameterized statement and returns the affected row count.
    async fn execute_params(&self, sql: &str, params: SqlParams) -> Result<u64, AppError>;

    /// Executes a parameterized query and returns a stream of result rows.
    async fn query_sql(&self, sql: &str, params: SqlParams) -> Result<RowStream<'_>, AppError>;
}

/// Transaction lifecycle management.
///
/// Separate from [`SqlExecutor`] so that pooled clients (auto-commit) and
/// explicit transactions share the same query surface.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits the transaction, making all changes permanent.
    ///
    /// Consumes the transaction - it cannot be used after commit.
    async fn commit(self) -> Result<(), AppError>;

    /// Rolls back the transaction, discarding all changes.
    ///
    /// Consumes the transaction - it cannot be used after rollback.
    async fn rollback(self) -> Result<(), AppError>;
}

/// A database client that can begin transactions.
///
/// Implementations typically wrap a connection pool and provide auto-commit
/// queries via the executor methods, plus explicit transactions via
/// [`begin`](DbClient::begin).
#[async_trait]
pub trait DbClient: SqlExecutor {
    /// The transaction type returned by this client.
    type Tx<'a>: Transaction + SqlExecutor
    where
        Self: 'a;

    /// Begins a new transaction.
    ///
    /// ```ignore
    /// let txn = client.begin().await?;
    /// txn.execute_params("DELETE FROM documents WHERE key = $1", vec!["a".into()]).await?;
    /// txn.commit().await?;
    /// ```
    async fn begin(&self) -> Result<Self::Tx<'_>, AppError>;
}
