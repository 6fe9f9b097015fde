//! SQL abstraction layer for backend-agnostic database access.
//!
//! - [`SqlExecutor`] - Execute statements and queries
//! - [`Transaction`] - Transaction lifecycle (commit/rollback)
//! - [`DbClient`] - Connection management and transaction creation
//!
//! [`postgres`] is the only backend; repositories are written against the
//! traits so the schema bootstrap runner stays backend-agnostic.

mod row;
mod traits;

pub mod postgres;

pub use row::{Row, RowStream, SqlParams, SqlValue};
pub use traits::{DbClient, SqlExecutor, Transaction};

use futures::TryStreamExt;

use crate::error::AppError;

/// Runs a query and collects every row.
pub async fn fetch_all<E: SqlExecutor + ?Sized>(
    executor: &E,
    sql: &str,
    params: SqlParams,
) -> Result<Vec<Row>, AppError> {
    executor.query_sql(sql, params).await?.try_collect().await
}

/// Runs a query and returns the first row, if any.
pub async fn fetch_one<E: SqlExecutor + ?Sized>(
    executor: &E,
    sql: &str,
    params: SqlParams,
) -> Result<Option<Row>, AppError> {
    executor.query_sql(sql, params).await?.try_next().await
}
