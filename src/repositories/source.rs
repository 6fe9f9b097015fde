//! Read-only access to the relational source system.

use async_trait::async_trait;

use crate::db::postgres::PostgresClient;
use crate::db::{fetch_all, Row, SqlValue};
use crate::error::AppError;
use crate::models::{SourceRecord, SourceTable};

/// Paginated, read-only access to source tables.
///
/// Pages are ordered by primary key; pass the last id of the previous page
/// as `after_id` to continue. A page shorter than `limit` is the last one.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch_page(
        &self,
        table: SourceTable,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, AppError>;

    /// Checks that the source answers at all.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Source reader over the legacy PostgreSQL catalog.
#[derive(Clone)]
pub struct PostgresSourceReader {
    client: PostgresClient,
}

impl PostgresSourceReader {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Projection of each table onto [`SourceRecord`] columns.
    ///
    /// Columns a table lacks are simply not selected and read back as `None`.
    fn select_sql(table: SourceTable) -> &'static str {
        match table {
            SourceTable::Products => {
                "SELECT id::bigint AS id, frame_id AS natural_key, store_id::bigint AS owner_id,
                        name, description, price::float8 AS price, stock::bigint AS stock,
                        featured, active, brand_id::bigint AS brand_id,
                        category_id::bigint AS category_id, created_at, updated_at
                 FROM products WHERE id > $1::bigint ORDER BY id LIMIT $2::bigint"
            }
            SourceTable::Stores => {
                "SELECT id::bigint AS id, code AS natural_key, name, active, created_at, updated_at
                 FROM stores WHERE id > $1::bigint ORDER BY id LIMIT $2::bigint"
            }
            SourceTable::Brands => {
                "SELECT id::bigint AS id, code AS natural_key, name, description, featured,
                        active, created_at, updated_at
                 FROM brands WHERE id > $1::bigint ORDER BY id LIMIT $2::bigint"
            }
            SourceTable::Categories => {
                "SELECT id::bigint AS id, slug AS natural_key, name, description,
                        parent_id::bigint AS parent_id, active, created_at, updated_at
                 FROM categories WHERE id > $1::bigint ORDER BY id LIMIT $2::bigint"
            }
        }
    }

    fn row_to_record(row: &Row) -> Result<SourceRecord, AppError> {
        Ok(SourceRecord {
            id: row.get("id")?,
            natural_key: row.get_opt("natural_key")?,
            owner_id: row.get_opt("owner_id")?,
            name: row.get_opt("name")?,
            description: row.get_opt("description")?,
            price: row.get_opt("price")?,
            stock: row.get_opt("stock")?,
            featured: row.get_opt("featured")?,
            active: row.get_opt("active")?,
            brand_id: row.get_opt("brand_id")?,
            category_id: row.get_opt("category_id")?,
            parent_id: row.get_opt("parent_id")?,
            created_at: row.get_opt("created_at")?,
            updated_at: row.get_opt("updated_at")?,
        })
    }
}

#[async_trait]
impl SourceReader for PostgresSourceReader {
    async fn fetch_page(
        &self,
        table: SourceTable,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, AppError> {
        let rows = fetch_all(
            &self.client,
            Self::select_sql(table),
            vec![
                SqlValue::Int(after_id.unwrap_or(i64::MIN)),
                SqlValue::Int(limit as i64),
            ],
        )
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_row_to_record_tolerates_missing_columns() {
        let mut data = HashMap::new();
        data.insert("id".to_string(), json!(7));
        data.insert("natural_key".to_string(), json!("FR-7"));
        data.insert("price".to_string(), serde_json::Value::Null);

        let record = PostgresSourceReader::row_to_record(&Row::new(data)).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.natural_key.as_deref(), Some("FR-7"));
        assert_eq!(record.price, None);
        assert_eq!(record.parent_id, None);
    }

    #[test]
    fn test_every_table_is_keyset_paginated() {
        for table in [
            SourceTable::Products,
            SourceTable::Stores,
            SourceTable::Brands,
            SourceTable::Categories,
        ] {
            let sql = PostgresSourceReader::select_sql(table);
            assert!(sql.contains("id > $1::bigint ORDER BY id LIMIT $2::bigint"));
        }
    }
}
