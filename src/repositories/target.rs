//! Document-oriented target store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::db::postgres::PostgresClient;
use crate::db::{fetch_all, fetch_one, DbClient, Row, SqlExecutor, SqlValue, Transaction};
use crate::error::AppError;
use crate::models::{Collection, StoredDocument};

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same source record, same body: nothing was written.
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the store was written to.
    pub fn wrote(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Decides what upserting `incoming` over `existing` means.
///
/// A key held by a different source record is a collision and is never
/// overwritten. Every store implementation goes through this function.
pub fn classify_upsert(
    existing: Option<&StoredDocument>,
    incoming: &StoredDocument,
) -> Result<UpsertOutcome, AppError> {
    match existing {
        None => Ok(UpsertOutcome::Inserted),
        Some(current) if current.source_id != incoming.source_id => Err(AppError::DuplicateKey {
            collection: incoming.collection,
            key: incoming.key.clone(),
            existing_source_id: current.source_id,
            incoming_source_id: incoming.source_id,
        }),
        Some(current) if current.body == incoming.body && current.owner_id == incoming.owner_id => {
            Ok(UpsertOutcome::Unchanged)
        }
        Some(_) => Ok(UpsertOutcome::Updated),
    }
}

/// Insert-or-replace-by-key document store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Writes the document unless an identical one is already stored.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the key belongs to a different source record.
    async fn upsert(&self, doc: StoredDocument) -> Result<UpsertOutcome, AppError>;

    async fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, AppError>;

    /// Map of source id → document key for every document in the collection.
    async fn reference_index(&self, collection: Collection)
        -> Result<HashMap<i64, String>, AppError>;

    async fn count(&self, collection: Collection) -> Result<u64, AppError>;

    async fn count_by_owner(&self, collection: Collection, owner_id: i64)
        -> Result<u64, AppError>;
}

/// JSONB-backed document store in PostgreSQL (`documents` table).
#[derive(Clone)]
pub struct PostgresTargetStore {
    client: PostgresClient,
}

impl PostgresTargetStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    fn row_to_document(collection: Collection, row: &Row) -> Result<StoredDocument, AppError> {
        Ok(StoredDocument {
            collection,
            key: row.get("key")?,
            source_id: row.get("source_id")?,
            owner_id: row.get_opt("owner_id")?,
            body: row.get("body")?,
        })
    }

    async fn upsert_in<T: SqlExecutor + ?Sized>(
        txn: &T,
        doc: &StoredDocument,
    ) -> Result<Option<UpsertOutcome>, AppError> {
        let existing = fetch_one(
            txn,
            "SELECT key, source_id, owner_id, body FROM documents
             WHERE collection = $1 AND key = $2 FOR UPDATE",
            vec![doc.collection.as_str().into(), doc.key.as_str().into()],
        )
        .await?
        .map(|row| Self::row_to_document(doc.collection, &row))
        .transpose()?;

        let outcome = classify_upsert(existing.as_ref(), doc)?;
        let params = vec![
            doc.collection.as_str().into(),
            doc.key.as_str().into(),
            SqlValue::Int(doc.source_id),
            SqlValue::from(doc.owner_id),
            SqlValue::Json(doc.body.clone()),
        ];

        match outcome {
            UpsertOutcome::Unchanged => {}
            UpsertOutcome::Inserted => {
                let inserted = txn
                    .execute_params(
                        "INSERT INTO documents (collection, key, source_id, owner_id, body)
                         VALUES ($1, $2, $3, $4, $5)
                         ON CONFLICT (collection, key) DO NOTHING",
                        params,
                    )
                    .await?;
                if inserted == 0 {
                    // Lost a race with a concurrent insert of the same key
                    return Ok(None);
                }
            }
            UpsertOutcome::Updated => {
                txn.execute_params(
                    "UPDATE documents
                     SET source_id = $3, owner_id = $4, body = $5, written_at = NOW()
                     WHERE collection = $1 AND key = $2",
                    params,
                )
                .await?;
            }
        }

        Ok(Some(outcome))
    }
}

#[async_trait]
impl TargetStore for PostgresTargetStore {
    async fn upsert(&self, doc: StoredDocument) -> Result<UpsertOutcome, AppError> {
        // Second attempt re-reads the row inserted by the racing writer
        for _ in 0..2 {
            let txn = self.client.begin().await?;
            match Self::upsert_in(&txn, &doc).await {
                Ok(Some(outcome)) => {
                    txn.commit().await?;
                    return Ok(outcome);
                }
                Ok(None) => txn.rollback().await?,
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }

        Err(AppError::Internal(format!(
            "upsert of {}/{} kept racing a concurrent writer",
            doc.collection, doc.key
        )))
    }

    async fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, AppError> {
        fetch_one(
            &self.client,
            "SELECT key, source_id, owner_id, body FROM documents
             WHERE collection = $1 AND key = $2",
            vec![collection.as_str().into(), key.into()],
        )
        .await?
        .map(|row| Self::row_to_document(collection, &row))
        .transpose()
    }

    async fn reference_index(
        &self,
        collection: Collection,
    ) -> Result<HashMap<i64, String>, AppError> {
        let rows = fetch_all(
            &self.client,
            "SELECT source_id, key FROM documents WHERE collection = $1",
            vec![collection.as_str().into()],
        )
        .await?;

        rows.iter()
            .map(|row| Ok((row.get("source_id")?, row.get("key")?)))
            .collect()
    }

    async fn count(&self, collection: Collection) -> Result<u64, AppError> {
        let row = fetch_one(
            &self.client,
            "SELECT COUNT(*) AS total FROM documents WHERE collection = $1",
            vec![collection.as_str().into()],
        )
        .await?;

        Ok(row.map(|r| r.get::<i64>("total")).transpose()?.unwrap_or(0) as u64)
    }

    async fn count_by_owner(
        &self,
        collection: Collection,
        owner_id: i64,
    ) -> Result<u64, AppError> {
        let row = fetch_one(
            &self.client,
            "SELECT COUNT(*) AS total FROM documents WHERE collection = $1 AND owner_id = $2",
            vec![collection.as_str().into(), SqlValue::Int(owner_id)],
        )
        .await?;

        Ok(row.map(|r| r.get::<i64>("total")).transpose()?.unwrap_or(0) as u64)
    }
}
