//! Target document schemas for the brands, categories and products collections.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::Collection;
use crate::error::AppError;

/// Provenance tag carried by every document written by the engine.
pub const MIGRATION_SOURCE_TAG: &str = "migration";

/// Source id used for the fallback brand and category documents.
pub const FALLBACK_SOURCE_ID: i64 = 0;

/// Audit trail back to the source row, used for rollback and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_table: String,
    pub source_id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceMetadata {
    fn fallback() -> Self {
        Self {
            source_table: "fallback".to_string(),
            source_id: FALLBACK_SOURCE_ID,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandDocument {
    /// Unique brand key (normalized code).
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub featured: bool,
    pub source: String,
    pub source_metadata: SourceMetadata,
}

impl BrandDocument {
    /// Brand assigned to products whose brand cannot be resolved.
    pub fn fallback(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: "Unbranded".to_string(),
            description: None,
            active: true,
            featured: false,
            source: MIGRATION_SOURCE_TAG.to_string(),
            source_metadata: SourceMetadata::fallback(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDocument {
    /// Unique category key (normalized slug).
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Slug of the parent category; `None` for roots.
    pub parent_id: Option<String>,
    /// Depth in the hierarchy; roots are level 0.
    pub level: u32,
    pub active: bool,
    pub source: String,
    pub source_metadata: SourceMetadata,
}

impl CategoryDocument {
    /// Root category assigned to products whose category cannot be resolved.
    pub fn fallback(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: "Uncategorized".to_string(),
            description: None,
            parent_id: None,
            level: 0,
            active: true,
            source: MIGRATION_SOURCE_TAG.to_string(),
            source_metadata: SourceMetadata::fallback(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    /// Unique stock keeping unit; synthesized as `PROD-<id>` when missing.
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub brand_id: String,
    pub category_id: String,
    pub price: f64,
    pub inventory_quantity: i64,
    pub active: bool,
    pub featured: bool,
    pub store_id: Option<i64>,
    pub source: String,
    pub source_metadata: SourceMetadata,
}

/// Typed document that belongs to a fixed collection.
pub trait TargetDocument: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// The natural key the document is upserted by.
    fn key(&self) -> &str;

    fn source_metadata(&self) -> &SourceMetadata;

    fn owner_id(&self) -> Option<i64> {
        None
    }

    /// Erases the type for storage.
    fn to_stored(&self) -> Result<StoredDocument, AppError> {
        Ok(StoredDocument {
            collection: Self::COLLECTION,
            key: self.key().to_string(),
            source_id: self.source_metadata().source_id,
            owner_id: self.owner_id(),
            body: serde_json::to_value(self)?,
        })
    }
}

impl TargetDocument for BrandDocument {
    const COLLECTION: Collection = Collection::Brands;

    fn key(&self) -> &str {
        &self.code
    }

    fn source_metadata(&self) -> &SourceMetadata {
        &self.source_metadata
    }
}

impl TargetDocument for CategoryDocument {
    const COLLECTION: Collection = Collection::Categories;

    fn key(&self) -> &str {
        &self.slug
    }

    fn source_metadata(&self) -> &SourceMetadata {
        &self.source_metadata
    }
}

impl TargetDocument for ProductDocument {
    const COLLECTION: Collection = Collection::Products;

    fn key(&self) -> &str {
        &self.sku
    }

    fn source_metadata(&self) -> &SourceMetadata {
        &self.source_metadata
    }

    fn owner_id(&self) -> Option<i64> {
        self.store_id
    }
}

/// A document as the target store sees it: key, provenance and a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub collection: Collection,
    pub key: String,
    pub source_id: i64,
    pub owner_id: Option<i64>,
    pub body: JsonValue,
}

impl StoredDocument {
    /// Deserializes the body back into its typed form.
    pub fn decode<D: TargetDocument>(&self) -> Result<D, AppError> {
        if self.collection != D::COLLECTION {
            return Err(AppError::Internal(format!(
                "document {} belongs to {}, not {}",
                self.key,
                self.collection,
                D::COLLECTION
            )));
        }
        Ok(serde_json::from_value(self.body.clone())?)
    }
}
