//! Relational source records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row read from one of the source tables.
///
/// Every table is projected onto this shape; columns a table does not have
/// are `None`. Only the primary key is guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source primary key.
    pub id: i64,
    /// Business identifier: frame id / SKU for products, code for brands,
    /// slug for categories.
    pub natural_key: Option<String>,
    /// Owning store.
    pub owner_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub featured: Option<bool>,
    pub active: Option<bool>,
    /// Product → brand (source id).
    pub brand_id: Option<i64>,
    /// Product → category (source id).
    pub category_id: Option<i64>,
    /// Category → parent category (source id).
    pub parent_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceRecord {
    /// Minimal record with only the primary key set.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// The natural key with surrounding whitespace removed, if non-empty.
    pub fn trimmed_key(&self) -> Option<&str> {
        self.natural_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
