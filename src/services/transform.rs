//! Mapping of source records onto target documents.
//!
//! Every function here is pure: the same inputs always produce the same
//! document, which is what makes repeated migration runs write nothing.

use std::collections::HashMap;

use crate::error::TransformError;
use crate::models::{
    BrandDocument, CategoryDocument, ProductDocument, SourceMetadata, SourceRecord, SourceTable,
    MIGRATION_SOURCE_TAG,
};

/// Source id → document key of an already-migrated reference collection.
pub type ReferenceIndex = HashMap<i64, String>;

pub const DEFAULT_PRICE: f64 = 99.99;
pub const DEFAULT_STOCK: i64 = 0;
pub const DEFAULT_FEATURED: bool = false;
pub const DEFAULT_ACTIVE: bool = true;

/// Natural key, or `<prefix>-<id>` when the record has none.
///
/// Fails only when there is neither a key nor a usable source id.
fn resolve_key(record: &SourceRecord, prefix: &str) -> Result<String, TransformError> {
    if let Some(key) = record.trimmed_key() {
        return Ok(key.to_string());
    }
    if record.id > 0 {
        return Ok(format!("{}-{}", prefix, record.id));
    }
    Err(TransformError::MissingIdentity {
        source_id: record.id,
    })
}

fn resolve_name(record: &SourceRecord, key: &str) -> String {
    record
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(key)
        .to_string()
}

fn metadata(table: SourceTable, record: &SourceRecord) -> SourceMetadata {
    SourceMetadata {
        source_table: table.as_str().to_string(),
        source_id: record.id,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn resolve_reference(index: &ReferenceIndex, id: Option<i64>, default: &str) -> String {
    id.and_then(|id| index.get(&id))
        .map(String::as_str)
        .unwrap_or(default)
        .to_string()
}

pub fn transform_product(
    record: &SourceRecord,
    brands: &ReferenceIndex,
    categories: &ReferenceIndex,
    default_brand: &str,
    default_category: &str,
) -> Result<ProductDocument, TransformError> {
    let sku = resolve_key(record, "PROD")?;

    Ok(ProductDocument {
        name: resolve_name(record, &sku),
        description: record.description.clone(),
        brand_id: resolve_reference(brands, record.brand_id, default_brand),
        category_id: resolve_reference(categories, record.category_id, default_category),
        // NaN and infinities cannot be stored in a JSON document
        price: record
            .price
            .filter(|p| p.is_finite())
            .unwrap_or(DEFAULT_PRICE),
        inventory_quantity: record
            .stock
            .filter(|s| *s >= 0)
            .unwrap_or(DEFAULT_STOCK),
        active: record.active.unwrap_or(DEFAULT_ACTIVE),
        featured: record.featured.unwrap_or(DEFAULT_FEATURED),
        store_id: record.owner_id,
        source: MIGRATION_SOURCE_TAG.to_string(),
        source_metadata: metadata(SourceTable::Products, record),
        sku,
    })
}

pub fn transform_brand(record: &SourceRecord) -> Result<BrandDocument, TransformError> {
    let code = resolve_key(record, "BRAND")?;

    Ok(BrandDocument {
        name: resolve_name(record, &code),
        description: record.description.clone(),
        active: record.active.unwrap_or(DEFAULT_ACTIVE),
        featured: record.featured.unwrap_or(DEFAULT_FEATURED),
        source: MIGRATION_SOURCE_TAG.to_string(),
        source_metadata: metadata(SourceTable::Brands, record),
        code,
    })
}

/// Source id of the category's parent, or `None` for a root.
///
/// Legacy rows use `0` as well as NULL for "no parent".
pub fn parent_source_id(record: &SourceRecord) -> Option<i64> {
    record.parent_id.filter(|p| *p != 0)
}

/// Maps a category, placing it one level below `parent`.
///
/// `parent` must be the already-transformed parent document when the record
/// has one; a child without its parent is rejected.
pub fn transform_category(
    record: &SourceRecord,
    parent: Option<&CategoryDocument>,
) -> Result<CategoryDocument, TransformError> {
    let slug = resolve_key(record, "CAT")?;

    let (parent_id, level) = match (parent_source_id(record), parent) {
        (None, _) => (None, 0),
        (Some(_), Some(parent)) => (Some(parent.slug.clone()), parent.level + 1),
        (Some(parent_id), None) => {
            return Err(TransformError::UnresolvedParent {
                source_id: record.id,
                parent_id,
            })
        }
    };

    Ok(CategoryDocument {
        name: resolve_name(record, &slug),
        description: record.description.clone(),
        parent_id,
        level,
        active: record.active.unwrap_or(DEFAULT_ACTIVE),
        source: MIGRATION_SOURCE_TAG.to_string(),
        source_metadata: metadata(SourceTable::Categories, record),
        slug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(id: i64) -> SourceRecord {
        SourceRecord::new(id)
    }

    #[test]
    fn test_product_defaults() {
        let doc =
            transform_product(&bare(42), &HashMap::new(), &HashMap::new(), "unbranded", "misc")
                .unwrap();

        assert_eq!(doc.sku, "PROD-42");
        assert_eq!(doc.name, "PROD-42");
        assert_eq!(doc.price, 99.99);
        assert_eq!(doc.inventory_quantity, 0);
        assert!(!doc.featured);
        assert!(doc.active);
        assert_eq!(doc.brand_id, "unbranded");
        assert_eq!(doc.category_id, "misc");
        assert_eq!(doc.source, "migration");
        assert_eq!(doc.source_metadata.source_id, 42);
    }

    #[test]
    fn test_negative_stock_defaults_to_zero() {
        let record = SourceRecord {
            stock: Some(-5),
            ..bare(1)
        };
        let doc = transform_product(&record, &HashMap::new(), &HashMap::new(), "b", "c").unwrap();
        assert_eq!(doc.inventory_quantity, 0);
    }

    #[test]
    fn test_resolved_references() {
        let brands = HashMap::from([(7, "rayban".to_string())]);
        let categories = HashMap::from([(3, "sunglasses".to_string())]);
        let record = SourceRecord {
            natural_key: Some(" FR-9 ".to_string()),
            brand_id: Some(7),
            category_id: Some(99),
            ..bare(9)
        };

        let doc = transform_product(&record, &brands, &categories, "unbranded", "misc").unwrap();
        assert_eq!(doc.sku, "FR-9");
        assert_eq!(doc.brand_id, "rayban");
        assert_eq!(doc.category_id, "misc");
    }

    #[test]
    fn test_transform_is_deterministic() {
        let record = SourceRecord {
            natural_key: Some("FR-1".to_string()),
            price: Some(150.0),
            ..bare(1)
        };
        let first = transform_product(&record, &HashMap::new(), &HashMap::new(), "b", "c").unwrap();
        let second = transform_product(&record, &HashMap::new(), &HashMap::new(), "b", "c").unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_missing_identity_fails() {
        let err = transform_product(&bare(0), &HashMap::new(), &HashMap::new(), "b", "c")
            .unwrap_err();
        assert_eq!(err, TransformError::MissingIdentity { source_id: 0 });
        assert!(transform_brand(&bare(-1)).is_err());
    }

    #[test]
    fn test_category_levels() {
        let root = transform_category(&bare(1), None).unwrap();
        assert_eq!(root.level, 0);
        assert!(root.parent_id.is_none());

        let child_record = SourceRecord {
            natural_key: Some("frames".to_string()),
            parent_id: Some(1),
            ..bare(2)
        };
        let child = transform_category(&child_record, Some(&root)).unwrap();
        assert_eq!(child.level, 1);
        assert_eq!(child.parent_id.as_deref(), Some("CAT-1"));
    }

    #[test]
    fn test_orphan_category_rejected() {
        let record = SourceRecord {
            parent_id: Some(50),
            ..bare(2)
        };
        assert_eq!(
            transform_category(&record, None).unwrap_err(),
            TransformError::UnresolvedParent {
                source_id: 2,
                parent_id: 50
            }
        );
    }

    #[test]
    fn test_zero_parent_is_root() {
        let record = SourceRecord {
            parent_id: Some(0),
            ..bare(2)
        };
        assert_eq!(transform_category(&record, None).unwrap().level, 0);
    }
}
