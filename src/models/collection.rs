//! Target collections and the source tables that feed them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed target collections, in migration order.
///
/// Products reference brands and categories, so the order is significant:
/// Brands → Categories → Products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Brands,
    Categories,
    Products,
}

impl Collection {
    /// Returns all collections in migration order.
    pub fn all() -> &'static [Collection] {
        &[
            Collection::Brands,
            Collection::Categories,
            Collection::Products,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Brands => "brands",
            Collection::Categories => "categories",
            Collection::Products => "products",
        }
    }

    /// Collections that must be migrated before this one.
    pub fn dependencies(&self) -> &'static [Collection] {
        match self {
            Collection::Brands | Collection::Categories => &[],
            Collection::Products => &[Collection::Brands, Collection::Categories],
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "brands" | "brand" => Ok(Collection::Brands),
            "categories" | "category" => Ok(Collection::Categories),
            "products" | "product" => Ok(Collection::Products),
            _ => Err(format!(
                "Invalid collection '{}'. Valid values: brands, categories, products",
                s
            )),
        }
    }
}

/// Relational tables readable through the source reader.
///
/// `Stores` has no target collection; store ids are the owners of products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Products,
    Stores,
    Brands,
    Categories,
}

impl SourceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTable::Products => "products",
            SourceTable::Stores => "stores",
            SourceTable::Brands => "brands",
            SourceTable::Categories => "categories",
        }
    }
}

impl std::fmt::Display for SourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_products_depend_on_references() {
        let deps = Collection::Products.dependencies();
        assert!(deps.contains(&Collection::Brands));
        assert!(deps.contains(&Collection::Categories));
        assert!(Collection::Brands.dependencies().is_empty());
    }

    #[test]
    fn test_all_is_dependency_ordered() {
        let order = Collection::all();
        for (idx, collection) in order.iter().enumerate() {
            for dep in collection.dependencies() {
                let dep_idx = order.iter().position(|c| c == dep).unwrap();
                assert!(dep_idx < idx);
            }
        }
    }

    #[test]
    fn test_parse_collection() {
        assert_eq!("Products".parse::<Collection>(), Ok(Collection::Products));
        assert_eq!("brand".parse::<Collection>(), Ok(Collection::Brands));
        assert!("stores".parse::<Collection>().is_err());
    }
}
