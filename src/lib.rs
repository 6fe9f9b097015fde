//! catalog-migrate - phased catalog migration engine
//!
//! Moves product-catalog data from a relational source into a document
//! store while live traffic continues, under an audited cutover phase.

pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod di;
pub mod error;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
