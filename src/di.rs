//! Dependency injection infrastructure.
//!
//! Compile-time dependency injection using the `FromRef` trait and derive
//! macros from `di-macros`.
//!
//! - `FromRef<T>`: Trait for extracting a value from a reference to `T`
//! - `#[derive(Context)]`: Makes each field of a struct extractable via `FromRef`
//! - `#[derive(FromContext)]`: Generates `FromRef` impl by resolving each field
//!
//! # Example
//!
//! ```ignore
//! use crate::di::FromRef;
//! use crate::services::ProductMigrator;
//!
//! let ctx = Context::new(source, target, phase_store, history, runs, config).await?;
//! let products = ProductMigrator::from_ref(&ctx);
//! let result = products.migrate().await;
//! ```

/// Trait for extracting a value from a reference to another type.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

/// Any Clone type can be extracted from itself.
impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

pub use di_macros::{Context, FromContext};
