//! Compile-time dependency injection macros for catalog-migrate.
//!
//! - `#[derive(Context)]` makes each field of a context struct extractable
//! - `#[derive(FromContext)]` builds a service by resolving each field from a context
//!
//! Generated code references `crate::FromRef`, so the consuming crate must
//! re-export its `FromRef` trait at the crate root.

use proc_macro::TokenStream;

mod context;
mod from_context;

/// Derive macro for creating a DI context.
///
/// Generates `impl FromRef<Ctx> for FieldType` for every field, cloning the
/// field out of the context.
///
/// # Requirements
///
/// - All fields must implement `Clone`
/// - Field types must be distinct; two fields of the same type would make
///   extraction ambiguous and are rejected at compile time
///
/// # Example
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub source: Arc<dyn SourceReader>,
///     pub target: Arc<dyn TargetStore>,
///     pub config: Arc<Config>,
/// }
///
/// // Generated implementations:
/// // impl FromRef<Context> for Arc<dyn SourceReader> { ... }
/// // impl FromRef<Context> for Arc<dyn TargetStore> { ... }
/// // impl FromRef<Context> for Arc<Config> { ... }
/// ```
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Derive macro for types that can be constructed from a context.
///
/// Generates a `FromRef<Context>` implementation that resolves each field by
/// calling `FromRef::from_ref` on the context. Fields may themselves be
/// `FromContext` types, so services compose.
///
/// The context type defaults to `Context` (which must be in scope) and can be
/// overridden with `#[from_context(Context = path::To::Ctx)]`; the string form
/// `#[from_context(Context = "Ctx")]` is also accepted.
///
/// # Example
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct BrandMigrator {
///     pipeline: Pipeline,   // resolved via Pipeline::from_ref(ctx)
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}
