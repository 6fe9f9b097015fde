//! Implementation of #[derive(Context)] proc-macro.

use std::collections::HashMap;

use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, Data, DeriveInput, Fields};

pub fn derive_context_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &input,
                    "Context can only be derived for structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(&input, "Context can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    // Token text is a good enough identity; aliases are not resolved here,
    // the compiler reports those as conflicting impls
    let mut seen: HashMap<String, &syn::Ident> = HashMap::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let key = field.ty.to_token_stream().to_string();
        if let Some(previous) = seen.insert(key, ident) {
            return syn::Error::new_spanned(
                &field.ty,
                format!(
                    "fields `{}` and `{}` have the same type; FromRef would be ambiguous",
                    previous, ident
                ),
            )
            .to_compile_error()
            .into();
        }
    }

    let impls = fields.iter().filter_map(|field| {
        let field_name = field.ident.as_ref()?;
        let field_type = &field.ty;

        Some(quote! {
            impl #impl_generics crate::FromRef<#name #ty_generics> for #field_type #where_clause {
                fn from_ref(ctx: &#name #ty_generics) -> Self {
                    ctx.#field_name.clone()
                }
            }
        })
    });

    TokenStream::from(quote! {
        #(#impls)*
    })
}
