//! Derive macro for the `GcTraceable` trait of `object-bridge`.
//!
//! ```ignore
//! use object_bridge::DeriveGcTraceable;
//!
//! #[derive(DeriveGcTraceable)]
//! struct Attachment {
//!     #[gc(track)]
//!     body: Vec<u8>,
//!     #[gc(track)]
//!     mime: String,
//!     // Fields without #[gc(track)] are not counted
//!     id: u64,
//! }
//! ```
//!
//! Enums are supported; each variant sums its own tracked fields.
//!
//! Inside `object-bridge` itself, use `#[gc(crate_path = "crate")]`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, parse_macro_input};

/// Derive `GcTraceable`.
///
/// # Attributes
///
/// - `#[gc(track)]` on a field: include it in `external_memory_size()`
/// - `#[gc(crate_path = "path")]` on the type: override the crate path
///   (default: `object_bridge`)
#[proc_macro_derive(GcTraceable, attributes(gc))]
pub fn derive_gc_traceable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let crate_path = crate_path(&input.attrs)?;

    let body = match &input.data {
        Data::Struct(data) => {
            let (pattern, sizes) = destructure(&data.fields, &crate_path)?;
            quote! {
                let #name #pattern = self;
                0 #(+ #sizes)*
            }
        }
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let (pattern, sizes) = destructure(&variant.fields, &crate_path)?;
                    Ok(quote! { #name::#ident #pattern => 0 #(+ #sizes)* })
                })
                .collect::<syn::Result<Vec<_>>>()?;

            if arms.is_empty() {
                quote! { match *self {} }
            } else {
                quote! {
                    match self {
                        #(#arms,)*
                    }
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "GcTraceable cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics #crate_path::GcTraceable for #name #ty_generics #where_clause {
            fn external_memory_size(&self) -> usize {
                #body
            }
        }
    })
}

/// `#[gc(crate_path = "...")]` on the type, or the default path.
fn crate_path(attrs: &[Attribute]) -> syn::Result<TokenStream2> {
    let mut path = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("gc")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate_path") {
                let value: syn::LitStr = meta.value()?.parse()?;
                let parsed: syn::Path = value.parse()?;
                path = Some(quote! { #parsed });
                Ok(())
            } else {
                Err(meta.error("expected `crate_path = \"...\"`"))
            }
        })?;
    }

    Ok(path.unwrap_or_else(|| quote! { ::object_bridge }))
}

/// Pattern binding every field, plus the size expression of each tracked one.
fn destructure(
    fields: &Fields,
    crate_path: &TokenStream2,
) -> syn::Result<(TokenStream2, Vec<TokenStream2>)> {
    let mut sizes = Vec::new();

    let pattern = match fields {
        Fields::Named(named) => {
            let mut bindings = Vec::new();
            for field in &named.named {
                let ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| syn::Error::new_spanned(field, "unnamed field"))?;
                if is_tracked(&field.attrs)? {
                    sizes.push(quote! { #crate_path::GcTraceable::external_memory_size(#ident) });
                    bindings.push(quote! { #ident });
                } else {
                    bindings.push(quote! { #ident: _ });
                }
            }
            quote! { { #(#bindings),* } }
        }
        Fields::Unnamed(unnamed) => {
            let mut bindings = Vec::new();
            for (index, field) in unnamed.unnamed.iter().enumerate() {
                if is_tracked(&field.attrs)? {
                    let binding = format_ident!("field_{}", index, span = Span::call_site());
                    sizes.push(quote! { #crate_path::GcTraceable::external_memory_size(#binding) });
                    bindings.push(quote! { #binding });
                } else {
                    bindings.push(quote! { _ });
                }
            }
            quote! { ( #(#bindings),* ) }
        }
        Fields::Unit => TokenStream2::new(),
    };

    Ok((pattern, sizes))
}

fn is_tracked(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut tracked = false;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("gc")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("track") {
                tracked = true;
                Ok(())
            } else {
                Err(meta.error("expected `track`"))
            }
        })?;
    }

    Ok(tracked)
}
