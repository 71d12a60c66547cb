use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Error, Fields};

use crate::parsing::has_attribute;

/// Adds the derives a stored entity needs and the matching `sqlx` field hints
///
/// The `#[model]` field gets `#[sqlx(flatten)]`; fields that are neither
/// `#[model]` nor `#[field]` get `#[sqlx(skip)]`. Fields that already carry a
/// `#[sqlx(...)]` attribute are left alone.
pub fn entity_attribute(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as DeriveInput);

    let fields = match &mut input.data {
        Data::Struct(data) => match &mut data.fields {
            Fields::Named(named) => &mut named.named,
            _ => {
                return Error::new_spanned(&input.ident, "entity requires named fields")
                    .to_compile_error()
                    .into()
            }
        },
        _ => {
            return Error::new_spanned(&input.ident, "entity can only be used on structs")
                .to_compile_error()
                .into()
        }
    };

    for field in fields.iter_mut() {
        if has_attribute(&field.attrs, "sqlx") {
            continue;
        }
        if has_attribute(&field.attrs, "model") {
            field.attrs.push(parse_quote!(#[sqlx(flatten)]));
        } else if !has_attribute(&field.attrs, "field") {
            field.attrs.push(parse_quote!(#[sqlx(skip)]));
        }
    }

    let expanded = quote! {
        #[derive(Debug, Clone, ::sqlx::FromRow, ::table_derive::TableMetadata)]
        #input
    };

    TokenStream::from(expanded)
}
