//! Procedural macros for generating table metadata for stored entities
//!
//! This crate provides the `#[entity]` macro and `TableMetadata` derive for
//! automatic generation of the `Entity` and `TableMetadata` implementations
//! the generic store works through.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod codegen;
mod model_macro;
mod parsing;

use codegen::{generate_entity_impl, generate_table_metadata_impl};
use model_macro::entity_attribute;
use parsing::{parse_field_attributes, parse_table_attributes};

/// Derive macro for the `Entity` and `TableMetadata` traits
///
/// Note: It's recommended to use the `#[entity]` attribute macro instead,
/// which adds this derive along with the `sqlx` field hints.
///
/// Manual usage:
/// ```rust,ignore
/// #[derive(Debug, Clone, sqlx::FromRow, TableMetadata)]
/// #[table(name = "contacts")]
/// #[relations(company)]
/// pub struct Contact {
///     #[model]
///     #[sqlx(flatten)]
///     pub model: Model,
///
///     #[field(create, update)]
///     pub email: String,
///
///     #[field(create)]
///     pub company_id: Option<i64>,
///
///     #[sqlx(skip)]
///     pub company: Option<Company>,
/// }
/// ```
///
/// Column fields must be `Clone`, `serde::Serialize` and encodable by sqlx.
#[proc_macro_derive(TableMetadata, attributes(table, relations, model, field))]
pub fn derive_table_metadata(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;

    let table_info = match parse_table_attributes(&input.attrs) {
        Ok(attrs) => attrs,
        Err(e) => return e.to_compile_error().into(),
    };

    let field_info = match parse_field_attributes(&input.data) {
        Ok(info) => info,
        Err(e) => return e.to_compile_error().into(),
    };

    let entity_impl = generate_entity_impl(name, &field_info);
    let table_metadata_impl = generate_table_metadata_impl(name, &table_info, &field_info);

    let expanded = quote::quote! {
        #entity_impl
        #table_metadata_impl
    };

    TokenStream::from(expanded)
}

/// Convenience attribute macro that adds all necessary derives for a stored entity
///
/// Usage:
/// ```rust,ignore
/// use table_derive::entity;
///
/// #[entity]
/// #[table(name = "contacts")]
/// pub struct Contact {
///     #[model]
///     pub model: Model,
///     #[field(create, update)]
///     pub email: String,
/// }
/// ```
#[proc_macro_attribute]
pub fn entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity_attribute(attr, item)
}
