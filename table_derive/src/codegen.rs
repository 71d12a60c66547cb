//! Code generation for the `Entity` and `TableMetadata` implementations
//!
//! Generated code refers to `::store_object` paths, so crates deriving
//! `TableMetadata` depend on `store-object` directly.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Ident, Type};

use crate::parsing::{FieldInfo, TableInfo};

pub fn generate_entity_impl(name: &Ident, field_info: &FieldInfo) -> TokenStream {
    let model_field = &field_info.model_field;

    quote! {
        impl ::store_object::model::Entity for #name {
            fn model(&self) -> &::store_object::model::Model {
                &self.#model_field
            }

            fn model_mut(&mut self) -> &mut ::store_object::model::Model {
                &mut self.#model_field
            }
        }
    }
}

pub fn generate_table_metadata_impl(
    name: &Ident,
    table_info: &TableInfo,
    field_info: &FieldInfo,
) -> TokenStream {
    let table_name = &table_info.name;
    let relations = &table_info.relations;

    let create_names: Vec<&str> = field_info.create_columns().map(|c| c.name.as_str()).collect();
    let create_idents: Vec<&Ident> = field_info.create_columns().map(|c| &c.ident).collect();
    let update_names: Vec<&str> = field_info.update_columns().map(|c| c.name.as_str()).collect();
    let update_idents: Vec<&Ident> = field_info.update_columns().map(|c| &c.ident).collect();

    let column_names: Vec<&str> = field_info.columns.iter().map(|c| c.name.as_str()).collect();
    let column_idents: Vec<&Ident> = field_info.columns.iter().map(|c| &c.ident).collect();
    let column_types: Vec<&Type> = field_info.columns.iter().map(|c| &c.ty).collect();

    quote! {
        impl ::store_object::traits::TableMetadata for #name {
            fn table_name() -> &'static str {
                #table_name
            }

            fn create_fields() -> &'static [&'static str] {
                &[#(#create_names),*]
            }

            fn update_fields() -> &'static [&'static str] {
                &[#(#update_names),*]
            }

            fn relations() -> &'static [&'static str] {
                &[#(#relations),*]
            }

            fn bind_create_params(
                &self,
                args: &mut ::store_object::sqlx::postgres::PgArguments,
            ) -> ::std::result::Result<(), ::store_object::sqlx::error::BoxDynError> {
                use ::store_object::sqlx::Arguments as _;
                #(args.add(::std::clone::Clone::clone(&self.#create_idents))?;)*
                ::std::result::Result::Ok(())
            }

            fn bind_update_params(
                &self,
                args: &mut ::store_object::sqlx::postgres::PgArguments,
            ) -> ::std::result::Result<(), ::store_object::sqlx::error::BoxDynError> {
                use ::store_object::sqlx::Arguments as _;
                #(args.add(::std::clone::Clone::clone(&self.#update_idents))?;)*
                ::std::result::Result::Ok(())
            }

            fn column_value(&self, column: &str) -> ::std::option::Option<::store_object::serde_json::Value> {
                match column {
                    #(#column_names => ::store_object::serde_json::to_value(&self.#column_idents).ok(),)*
                    other => ::store_object::traits::table_metadata::base_column_value(self, other),
                }
            }

            fn column_type(column: &str) -> ::std::option::Option<::store_object::sqlx::postgres::PgTypeInfo> {
                match column {
                    #(#column_names => ::std::option::Option::Some(
                        <#column_types as ::store_object::sqlx::Type<::store_object::sqlx::Postgres>>::type_info()
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    }
}
