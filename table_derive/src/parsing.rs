//! Parsing utilities for table and field attributes
//!
//! This module handles the parsing of `#[table]`, `#[relations]`, `#[model]`
//! and `#[field]` attributes and validation of table and column names.

use syn::{
    parse::Parse, parse::ParseStream, Attribute, Data, Error, Fields, Ident, Meta, Result, Token,
    Type,
};

/// Columns every table carries; entities get them through their `#[model]` field
const BASE_COLUMNS: [&str; 4] = ["id", "external_id", "created_at", "updated_at"];

/// Validate table name and return syn::Error for better proc macro error handling
pub fn validate_table_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    validate_identifier(name)
        .map_err(|e| Error::new(span, format!("Invalid table name '{}': {}", name, e)))
}

/// Validate column name and return syn::Error for better proc macro error handling
pub fn validate_field_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    if BASE_COLUMNS.contains(&name) {
        return Err(Error::new(
            span,
            format!(
                "Invalid field name '{}': the column is managed by the store through #[model]",
                name
            ),
        ));
    }

    validate_identifier(name)
        .map_err(|e| Error::new(span, format!("Invalid field name '{}': {}", name, e)))
}

/// Validate relation name and return syn::Error for better proc macro error handling
pub fn validate_relation_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    validate_identifier(name)
        .map_err(|e| Error::new(span, format!("Invalid relation name '{}': {}", name, e)))
}

fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".to_string());
    }

    // PostgreSQL identifier limit
    if name.len() > 63 {
        return Err(format!(
            "Name '{}' is too long: {} characters (max 63)",
            name,
            name.len()
        ));
    }

    let first_char = name
        .chars()
        .next()
        .ok_or_else(|| "Name cannot be empty".to_string())?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(format!(
            "Name '{}' must start with a letter or underscore",
            name
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("Name '{}' contains invalid characters: only alphanumeric characters and underscores are allowed", name));
    }

    if is_reserved_keyword(name) {
        return Err(format!("Name '{}' is a reserved SQL keyword", name));
    }

    Ok(())
}

/// Check if a name is a reserved SQL keyword
fn is_reserved_keyword(name: &str) -> bool {
    const RESERVED_KEYWORDS: &[&str] = &[
        "ALL", "ALTER", "AND", "ANY", "ARRAY", "AS", "ASC", "BETWEEN", "BOTH", "BY", "CASE",
        "CAST", "CHECK", "COLUMN", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC",
        "DISTINCT", "DO", "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR",
        "FOREIGN", "FROM", "FULL", "GRANT", "GROUP", "HAVING", "IN", "INNER", "INSERT",
        "INTERSECT", "INTO", "IS", "JOIN", "LEADING", "LEFT", "LIKE", "ILIKE", "LIMIT", "NOT",
        "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RETURNING",
        "RIGHT", "SELECT", "SET", "SOME", "TABLE", "THEN", "TO", "TRUE", "UNION", "UNIQUE",
        "UPDATE", "USER", "USING", "VALUES", "WHEN", "WHERE", "WITH",
    ];

    RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str())
}

#[derive(Debug)]
struct FieldOperations {
    operations: Vec<Ident>,
}

impl Parse for FieldOperations {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut operations = Vec::new();

        while !input.is_empty() {
            let op: Ident = input.parse()?;
            operations.push(op);

            if input.peek(Token![,]) {
                let _: Token![,] = input.parse()?;
            }
        }

        Ok(FieldOperations { operations })
    }
}

#[derive(Debug)]
pub struct TableInfo {
    pub name: String,
    pub relations: Vec<String>,
}

/// One entity column declared with `#[field(...)]`
pub struct Column {
    pub ident: Ident,
    pub ty: Type,
    pub name: String,
    pub create: bool,
    pub update: bool,
}

pub struct FieldInfo {
    pub model_field: Ident,
    pub columns: Vec<Column>,
}

impl FieldInfo {
    pub fn create_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.create)
    }

    pub fn update_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.update)
    }
}

pub fn parse_table_attributes(attrs: &[Attribute]) -> Result<TableInfo> {
    let mut table_name = None;
    let mut relations = Vec::new();

    for attr in attrs {
        if attr.path().is_ident("table") {
            if let Meta::List(meta_list) = &attr.meta {
                let mut tokens = meta_list.tokens.clone().into_iter().peekable();

                while let Some(token) = tokens.next() {
                    if let proc_macro2::TokenTree::Ident(key) = token {
                        // Expect '=' after key
                        if let Some(proc_macro2::TokenTree::Punct(punct)) = tokens.peek() {
                            if punct.as_char() == '=' {
                                tokens.next();

                                if let Some(proc_macro2::TokenTree::Literal(lit)) = tokens.next() {
                                    let value = lit.to_string().trim_matches('"').to_string();
                                    if key == "name" {
                                        table_name = Some(value);
                                    }
                                }
                            }
                        }

                        if let Some(proc_macro2::TokenTree::Punct(punct)) = tokens.peek() {
                            if punct.as_char() == ',' {
                                tokens.next();
                            }
                        }
                    }
                }
            }
        } else if attr.path().is_ident("relations") {
            if let Meta::List(meta_list) = &attr.meta {
                for relation in parse_field_list(&meta_list.tokens)? {
                    validate_relation_name_syn(&relation, proc_macro2::Span::call_site())?;
                    if !relations.contains(&relation) {
                        relations.push(relation);
                    }
                }
            }
        }
    }

    let table_name = table_name.ok_or_else(|| {
        Error::new(
            proc_macro2::Span::call_site(),
            "table attribute is required: add #[table(name = \"table_name\")] to your struct",
        )
    })?;

    validate_table_name_syn(&table_name, proc_macro2::Span::call_site())?;

    Ok(TableInfo {
        name: table_name,
        relations,
    })
}

/// Parse a list of names from tokens like (owner, company)
fn parse_field_list(tokens: &proc_macro2::TokenStream) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut tokens_iter = tokens.clone().into_iter().peekable();

    while let Some(token) = tokens_iter.next() {
        if let proc_macro2::TokenTree::Ident(ident) = token {
            fields.push(ident.to_string());
        }

        if let Some(proc_macro2::TokenTree::Punct(punct)) = tokens_iter.peek() {
            if punct.as_char() == ',' {
                tokens_iter.next();
            }
        }
    }

    if fields.is_empty() {
        return Err(Error::new(
            proc_macro2::Span::call_site(),
            "relations attribute requires at least one relation name",
        ));
    }

    Ok(fields)
}

pub fn parse_field_attributes(data: &Data) -> Result<FieldInfo> {
    if let Data::Struct(data_struct) = data {
        if let Fields::Named(fields_named) = &data_struct.fields {
            let mut model_field = None;
            let mut columns = Vec::new();

            for field in &fields_named.named {
                let field_name = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| Error::new_spanned(field, "Field must have a name"))?;

                if has_attribute(&field.attrs, "model") {
                    if model_field.is_some() {
                        return Err(Error::new(
                            field_name.span(),
                            "only one field can be marked #[model]",
                        ));
                    }
                    model_field = Some(field_name.clone());
                    continue;
                }

                // Fields without #[field] are not columns (e.g. loaded relations)
                let Some(operations) = parse_field_operations(&field.attrs)? else {
                    continue;
                };

                let name = field_name.to_string().trim_start_matches("r#").to_string();
                validate_field_name_syn(&name, field_name.span())?;

                columns.push(Column {
                    ident: field_name.clone(),
                    ty: field.ty.clone(),
                    name,
                    create: operations.iter().any(|op| op == "create"),
                    update: operations.iter().any(|op| op == "update"),
                });
            }

            let model_field = model_field.ok_or_else(|| {
                Error::new(
                    proc_macro2::Span::call_site(),
                    "TableMetadata needs a field marked #[model] holding the base Model",
                )
            })?;

            return Ok(FieldInfo {
                model_field,
                columns,
            });
        }
    }

    Err(Error::new(
        proc_macro2::Span::call_site(),
        "TableMetadata can only be derived for structs with named fields",
    ))
}

pub fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Operations of a `#[field]` attribute; `None` when the field has none
///
/// `#[field]` alone means `#[field(create, update)]`.
pub fn parse_field_operations(attrs: &[Attribute]) -> Result<Option<Vec<String>>> {
    for attr in attrs {
        if attr.path().is_ident("field") {
            return match &attr.meta {
                Meta::List(meta_list) => {
                    let field_ops = meta_list.parse_args::<FieldOperations>()?;
                    let mut operations = Vec::new();
                    for ident in field_ops.operations {
                        match ident.to_string().as_str() {
                            op @ ("create" | "update") => operations.push(op.to_string()),
                            other => {
                                return Err(Error::new(
                                    ident.span(),
                                    format!(
                                        "unknown field operation '{}': expected create or update",
                                        other
                                    ),
                                ))
                            }
                        }
                    }
                    if operations.is_empty() {
                        return Err(Error::new_spanned(
                            meta_list,
                            "#[field()] needs create, update or both; use #[field] for both",
                        ));
                    }
                    Ok(Some(operations))
                }
                Meta::Path(_) => Ok(Some(vec!["create".to_string(), "update".to_string()])),
                Meta::NameValue(nv) => Err(Error::new_spanned(
                    nv,
                    "expected #[field] or #[field(create, update)]",
                )),
            };
        }
    }

    Ok(None)
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use syn::parse_quote;

    // Helper functions for tests - these call the _syn versions but panic on error
    fn validate_table_name(name: &str) {
        if let Err(e) = validate_table_name_syn(name, proc_macro2::Span::call_site()) {
            panic!("Invalid table name: {}", e);
        }
    }

    fn validate_field_name(name: &str) {
        if let Err(e) = validate_field_name_syn(name, proc_macro2::Span::call_site()) {
            panic!("Invalid field name: {}", e);
        }
    }

    #[test]
    fn test_valid_table_names() {
        validate_table_name("contacts");
        validate_table_name("contact_forms");
        validate_table_name("_private");
        validate_table_name("table123");
        validate_table_name("a");
    }

    #[test]
    #[should_panic(expected = "Invalid table name")]
    fn test_reserved_keyword() {
        validate_table_name("SELECT");
    }

    #[test]
    #[should_panic(expected = "Invalid table name")]
    fn test_invalid_start() {
        validate_table_name("123table");
    }

    #[test]
    #[should_panic(expected = "Invalid table name")]
    fn test_invalid_chars() {
        validate_table_name("user-table");
    }

    #[test]
    #[should_panic(expected = "Invalid table name")]
    fn test_empty_name() {
        validate_table_name("");
    }

    #[test]
    fn test_field_validation() {
        validate_field_name("email");
        validate_field_name("company_id");
        validate_field_name("field123");
    }

    #[test]
    #[should_panic(expected = "Invalid field name")]
    fn test_invalid_field() {
        validate_field_name("SELECT");
    }

    #[test]
    #[should_panic(expected = "managed by the store")]
    fn test_base_column_cannot_be_redeclared() {
        validate_field_name("created_at");
    }

    #[test]
    fn test_sql_injection_prevention() {
        let malicious_names = [
            "contacts; DROP TABLE contacts; --",
            "contacts' OR '1'='1",
            "contacts/**/UNION/**/SELECT",
            "contacts\"; DELETE FROM contacts; --",
        ];

        for name in malicious_names {
            let result = std::panic::catch_unwind(|| {
                validate_table_name(name);
            });
            assert!(result.is_err(), "Should panic for malicious name: {}", name);
        }
    }

    #[test]
    fn test_parse_table_and_relations() {
        let input: syn::DeriveInput = parse_quote! {
            #[table(name = "contacts")]
            #[relations(company, owner)]
            struct Contact {}
        };

        let info = parse_table_attributes(&input.attrs).unwrap();
        assert_eq!(info.name, "contacts");
        assert_eq!(info.relations, vec!["company", "owner"]);
    }

    #[test]
    fn test_missing_table_attribute() {
        let input: syn::DeriveInput = parse_quote! {
            struct Contact {}
        };

        assert!(parse_table_attributes(&input.attrs).is_err());
    }

    #[test]
    fn test_parse_columns() {
        let input: syn::DeriveInput = parse_quote! {
            struct Contact {
                #[model]
                #[sqlx(flatten)]
                model: Model,
                #[field]
                email: String,
                #[field(create)]
                tag: String,
                #[field(update)]
                note: Option<String>,
                #[sqlx(skip)]
                company: Option<Company>,
            }
        };

        let info = parse_field_attributes(&input.data).unwrap();
        assert_eq!(info.model_field, "model");
        let names: Vec<_> = info.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["email", "tag", "note"]);
        let create: Vec<_> = info.create_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(create, vec!["email", "tag"]);
        let update: Vec<_> = info.update_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(update, vec!["email", "note"]);
    }

    #[test]
    fn test_model_field_is_required() {
        let input: syn::DeriveInput = parse_quote! {
            struct Contact {
                #[field]
                email: String,
            }
        };

        assert!(parse_field_attributes(&input.data).is_err());
    }

    #[test]
    fn test_unknown_field_operation() {
        let input: syn::DeriveInput = parse_quote! {
            struct Contact {
                #[model]
                model: Model,
                #[field(readonly)]
                email: String,
            }
        };

        assert!(parse_field_attributes(&input.data).is_err());
    }

    #[test]
    fn test_empty_field_operations_are_rejected() {
        let input: syn::DeriveInput = parse_quote! {
            struct Contact {
                #[model]
                model: Model,
                #[field()]
                email: String,
            }
        };

        let err = parse_field_attributes(&input.data).err().unwrap();
        assert!(err.to_string().contains("needs create, update or both"));
    }

    #[test]
    fn test_columns_keep_their_types() {
        let input: syn::DeriveInput = parse_quote! {
            struct Employee {
                #[model]
                model: Model,
                #[field(create)]
                company_id: Option<i64>,
            }
        };

        let info = parse_field_attributes(&input.data).unwrap();
        let ty = &info.columns[0].ty;
        assert_eq!(quote::quote!(#ty).to_string(), "Option < i64 >");
    }
}
