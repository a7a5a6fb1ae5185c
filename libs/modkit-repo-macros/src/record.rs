use heck::ToUpperCamelCase;
use proc_macro_error2::abort;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Data, DeriveInput, LitStr, Token};

/// Configuration parsed from `#[record(...)]` attributes
#[derive(Default)]
struct RecordConfig {
    soft_delete_col: Option<(String, Span)>,
    created_at_col: Option<(String, Span)>,
    updated_at_col: Option<(String, Span)>,
    engine_defaults: Option<Vec<(String, Span)>>,
}

#[allow(clippy::needless_pass_by_value)] // DeriveInput is consumed by proc-macro pattern
pub fn expand_derive_record(input: DeriveInput) -> TokenStream {
    if !matches!(&input.data, Data::Struct(_)) {
        abort!(
            input.ident,
            "#[derive(Record)] can only be applied to structs"
        );
    }

    let config = parse_record_attrs(&input);
    let entity_ident = syn::Ident::new("Entity", input.ident.span());

    let soft_delete = col_hook("soft_delete_col", config.soft_delete_col.as_ref());
    let created_at = col_hook("created_at_col", config.created_at_col.as_ref());
    let updated_at = col_hook("updated_at_col", config.updated_at_col.as_ref());
    let engine_defaults = config.engine_defaults.as_ref().map(|cols| {
        let idents = cols.iter().map(column_ident);
        quote! {
            fn engine_default_cols() -> ::std::vec::Vec<Self::Column> {
                ::std::vec![#(Self::Column::#idents),*]
            }
        }
    });

    quote! {
        impl ::modkit_repo::Record for #entity_ident {
            #soft_delete
            #created_at
            #updated_at
            #engine_defaults
        }
    }
}

fn column_ident((name, span): &(String, Span)) -> syn::Ident {
    syn::Ident::new(&name.to_upper_camel_case(), *span)
}

/// Overrides a column hook; unset hooks keep the trait default.
fn col_hook(method_name: &str, col: Option<&(String, Span)>) -> Option<TokenStream> {
    let col = col?;
    let method_ident = syn::Ident::new(method_name, Span::call_site());
    let col_ident = column_ident(col);
    Some(quote! {
        fn #method_ident() -> ::core::option::Option<Self::Column> {
            ::core::option::Option::Some(Self::Column::#col_ident)
        }
    })
}

fn set_once<T>(slot: &mut Option<T>, value: T, key: &str, span: Span) {
    if slot.is_some() {
        abort!(span, "duplicate attribute '{}'", key);
    }
    *slot = Some(value);
}

/// Parse all `#[record(...)]` attributes with duplicate detection
fn parse_record_attrs(input: &DeriveInput) -> RecordConfig {
    let mut config = RecordConfig::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            let span = meta.path.get_ident().map_or_else(Span::call_site, syn::Ident::span);
            let key = meta
                .path
                .get_ident()
                .map(ToString::to_string)
                .unwrap_or_default();

            if key == "engine_defaults" {
                let content;
                syn::parenthesized!(content in meta.input);
                let cols = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?
                    .into_iter()
                    .map(|lit| (lit.value(), lit.span()))
                    .collect::<Vec<_>>();
                if cols.is_empty() {
                    abort!(span, "engine_defaults needs at least one column");
                }
                set_once(&mut config.engine_defaults, cols, &key, span);
                return Ok(());
            }

            let slot = match key.as_str() {
                "soft_delete_col" => &mut config.soft_delete_col,
                "created_at_col" => &mut config.created_at_col,
                "updated_at_col" => &mut config.updated_at_col,
                _ => abort!(
                    span,
                    "unknown attribute '{}'; expected one of: soft_delete_col, created_at_col, updated_at_col, engine_defaults",
                    key
                ),
            };
            let lit: LitStr = match meta.value() {
                Ok(v) => match v.parse() {
                    Ok(lit) => lit,
                    Err(_) => abort!(span, "Expected string literal"),
                },
                Err(_) => abort!(span, "Expected '=' followed by a string value"),
            };
            if lit.value().is_empty() {
                abort!(lit, "column name must not be empty");
            }
            set_once(slot, (lit.value(), lit.span()), &key, span);
            Ok(())
        });

        if let Err(err) = result {
            abort!(err.span(), "{}", err);
        }
    }

    config
}
