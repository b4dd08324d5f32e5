//! Procedural macros for flux-dispatch

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Payload)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(payload), supports(enum_any, struct_any))]
struct PayloadOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<PayloadVariant, darling::util::Ignored>,

    /// Kind override (structs only)
    #[darling(default)]
    kind: Option<String>,

    /// Generate `is_<variant>()` predicates (enums only)
    #[darling(default)]
    predicates: bool,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(payload))]
struct PayloadVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<darling::util::Ignored>,

    /// Kind override
    #[darling(default)]
    kind: Option<String>,
}

/// Split a PascalCase string into parts
fn split_pascal_case(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for ch in s.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn to_snake_case(s: &str) -> String {
    split_pascal_case(s)
        .iter()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Derive the `Payload` trait
///
/// `kind()` returns the variant name (enums) or the type name (structs),
/// unless overridden with `#[payload(kind = "...")]`.
///
/// # Attributes
///
/// - `#[payload(kind = "...")]` on a variant or a struct: explicit kind
/// - `#[payload(predicates)]` on an enum: generate `is_<variant>()` methods
///
/// # Example
///
/// ```ignore
/// #[derive(Payload, Clone, Debug)]
/// #[payload(predicates)]
/// enum TodoPayload {
///     Added { title: String },
///     Removed(usize),
///     #[payload(kind = "TodoListCleared")]
///     Cleared,
/// }
///
/// assert_eq!(TodoPayload::Removed(3).kind(), "Removed");
/// assert_eq!(TodoPayload::Cleared.kind(), "TodoListCleared");
/// assert!(TodoPayload::Cleared.is_cleared());
/// ```
#[proc_macro_derive(Payload, attributes(payload))]
pub fn derive_payload(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match PayloadOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;
    let (impl_generics, ty_generics, where_clause) = opts.generics.split_for_impl();

    let expanded = match &opts.data {
        darling::ast::Data::Enum(variants) => {
            if opts.kind.is_some() {
                return syn::Error::new_spanned(
                    &input.ident,
                    "#[payload(kind = \"...\")] on an enum belongs on its variants",
                )
                .to_compile_error()
                .into();
            }

            if variants.is_empty() {
                return syn::Error::new_spanned(
                    &input.ident,
                    "Payload cannot be derived for an enum without variants",
                )
                .to_compile_error()
                .into();
            }

            let kind_arms = variants.iter().map(|v| {
                let variant_name = &v.ident;
                let kind = v.kind.clone().unwrap_or_else(|| variant_name.to_string());

                match &v.fields.style {
                    darling::ast::Style::Unit => quote! {
                        #name::#variant_name => #kind
                    },
                    darling::ast::Style::Tuple => quote! {
                        #name::#variant_name(..) => #kind
                    },
                    darling::ast::Style::Struct => quote! {
                        #name::#variant_name { .. } => #kind
                    },
                }
            });

            let mut expanded = quote! {
                impl #impl_generics flux_dispatch::Payload for #name #ty_generics #where_clause {
                    fn kind(&self) -> &'static str {
                        match self {
                            #(#kind_arms),*
                        }
                    }
                }
            };

            if opts.predicates {
                let predicates = variants.iter().map(|v| {
                    let variant_name = &v.ident;
                    let method = format_ident!("is_{}", to_snake_case(&variant_name.to_string()));
                    let pattern = match &v.fields.style {
                        darling::ast::Style::Unit => quote! { #name::#variant_name },
                        darling::ast::Style::Tuple => quote! { #name::#variant_name(..) },
                        darling::ast::Style::Struct => quote! { #name::#variant_name { .. } },
                    };
                    quote! {
                        pub fn #method(&self) -> bool {
                            ::core::matches!(self, #pattern)
                        }
                    }
                });

                expanded = quote! {
                    #expanded

                    impl #impl_generics #name #ty_generics #where_clause {
                        #(#predicates)*
                    }
                };
            }

            expanded
        }
        darling::ast::Data::Struct(_) => {
            if opts.predicates {
                return syn::Error::new_spanned(
                    &input.ident,
                    "#[payload(predicates)] is only supported on enums",
                )
                .to_compile_error()
                .into();
            }

            let kind = opts.kind.clone().unwrap_or_else(|| name.to_string());
            quote! {
                impl #impl_generics flux_dispatch::Payload for #name #ty_generics #where_clause {
                    fn kind(&self) -> &'static str {
                        #kind
                    }
                }
            }
        }
    };

    TokenStream::from(expanded)
}
