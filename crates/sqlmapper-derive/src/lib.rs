//! # sqlmapper-derive
//!
//! Derive macro for sqlmapper property reflection.
//!
//! `#[derive(Reflect)]` implements `Property` and `Reflect` for a struct with
//! named fields, so statement templates can read and write its fields by
//! property path.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlmapper_reflection::Reflect;
//!
//! #[derive(Reflect, Default)]
//! struct User {
//!     id: i64,
//!     #[sqlmapper(rename = "userName")]
//!     name: String,
//!     email: Option<String>,
//! }
//! ```

#![warn(missing_docs)]

use std::collections::HashSet;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derive macro for implementing `Reflect`.
///
/// Every named field becomes a readable and writable property under its
/// field name. Field types must implement `Property`.
///
/// ## Attributes
///
/// - `#[sqlmapper(rename = "name")]` - Expose the field under a different property name
/// - `#[sqlmapper(skip)]` - Do not expose the field
/// - `#[sqlmapper(readonly)]` - Expose the field for reading only
///
/// Generic structs, tuple structs, enums and unions are rejected.
#[proc_macro_derive(Reflect, attributes(sqlmapper))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct FieldSpec {
    ident: syn::Ident,
    name: String,
    type_name: String,
    readonly: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Reflect cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Reflect can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                ident,
                "Reflect can only be derived for structs",
            ));
        }
    };

    let mut specs = Vec::with_capacity(fields.len());
    let mut seen = HashSet::new();

    for field in fields {
        let Some(field_ident) = field.ident.clone() else {
            continue;
        };

        let mut rename = None;
        let mut skip = false;
        let mut readonly = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("sqlmapper") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    if lit.value().is_empty() {
                        return Err(meta.error("property name cannot be empty"));
                    }
                    rename = Some(lit.value());
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else if meta.path.is_ident("readonly") {
                    readonly = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown sqlmapper attribute, expected `rename`, `skip` or `readonly`"))
                }
            })?;
        }

        if skip {
            continue;
        }

        let name = rename.unwrap_or_else(|| field_ident.to_string());
        if !seen.insert(name.clone()) {
            return Err(syn::Error::new_spanned(
                &field_ident,
                format!("duplicate property name `{name}`"),
            ));
        }

        specs.push(FieldSpec {
            ident: field_ident,
            name,
            type_name: field.ty.to_token_stream().to_string().replace(' ', ""),
            readonly,
        });
    }

    let type_name = ident.to_string();
    let mut accessors = Vec::with_capacity(specs.len() * 2);
    let mut descriptors = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        let field = &spec.ident;
        let name = &spec.name;
        let field_type = &spec.type_name;
        let getter = format_ident!("__get_{}", index, span = Span::call_site());

        accessors.push(quote! {
            fn #getter<'a>(
                any: &'a (dyn ::core::any::Any + 'static),
            ) -> ::core::option::Option<&'a dyn ::sqlmapper_reflection::Property> {
                any.downcast_ref::<#ident>()
                    .map(|this| &this.#field as &dyn ::sqlmapper_reflection::Property)
            }
        });

        let get_mut = if spec.readonly {
            quote! { ::core::option::Option::None }
        } else {
            let setter = format_ident!("__get_mut_{}", index, span = Span::call_site());
            accessors.push(quote! {
                fn #setter<'a>(
                    any: &'a mut (dyn ::core::any::Any + 'static),
                ) -> ::core::option::Option<&'a mut dyn ::sqlmapper_reflection::Property> {
                    any.downcast_mut::<#ident>()
                        .map(|this| &mut this.#field as &mut dyn ::sqlmapper_reflection::Property)
                }
            });
            quote! {
                ::core::option::Option::Some(#setter as ::sqlmapper_reflection::GetterMut)
            }
        };

        descriptors.push(quote! {
            ::sqlmapper_reflection::PropertyDescriptor {
                name: #name,
                type_name: #field_type,
                get: ::core::option::Option::Some(#getter as ::sqlmapper_reflection::Getter),
                get_mut: #get_mut,
            }
        });
    }

    Ok(quote! {
        impl ::sqlmapper_reflection::Property for #ident {
            fn type_name(&self) -> &'static str {
                #type_name
            }

            fn node(&self) -> ::sqlmapper_reflection::Node<'_> {
                ::sqlmapper_reflection::Node::Object(self)
            }

            fn node_mut(&mut self) -> ::sqlmapper_reflection::NodeMut<'_> {
                ::sqlmapper_reflection::NodeMut::Object(self)
            }

            fn assign(
                &mut self,
                value: ::sqlmapper_reflection::Value,
            ) -> ::core::result::Result<(), ::sqlmapper_reflection::ReflectionError> {
                ::sqlmapper_reflection::reflector::assign_object(self, value)
            }
        }

        impl ::sqlmapper_reflection::Reflect for #ident {
            fn descriptor() -> ::sqlmapper_reflection::ClassDescriptor {
                #(#accessors)*

                ::sqlmapper_reflection::ClassDescriptor {
                    type_name: #type_name,
                    properties: ::std::vec![#(#descriptors),*],
                }
            }

            fn reflector(&self) -> ::std::sync::Arc<::sqlmapper_reflection::Reflector> {
                ::sqlmapper_reflection::ReflectorFactory::global().find_for::<Self>()
            }

            fn as_any(&self) -> &(dyn ::core::any::Any + 'static) {
                self
            }

            fn as_any_mut(&mut self) -> &mut (dyn ::core::any::Any + 'static) {
                self
            }

            fn as_property(&self) -> &dyn ::sqlmapper_reflection::Property {
                self
            }

            fn as_property_mut(&mut self) -> &mut dyn ::sqlmapper_reflection::Property {
                self
            }
        }
    })
}
