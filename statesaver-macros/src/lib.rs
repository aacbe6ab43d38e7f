//! Derive macros for statesaver field reflection.
//!
//! `#[derive(Reflect)]` builds the compile-time field table that lets the
//! snapshot engine list, read and write a struct's fields by name.
//! `#[derive(ReflectEnum)]` lets a unit-only enum be stored by member name.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Reflect)]
//! #[reflect(name = "Game.Mover")]
//! struct Mover {
//!     #[reflect(id)]
//!     id: StableId,
//!     speed: f32,
//!     #[reflect(rename = "label")]
//!     display_label: String,
//!     #[reflect(skip)]
//!     cache: Vec<u8>,
//! }
//!
//! #[derive(ReflectEnum)]
//! enum Gait {
//!     Stand,
//!     Walk,
//!     Run,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Field, Fields, LitStr};

/// Derive `Reflect` and `Identify` for a struct with named fields.
///
/// # Attributes
///
/// - `#[reflect(name = "...")]` on the struct - Override the type name used in
///   identities (defaults to the module path plus the struct name)
/// - `#[reflect(id)]` on a field - Use this field's `Display` output as the
///   instance token of the identity; the field itself is not reflected
/// - `#[reflect(skip)]` on a field - Leave the field out of snapshots
/// - `#[reflect(rename = "...")]` on a field - Override the stored field name
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_reflect(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Derive `ReflectEnum` and `FieldValue` for an enum with unit variants.
///
/// # Attributes
///
/// - `#[reflect(name = "...")]` on the enum - Override the enum name shown in
///   diagnostics
/// - `#[reflect(rename = "...")]` on a variant - Override the stored member name
#[proc_macro_derive(ReflectEnum, attributes(reflect))]
pub fn derive_reflect_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_reflect_enum(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Parsed `#[reflect(...)]` options.
#[derive(Default)]
struct ReflectAttrs {
    name: Option<String>,
    rename: Option<String>,
    skip: bool,
    id: bool,
}

fn parse_attrs(attrs: &[Attribute]) -> syn::Result<ReflectAttrs> {
    let mut parsed = ReflectAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("reflect") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("rename") {
                parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else if meta.path.is_ident("id") {
                parsed.id = true;
            } else {
                return Err(meta.error("unknown reflect attribute"));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}

fn type_name_tokens(input: &DeriveInput, attrs: &ReflectAttrs) -> TokenStream2 {
    match &attrs.name {
        Some(name) => quote! { #name },
        None => {
            let ident = &input.ident;
            quote! { concat!(module_path!(), "::", stringify!(#ident)) }
        }
    }
}

fn expand_reflect(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let struct_attrs = parse_attrs(&input.attrs)?;
    let type_name = type_name_tokens(&input, &struct_attrs);
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Reflect derive only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(&input, "Reflect derive only supports structs")),
    };

    let mut id_field: Option<&Field> = None;
    let mut reflected = Vec::new();

    for field in fields {
        let attrs = parse_attrs(&field.attrs)?;
        if attrs.id {
            if id_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may be marked #[reflect(id)]",
                ));
            }
            id_field = Some(field);
            continue;
        }
        if attrs.skip {
            continue;
        }
        let ident = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new_spanned(field, "Reflect derive requires named fields")
        })?;
        let stored_name = attrs.rename.unwrap_or_else(|| ident.to_string());
        reflected.push((ident, stored_name, &field.ty));
    }

    let descriptors = reflected.iter().map(|(_, name, ty)| {
        quote! {
            ::statesaver_core::FieldDescriptor::new(
                #name,
                <#ty as ::statesaver_core::FieldValue>::value_type(),
            )
        }
    });

    let read_arms = reflected.iter().map(|(ident, name, _)| {
        quote! {
            #name => ::core::result::Result::Ok(
                ::statesaver_core::FieldValue::to_value(&self.#ident)
            ),
        }
    });

    let write_arms = reflected.iter().map(|(ident, name, ty)| {
        quote! {
            #name => {
                let found = value.kind();
                match <#ty as ::statesaver_core::FieldValue>::from_value(value) {
                    ::core::option::Option::Some(v) => {
                        self.#ident = v;
                        ::core::result::Result::Ok(::statesaver_core::WriteOutcome::Written)
                    }
                    ::core::option::Option::None => ::core::result::Result::Err(
                        ::statesaver_core::FieldAccessError::Incompatible {
                            field: name.to_string(),
                            expected: <#ty as ::statesaver_core::FieldValue>::value_type(),
                            found,
                        },
                    ),
                }
            }
        }
    });

    let identity = match id_field.and_then(|f| f.ident.as_ref()) {
        Some(id) => quote! {
            ::statesaver_core::ObjectIdentity::derive(
                <Self as ::statesaver_core::Reflect>::type_name(self),
                &self.#id,
            )
        },
        None => quote! {
            ::statesaver_core::ObjectIdentity::of_instance(
                <Self as ::statesaver_core::Reflect>::type_name(self),
                self,
            )
        },
    };

    Ok(quote! {
        impl #impl_generics ::statesaver_core::Reflect
            for #struct_name #ty_generics #where_clause
        {
            fn type_name(&self) -> &'static str {
                #type_name
            }

            fn fields(&self) -> ::std::vec::Vec<::statesaver_core::FieldDescriptor> {
                ::std::vec![#(#descriptors),*]
            }

            fn read_field(
                &self,
                name: &str,
            ) -> ::core::result::Result<
                ::core::option::Option<::statesaver_core::Value>,
                ::statesaver_core::FieldAccessError,
            > {
                match name {
                    #(#read_arms)*
                    _ => ::core::result::Result::Err(
                        ::statesaver_core::FieldAccessError::Unreadable {
                            field: name.to_string(),
                            reason: "no such field".to_string(),
                        },
                    ),
                }
            }

            #[allow(unused_variables)]
            fn write_field(
                &mut self,
                name: &str,
                value: ::statesaver_core::Value,
            ) -> ::core::result::Result<
                ::statesaver_core::WriteOutcome,
                ::statesaver_core::FieldAccessError,
            > {
                match name {
                    #(#write_arms)*
                    _ => ::core::result::Result::Ok(::statesaver_core::WriteOutcome::NotPresent),
                }
            }
        }

        impl #impl_generics ::statesaver_core::Identify
            for #struct_name #ty_generics #where_clause
        {
            fn identity(&self) -> ::statesaver_core::ObjectIdentity {
                #identity
            }
        }
    })
}

fn expand_reflect_enum(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = &input.ident;
    let enum_attrs = parse_attrs(&input.attrs)?;
    let display_name = enum_attrs.name.unwrap_or_else(|| enum_name.to_string());

    let variants = match &input.data {
        syn::Data::Enum(data) => &data.variants,
        _ => return Err(syn::Error::new_spanned(&input, "ReflectEnum derive only supports enums")),
    };

    let mut idents = Vec::new();
    let mut members = Vec::new();
    for variant in variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "ReflectEnum derive only supports unit variants",
            ));
        }
        let attrs = parse_attrs(&variant.attrs)?;
        idents.push(&variant.ident);
        members.push(attrs.rename.unwrap_or_else(|| variant.ident.to_string()));
    }

    Ok(quote! {
        impl ::statesaver_core::ReflectEnum for #enum_name {
            const INFO: &'static ::statesaver_core::EnumInfo = &::statesaver_core::EnumInfo {
                name: #display_name,
                members: &[#(#members),*],
            };

            fn member_name(&self) -> &'static str {
                match self {
                    #(Self::#idents => #members,)*
                }
            }

            fn from_member_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#members => ::core::option::Option::Some(Self::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::statesaver_core::FieldValue for #enum_name {
            fn value_type() -> ::statesaver_core::ValueType {
                ::statesaver_core::ValueType::Enum(
                    <Self as ::statesaver_core::ReflectEnum>::INFO,
                )
            }

            fn to_value(&self) -> ::core::option::Option<::statesaver_core::Value> {
                ::core::option::Option::Some(::statesaver_core::Value::Enum(
                    ::statesaver_core::ReflectEnum::to_member(self),
                ))
            }

            fn from_value(value: ::statesaver_core::Value) -> ::core::option::Option<Self> {
                match value {
                    ::statesaver_core::Value::Enum(member) => {
                        <Self as ::statesaver_core::ReflectEnum>::from_member_name(member.member)
                    }
                    ::statesaver_core::Value::Text(name) => {
                        <Self as ::statesaver_core::ReflectEnum>::from_member_name(&name)
                    }
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}
