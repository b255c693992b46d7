//! `#[derive(GraphEntity)]`: generates the `entity-graph-core::GraphEntity`
//! field-introspection impl for a struct, replacing the runtime reflection
//! the source system used (entity.py's Pydantic field walk) with compile
//! time codegen, per spec.md's DESIGN NOTES "Dynamic field introspection on
//! record types".
//!
//! Field classification (mirrors §4.1, resolved once at expansion time
//! instead of once per call):
//!
//! - The field marked `#[meta]` (or, absent that marker, the field named
//!   `meta`) holds the entity's [`entity_graph_core::EntityMeta`] and is
//!   excluded from both `entity_fields` and `plain_fields`.
//! - `Option<EntityHandle>` -> `EntityField::Single`.
//! - `EntityList` -> `EntityField::List`.
//! - `EntityDict` -> `EntityField::Dict`.
//! - `EntitySet` -> `EntityField::Set`.
//! - `EntityTuple` -> `EntityField::Tuple`.
//! - Anything else is a plain field; its type must implement
//!   `entity_graph_core::AsPlainValue`.
//! - `#[skip]` excludes a plain field from `plain_fields` (and therefore
//!   from the diff engine's attribute comparison) while still cloning it in
//!   `clone_node`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type,
};

enum FieldKind {
    Single,
    List,
    Dict,
    Set,
    Tuple,
    Plain,
}

struct ClassifiedField<'a> {
    ident: &'a syn::Ident,
    ty: &'a Type,
    kind: FieldKind,
}

fn last_segment_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}

fn classify(ty: &Type) -> FieldKind {
    if let Some(inner) = option_inner(ty) {
        if last_segment_ident(inner).as_deref() == Some("EntityHandle") {
            return FieldKind::Single;
        }
    }
    match last_segment_ident(ty).as_deref() {
        Some("EntityList") => FieldKind::List,
        Some("EntityDict") => FieldKind::Dict,
        Some("EntitySet") => FieldKind::Set,
        Some("EntityTuple") => FieldKind::Tuple,
        _ => FieldKind::Plain,
    }
}

fn has_attr(field: &syn::Field, name: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Derives `entity_graph_core::GraphEntity` for a struct of named fields.
#[proc_macro_derive(GraphEntity, attributes(meta, skip))]
pub fn derive_graph_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let struct_ident = &input.ident;
    let type_name = struct_ident.to_string();

    let Data::Struct(data) = &input.data else {
        return syn::Error::new_spanned(&input, "GraphEntity can only be derived for structs")
            .to_compile_error()
            .into();
    };
    let Fields::Named(fields) = &data.fields else {
        return syn::Error::new_spanned(
            &input,
            "GraphEntity requires named fields (no tuple or unit structs)",
        )
        .to_compile_error()
        .into();
    };

    let meta_field = fields
        .named
        .iter()
        .find(|f| has_attr(f, "meta"))
        .or_else(|| {
            fields
                .named
                .iter()
                .find(|f| f.ident.as_ref().is_some_and(|i| i == "meta"))
        });

    let Some(meta_field) = meta_field else {
        return syn::Error::new_spanned(
            &input,
            "GraphEntity requires one field marked `#[meta]` (or named `meta`) holding an EntityMeta",
        )
        .to_compile_error()
        .into();
    };
    let meta_ident = meta_field.ident.as_ref().expect("named field has ident");

    let classified: Vec<ClassifiedField<'_>> = fields
        .named
        .iter()
        .filter(|f| f.ident.as_ref() != Some(meta_ident))
        .map(|f| ClassifiedField {
            ident: f.ident.as_ref().expect("named field has ident"),
            ty: &f.ty,
            kind: classify(&f.ty),
        })
        .collect();

    let skipped: std::collections::HashSet<String> = fields
        .named
        .iter()
        .filter(|f| has_attr(f, "skip"))
        .filter_map(|f| f.ident.as_ref().map(ToString::to_string))
        .collect();

    let entity_field_pushes = classified.iter().map(|f| {
        let ident = f.ident;
        let name = ident.to_string();
        match f.kind {
            FieldKind::Single => quote! {
                fields.push(::entity_graph_core::EntityField::Single(#name, self.#ident.clone()));
            },
            FieldKind::List => quote! {
                fields.push(::entity_graph_core::EntityField::List(#name, self.#ident.0.clone()));
            },
            FieldKind::Dict => quote! {
                fields.push(::entity_graph_core::EntityField::Dict(#name, self.#ident.0.clone()));
            },
            FieldKind::Set => quote! {
                fields.push(::entity_graph_core::EntityField::Set(#name, self.#ident.0.clone()));
            },
            FieldKind::Tuple => quote! {
                fields.push(::entity_graph_core::EntityField::Tuple(#name, self.#ident.0.clone()));
            },
            FieldKind::Plain => quote! {},
        }
    });

    let plain_field_pushes = classified.iter().filter_map(|f| {
        if skipped.contains(&f.ident.to_string()) {
            return None;
        }
        if let FieldKind::Plain = f.kind {
            let ident = f.ident;
            let name = ident.to_string();
            Some(quote! {
                plain.push((#name, ::entity_graph_core::AsPlainValue::to_plain(&self.#ident)));
            })
        } else {
            None
        }
    });

    let clone_fields = classified.iter().map(|f| {
        let ident = f.ident;
        match f.kind {
            FieldKind::Single => quote! {
                #ident: self.#ident.as_ref().map(::entity_graph_core::clone_handle),
            },
            FieldKind::List => quote! {
                #ident: ::entity_graph_core::EntityList(
                    self.#ident.0.iter().map(::entity_graph_core::clone_handle).collect(),
                ),
            },
            FieldKind::Dict => quote! {
                #ident: ::entity_graph_core::EntityDict(
                    self.#ident
                        .0
                        .iter()
                        .map(|(k, v)| (k.clone(), ::entity_graph_core::clone_handle(v)))
                        .collect(),
                ),
            },
            FieldKind::Set => quote! {
                #ident: ::entity_graph_core::EntitySet(
                    self.#ident.0.iter().map(::entity_graph_core::clone_handle).collect(),
                ),
            },
            FieldKind::Tuple => quote! {
                #ident: ::entity_graph_core::EntityTuple(
                    self.#ident.0.iter().map(::entity_graph_core::clone_handle).collect(),
                ),
            },
            FieldKind::Plain => quote! {
                #ident: self.#ident.clone(),
            },
        }
    });

    let set_plain_arms = classified.iter().filter_map(|f| {
        if let FieldKind::Plain = f.kind {
            let ident = f.ident;
            let name = ident.to_string();
            Some(quote! {
                #name => {
                    self.#ident = ::entity_graph_core::AsPlainValue::from_plain(value).ok_or_else(|| {
                        ::entity_graph_core::GraphError::InvariantViolation(format!(
                            "field '{}' received a value of the wrong shape", #name
                        ))
                    })?;
                }
            })
        } else {
            None
        }
    });

    let set_entity_arms = classified.iter().filter_map(|f| {
        let ident = f.ident;
        let name = ident.to_string();
        match f.kind {
            FieldKind::Single => Some(quote! {
                (#name, ::entity_graph_core::EntityField::Single(_, v)) => self.#ident = v,
            }),
            FieldKind::List => Some(quote! {
                (#name, ::entity_graph_core::EntityField::List(_, v)) => self.#ident = ::entity_graph_core::EntityList(v),
            }),
            FieldKind::Dict => Some(quote! {
                (#name, ::entity_graph_core::EntityField::Dict(_, v)) => self.#ident = ::entity_graph_core::EntityDict(v),
            }),
            FieldKind::Set => Some(quote! {
                (#name, ::entity_graph_core::EntityField::Set(_, v)) => self.#ident = ::entity_graph_core::EntitySet(v),
            }),
            FieldKind::Tuple => Some(quote! {
                (#name, ::entity_graph_core::EntityField::Tuple(_, v)) => self.#ident = ::entity_graph_core::EntityTuple(v),
            }),
            FieldKind::Plain => None,
        }
    });

    let as_any_fn = format_ident!("as_any");
    let as_any_mut_fn = format_ident!("as_any_mut");

    let expanded = quote! {
        impl ::entity_graph_core::GraphEntity for #struct_ident {
            fn meta(&self) -> &::entity_graph_core::EntityMeta {
                &self.#meta_ident
            }

            fn meta_mut(&mut self) -> &mut ::entity_graph_core::EntityMeta {
                &mut self.#meta_ident
            }

            fn entity_type(&self) -> &'static str {
                #type_name
            }

            fn entity_fields(&self) -> ::std::vec::Vec<::entity_graph_core::EntityField> {
                let mut fields = ::std::vec::Vec::new();
                #(#entity_field_pushes)*
                fields
            }

            fn plain_fields(&self) -> ::std::vec::Vec<(&'static str, ::entity_graph_core::PlainValue)> {
                let mut plain = ::std::vec::Vec::new();
                #(#plain_field_pushes)*
                plain
            }

            fn clone_node(&self) -> ::std::boxed::Box<dyn ::entity_graph_core::GraphEntity> {
                ::std::boxed::Box::new(Self {
                    #meta_ident: self.#meta_ident.clone(),
                    #(#clone_fields)*
                })
            }

            fn set_plain_field(
                &mut self,
                name: &str,
                value: ::entity_graph_core::PlainValue,
            ) -> ::entity_graph_core::GraphResult<()> {
                match name {
                    #(#set_plain_arms)*
                    other => return Err(::entity_graph_core::GraphError::FieldNotFound(other.to_string())),
                }
                Ok(())
            }

            fn set_entity_field(
                &mut self,
                name: &str,
                field: ::entity_graph_core::EntityField,
            ) -> ::entity_graph_core::GraphResult<()> {
                match (name, field) {
                    #(#set_entity_arms)*
                    (other, _) => return Err(::entity_graph_core::GraphError::FieldNotFound(other.to_string())),
                }
                Ok(())
            }

            fn #as_any_fn(&self) -> &dyn ::std::any::Any {
                self
            }

            fn #as_any_mut_fn(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };

    expanded.into()
}
