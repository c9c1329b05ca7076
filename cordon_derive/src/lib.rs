/*
   cordon, a disjunction-partitioned cycle-tracking garbage collector.
   Copyright (C) 2026 cordon contributors.

   This program is free software: you can redistribute it and/or modify
   it under the terms of the GNU General Public License as published by
   the Free Software Foundation, either version 3 of the License, or
   (at your option) any later version.

   This program is distributed in the hope that it will be useful,
   but WITHOUT ANY WARRANTY; without even the implied warranty of
   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
   GNU General Public License for more details.

   You should have received a copy of the GNU General Public License
   along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! `#[derive(Collectable)]`: generates both `Collectable::route_immutable`
//! and `Collectable::route_mutable` for a struct or enum by visiting every
//! field in turn through the matching method.
//!
//! A derived type never introduces an interior-mutability boundary of its
//! own — any such boundary belongs to a field's type (`RefCell`, `Mutex`,
//! ...), whose own hand-written `Collectable` impl already overrides
//! `route_mutable` to report nothing. So the generated `route_mutable`
//! simply forwards to each field's own `route_mutable`, the same way
//! `route_immutable` forwards to each field's `route_immutable`: a field
//! behind its own interior-mutability wrapper correctly stops there, while
//! a field with no such wrapper keeps recursing. Relying on the trait's
//! default `route_mutable` (which forwards straight to `self`'s own
//! `route_immutable`) would skip every field's `route_mutable` override
//! entirely and is not used here for that reason.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Index};

#[proc_macro_derive(Collectable)]
pub fn derive_collectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();

    // Every type parameter must itself be `Collectable` for the derived
    // impl to route through it.
    let mut bounded_generics = input.generics.clone();
    for param in bounded_generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(::cordon::Collectable));
    }
    let (bounded_impl_generics, _, _) = bounded_generics.split_for_impl();

    let immutable_body = match route_body(&input.data, quote!(route_immutable)) {
        Ok(body) => body,
        Err(err) => return err.to_compile_error().into(),
    };
    let mutable_body = match route_body(&input.data, quote!(route_mutable)) {
        Ok(body) => body,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        #[allow(clippy::all)]
        unsafe impl #bounded_impl_generics ::cordon::Collectable for #name #ty_generics #where_clause {
            fn route_immutable(&self, visitor: &mut dyn ::cordon::Visitor) {
                #immutable_body
            }

            fn route_mutable(&self, visitor: &mut dyn ::cordon::Visitor) {
                #mutable_body
            }
        }
    };

    TokenStream::from(expanded)
}

fn route_body(data: &Data, method: TokenStream2) -> syn::Result<TokenStream2> {
    match data {
        Data::Struct(data) => Ok(route_fields(&quote!(self), &data.fields, &method)),
        Data::Enum(data) => {
            let arms = data.variants.iter().map(|variant| {
                let variant_ident = &variant.ident;
                match &variant.fields {
                    Fields::Named(named) => {
                        let names: Vec<_> = named
                            .named
                            .iter()
                            .map(|f| f.ident.clone().unwrap())
                            .collect();
                        let calls = names
                            .iter()
                            .map(|n| quote!(::cordon::Collectable::#method(#n, visitor);));
                        quote! {
                            Self::#variant_ident { #(#names),* } => { #(#calls)* }
                        }
                    }
                    Fields::Unnamed(unnamed) => {
                        let names: Vec<_> = (0..unnamed.unnamed.len())
                            .map(|i| quote::format_ident!("field_{i}"))
                            .collect();
                        let calls = names
                            .iter()
                            .map(|n| quote!(::cordon::Collectable::#method(#n, visitor);));
                        quote! {
                            Self::#variant_ident(#(#names),*) => { #(#calls)* }
                        }
                    }
                    Fields::Unit => quote! { Self::#variant_ident => {} },
                }
            });
            Ok(quote! {
                match self {
                    #(#arms)*
                }
            })
        }
        Data::Union(data) => Err(syn::Error::new_spanned(
            data.union_token,
            "#[derive(Collectable)] does not support unions; implement Collectable manually",
        )),
    }
}

fn route_fields(receiver: &TokenStream2, fields: &Fields, method: &TokenStream2) -> TokenStream2 {
    match fields {
        Fields::Named(named) => {
            let calls = named.named.iter().map(|f| {
                let ident = f.ident.as_ref().unwrap();
                quote!(::cordon::Collectable::#method(&#receiver.#ident, visitor);)
            });
            quote! { #(#calls)* }
        }
        Fields::Unnamed(unnamed) => {
            let calls = unnamed.unnamed.iter().enumerate().map(|(i, _)| {
                let index = Index::from(i);
                quote!(::cordon::Collectable::#method(&#receiver.#index, visitor);)
            });
            quote! { #(#calls)* }
        }
        Fields::Unit => quote! {},
    }
}
