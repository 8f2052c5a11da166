use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Path, parse_macro_input, spanned::Spanned};

extern crate proc_macro;

/// Implements `barrage::inject::Injectable` from field attributes.
///
/// - `#[feeder]` binds `Default::default()` of the field type.
/// - `#[feeder(factory = path)]` binds the output of `path()`.
/// - `#[session_feeder]` / `#[user_feeder]` declare session or user injection, which the
///   injector rejects at setup.
///
/// Fields without an attribute are left alone.
#[proc_macro_derive(Injectable, attributes(feeder, session_feeder, user_feeder))]
pub fn injectable(item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as DeriveInput);
    match expand(&ast) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(ast: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let Data::Struct(data) = &ast.data else {
        return Err(syn::Error::new(
            ast.span(),
            "Injectable can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "Injectable requires named fields",
        ));
    };

    let mut points = Vec::new();
    for field in &fields.named {
        let Some(ident) = &field.ident else { continue };
        let label = ident.to_string();
        let ty = &field.ty;

        for attr in &field.attrs {
            if attr.path().is_ident("session_feeder") {
                points.push(quote! { ::barrage::inject::InjectionPoint::session(#label) });
            } else if attr.path().is_ident("user_feeder") {
                points.push(quote! { ::barrage::inject::InjectionPoint::user(#label) });
            } else if attr.path().is_ident("feeder") {
                let factory = feeder_factory(attr)?;
                let factory = match factory {
                    Some(path) => quote! { #path },
                    None => quote! { <#ty as ::core::default::Default>::default },
                };
                points.push(quote! {
                    ::barrage::inject::InjectionPoint::feeder(
                        #label,
                        #factory,
                        |target: &mut Self, value: #ty| target.#ident = value,
                    )
                });
            }
        }
    }

    Ok(quote! {
        impl #impl_generics ::barrage::inject::Injectable for #name #ty_generics #where_clause {
            fn injection_points() -> ::std::vec::Vec<::barrage::inject::InjectionPoint<Self>> {
                ::std::vec![#(#points),*]
            }
        }
    })
}

/// `#[feeder]` yields `None`, `#[feeder(factory = path)]` yields the path.
fn feeder_factory(attr: &syn::Attribute) -> syn::Result<Option<Path>> {
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(None);
    }
    let mut factory = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("factory") {
            factory = Some(meta.value()?.parse::<Path>()?);
            Ok(())
        } else {
            Err(meta.error("unsupported feeder option, expected `factory = path`"))
        }
    })?;
    Ok(factory)
}
