use std::collections::HashMap;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{braced, Attribute, Ident, LitStr, Result, Token, Type, Visibility};

use proc_macro_crate::{crate_name, FoundCrate};

/// Namespace of ids written without one.
const DEFAULT_NAMESPACE: &str = "minecraft";

// =============================================================================
// Parsing
// =============================================================================

/// `LOGS = "minecraft:logs";`
struct TagDecl {
    attrs: Vec<Attribute>,
    name: Ident,
    id: LitStr,
}

/// `pub mod BlockTags<Block> in "minecraft:block" { ... }`
struct RequiredTagsInput {
    attrs: Vec<Attribute>,
    vis: Visibility,
    root: Ident,
    object_type: Type,
    registry: LitStr,
    decls: Vec<TagDecl>,
}

impl Parse for RequiredTagsInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;
        input.parse::<Token![mod]>()?;
        let root: Ident = input.parse()?;

        input.parse::<Token![<]>()?;
        let object_type: Type = input.parse()?;
        input.parse::<Token![>]>()?;

        input.parse::<Token![in]>()?;
        let registry: LitStr = input.parse()?;

        let content;
        braced!(content in input);
        let mut decls = Vec::new();
        while !content.is_empty() {
            let attrs = content.call(Attribute::parse_outer)?;
            let name: Ident = content.parse()?;
            content.parse::<Token![=]>()?;
            let id: LitStr = content.parse()?;
            content.parse::<Token![;]>()?;
            decls.push(TagDecl { attrs, name, id });
        }

        Ok(Self {
            attrs,
            vis,
            root,
            object_type,
            registry,
            decls,
        })
    }
}

// =============================================================================
// Validation (runs at macro expansion time)
// =============================================================================

/// Canonical `namespace:path` form of `raw`, with the same character rules
/// as `Identifier::parse`.
fn normalize_id(raw: &str) -> std::result::Result<String, String> {
    let (namespace, path) = raw.split_once(':').unwrap_or((DEFAULT_NAMESPACE, raw));

    if namespace.is_empty() {
        return Err(format!("identifier '{raw}' has an empty namespace"));
    }
    if path.is_empty() {
        return Err(format!("identifier '{raw}' has an empty path"));
    }
    if let Some(c) = namespace
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-'))
    {
        return Err(format!("non [a-z0-9_.-] character '{c}' in namespace of '{raw}'"));
    }
    if let Some(c) = path
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '/' | '_' | '.' | '-'))
    {
        return Err(format!("non [a-z0-9/._-] character '{c}' in path of '{raw}'"));
    }

    Ok(format!("{namespace}:{path}"))
}

/// `OAK_LOGS` / `OakLogs` -> `oak_logs`
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn field_ident(name: &Ident) -> Ident {
    let snake = to_snake_case(&name.to_string());
    match syn::parse_str::<Ident>(&snake) {
        Ok(mut ident) => {
            ident.set_span(name.span());
            ident
        }
        Err(_) => Ident::new_raw(&snake, name.span()),
    }
}

// =============================================================================
// Crate path resolution
// =============================================================================

fn tags_crate_path() -> TokenStream2 {
    match crate_name("bevy-data-tags") {
        Ok(FoundCrate::Itself) => {
            quote!(::bevy_data_tags)
        }
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Err(_) => quote!(::bevy_data_tags),
    }
}

// =============================================================================
// Code generation
// =============================================================================

/// Expand one declaration block.
///
/// ```ignore
/// required_tags! {
///     pub mod BlockTags<Block> in "minecraft:block" {
///         LOGS = "logs";
///         MINEABLE = "mymod:mineable/pickaxe";
///     }
/// }
///
/// // Generates:
/// #[allow(non_snake_case)]
/// pub mod BlockTags {
///     use super::*;
///
///     pub const REGISTRY: &str = "minecraft:block";
///     pub const LOGS: &str = "minecraft:logs";
///     pub const MINEABLE: &str = "mymod:mineable/pickaxe";
///     pub const IDS: &[&str] = &[LOGS, MINEABLE];
///
///     pub struct Handles {
///         pub logs: Arc<TagWrapper<Block>>,
///         pub mineable: Arc<TagWrapper<Block>>,
///     }
///
///     pub fn register(tags: &RequiredTags) -> Result<Handles, RequiredTagsError> { ... }
/// }
/// ```
fn expand(input: RequiredTagsInput, tags_crate: &TokenStream2) -> Result<TokenStream2> {
    let registry = normalize_id(&input.registry.value())
        .map_err(|msg| syn::Error::new(input.registry.span(), msg))?;

    let mut seen_ids: HashMap<String, &Ident> = HashMap::new();
    let mut seen_names: HashMap<String, &Ident> = HashMap::new();
    let mut ids = Vec::with_capacity(input.decls.len());

    for decl in &input.decls {
        let id = normalize_id(&decl.id.value()).map_err(|msg| syn::Error::new(decl.id.span(), msg))?;
        if let Some(first) = seen_ids.insert(id.clone(), &decl.name) {
            return Err(syn::Error::new(
                decl.id.span(),
                format!("tag '{id}' is already declared as {first}"),
            ));
        }
        let field = to_snake_case(&decl.name.to_string());
        if let Some(first) = seen_names.insert(field.clone(), &decl.name) {
            return Err(syn::Error::new(
                decl.name.span(),
                format!("{} maps to handle field '{field}', already used by {first}", decl.name),
            ));
        }
        ids.push(id);
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let root = &input.root;
    let ty = &input.object_type;

    let consts = input.decls.iter().zip(&ids).map(|(decl, id)| {
        let decl_attrs = &decl.attrs;
        let name = &decl.name;
        quote! {
            #(#decl_attrs)*
            pub const #name: &str = #id;
        }
    });
    let names: Vec<&Ident> = input.decls.iter().map(|d| &d.name).collect();
    let fields: Vec<Ident> = input.decls.iter().map(|d| field_ident(&d.name)).collect();

    Ok(quote! {
        #(#attrs)*
        #[allow(non_snake_case, non_upper_case_globals)]
        #vis mod #root {
            #[allow(unused_imports)]
            use super::*;

            /// Registry the tags below belong to.
            pub const REGISTRY: &str = #registry;

            #(#consts)*

            /// Every declared tag id, in declaration order.
            pub const IDS: &[&str] = &[#(#names),*];

            /// Handles returned by [`register`].
            pub struct Handles {
                #(pub #fields: ::std::sync::Arc<#tags_crate::TagWrapper<#ty>>,)*
            }

            /// Declare every tag of this module as required.
            pub fn register(
                tags: &#tags_crate::RequiredTags,
            ) -> ::core::result::Result<Handles, #tags_crate::RequiredTagsError> {
                let list = tags.register::<#ty>(#tags_crate::RegistryKey::parse(REGISTRY)?)?;
                ::core::result::Result::Ok(Handles {
                    #(#fields: list.add(#tags_crate::Identifier::parse(#names)?),)*
                })
            }
        }
    })
}

// =============================================================================
// Entry point
// =============================================================================

/// Declare tags that code depends on, validated at compile time.
///
/// Ids without a namespace get `minecraft:`; duplicate ids are rejected.
#[proc_macro]
pub fn required_tags(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as RequiredTagsInput);
    let tags_crate = tags_crate_path();

    match expand(input, &tags_crate) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
