//! Procedural macros for edge-dispatch.
//!
//! This crate provides the `#[edge_function]` attribute macro, which turns a
//! plain async handler into an in-process function that a `LocalPlatform`
//! can host.
//!
//! # Example
//!
//! ```ignore
//! use edge_dispatch::prelude::*;
//!
//! #[edge_function(name = "hello", description = "Greets the caller")]
//! async fn hello(req: EdgeRequest, ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
//!     Ok(EdgeResponse::text("Hello, World!"))
//! }
//!
//! let mut platform = LocalPlatform::new();
//! platform.register(HelloFunction::NAME, HelloFunction::factory)?;
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, punctuated::Punctuated, Expr, ExprLit, ItemFn, Lit, Meta, Token};

/// Attributes for the `#[edge_function]` macro.
#[derive(Default, Debug)]
struct EdgeFunctionAttrs {
    /// Name the function is routed under.
    name: Option<String>,
    /// Optional description.
    description: Option<String>,
}

impl EdgeFunctionAttrs {
    fn parse_meta_list(metas: Punctuated<Meta, Token![,]>) -> syn::Result<Self> {
        let mut attrs = EdgeFunctionAttrs::default();

        for meta in metas {
            let nv = match meta {
                Meta::NameValue(nv) => nv,
                other => return Err(syn::Error::new_spanned(other, "expected name = value")),
            };

            let ident = nv
                .path
                .get_ident()
                .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected identifier"))?
                .to_string();

            let value = match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit_str),
                    ..
                }) => lit_str.value(),
                _ => return Err(syn::Error::new_spanned(&nv.value, "expected string literal")),
            };

            match ident.as_str() {
                "name" => attrs.name = Some(value),
                "description" => attrs.description = Some(value),
                _ => {
                    return Err(syn::Error::new_spanned(
                        nv.path,
                        format!("unknown attribute: {}", ident),
                    ));
                }
            }
        }

        Ok(attrs)
    }
}

/// Define an in-process edge function.
///
/// The annotated `async fn` is kept as written and must take
/// `(EdgeRequest, &FunctionContext)` and return
/// `Result<EdgeResponse, FunctionError>`. Alongside it the macro generates a
/// `<PascalName>Function` struct implementing `EdgeFunction`, with a
/// `NAME` constant and a `factory()` suitable for `LocalPlatform::register`.
///
/// # Attributes
///
/// - `name` (optional): routed function name, defaults to the fn name with
///   underscores replaced by hyphens
/// - `description` (optional): human-readable description
#[proc_macro_attribute]
pub fn edge_function(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_edge_function(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_edge_function(
    args: Punctuated<Meta, Token![,]>,
    input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = EdgeFunctionAttrs::parse_meta_list(args)?;

    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input_fn.sig,
            "edge_function must be async",
        ));
    }
    if input_fn.sig.inputs.len() != 2 {
        return Err(syn::Error::new_spanned(
            &input_fn.sig.inputs,
            "edge_function takes (EdgeRequest, &FunctionContext)",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let struct_name = format_ident!("{}Function", to_pascal_case(&fn_name.to_string()));

    let function_name = attrs
        .name
        .unwrap_or_else(|| fn_name.to_string().replace('_', "-"));
    let description = attrs.description.unwrap_or_default();

    let expanded = quote! {
        #input_fn

        /// Generated edge function.
        #[derive(Default)]
        #fn_vis struct #struct_name;

        impl #struct_name {
            /// Name the function is routed under.
            pub const NAME: &'static str = #function_name;

            /// Create a new instance of the function.
            pub fn new() -> Self {
                Self
            }

            /// Human-readable description.
            pub fn description() -> &'static str {
                #description
            }

            /// Factory for `LocalPlatform::register`.
            pub fn factory() -> ::std::boxed::Box<dyn ::edge_dispatch::prelude::EdgeFunction> {
                ::std::boxed::Box::new(Self)
            }
        }

        #[::edge_dispatch::prelude::async_trait]
        impl ::edge_dispatch::prelude::EdgeFunction for #struct_name {
            async fn fetch(
                &self,
                request: ::edge_dispatch::prelude::EdgeRequest,
                ctx: &::edge_dispatch::prelude::FunctionContext,
            ) -> ::std::result::Result<
                ::edge_dispatch::prelude::EdgeResponse,
                ::edge_dispatch::prelude::FunctionError,
            > {
                #fn_name(request, ctx).await
            }

            fn name(&self) -> &str {
                #function_name
            }
        }
    };

    Ok(expanded)
}

/// Convert a snake_case string to PascalCase.
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}
