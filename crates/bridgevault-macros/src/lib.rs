use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, punctuated::Punctuated, Expr, ItemFn, Token};

/// Wraps a function returning `crate::Result<_>` so that any error leaving it
/// carries an extra context frame located at the caller.
///
/// The attribute takes `format!`-style arguments evaluated before the body
/// runs, so they may reference the function's parameters:
///
/// ```ignore
/// #[error_context("migrating backup {}", day)]
/// fn migrate_day(day: &str) -> Result<()> { ... }
/// ```
#[proc_macro_attribute]
pub fn error_context(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr with Punctuated::<Expr, Token![,]>::parse_terminated);
    let mut function = parse_macro_input!(item as ItemFn);
    let block = function.block;
    let args = args.iter();

    function.attrs.push(parse_quote!(#[track_caller]));
    function.block = Box::new(parse_quote!({
        let __vault_location = std::panic::Location::caller();
        let __vault_message = format!(#(#args),*);
        let __vault_result: crate::Result<_> = (|| #block)();
        __vault_result.map_err(|__vault_error| {
            __vault_error.context_at(__vault_message, __vault_location)
        })
    }));

    TokenStream::from(quote!(#function))
}
