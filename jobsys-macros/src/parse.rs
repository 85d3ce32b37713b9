use proc_macro2::{Span, TokenStream};
use syn::Attribute;

pub(crate) fn parse_string(lit: syn::Lit, span: Span, field: &str) -> Result<String, syn::Error> {
    match lit {
        syn::Lit::Str(s) => Ok(s.value()),
        syn::Lit::Verbatim(s) => Ok(s.to_string()),
        _ => Err(syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as string."),
        )),
    }
}

pub(crate) fn parse_int(lit: syn::Lit, span: Span, field: &str) -> Result<usize, syn::Error> {
    match lit {
        syn::Lit::Int(lit) => lit.base10_parse::<usize>().map_err(|e| {
            syn::Error::new(
                span,
                format!("Failed to parse value of `{field}` as integer: {e}"),
            )
        }),
        _ => Err(syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as integer."),
        )),
    }
}

/// `#[test]`, `#[core::prelude::*::test]` or `#[std::prelude::*::test]`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let syn::Meta::Path(path) = &attr.meta else {
        return false;
    };

    if path.leading_colon.is_none() && path.is_ident("test") {
        return true;
    }

    let candidates = [
        ["core", "prelude", "*", "test"],
        ["std", "prelude", "*", "test"],
    ];

    path.segments.len() == candidates[0].len()
        && candidates.into_iter().any(|segments| {
            path.segments.iter().zip(segments).all(|(segment, expected)| {
                segment.arguments.is_none() && (expected == "*" || segment.ident == expected)
            })
        })
}

pub(crate) fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}
