use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::parse::Parser;
use syn::spanned::Spanned;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

/// Config used in case of the attribute not being able to build a valid config
const DEFAULT_ERROR_CONFIG: FinalConfig = FinalConfig {
    flavor: SystemFlavor::Inline,
    worker_threads: None,
};

/// With
///
/// ```rust,no_run
/// #[jobsys::main(flavor = "stealing", worker_threads = 2)]
/// fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// `args` holds `flavor = "stealing", worker_threads = 2` and `item` the
/// function itself. The body is moved into a closure run by
/// `JobSystem::install`.
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    // On failure we still expand to an item close to the expected output, so
    // IDE completions keep working.
    let input: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        let msg = "the main function cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.ident, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, false))
    };

    match config {
        Ok(config) => parse_knobs(input, false, config),
        Err(e) => token_stream_with_error(parse_knobs(input, false, DEFAULT_ERROR_CONFIG), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else if !input.sig.inputs.is_empty() {
        let msg = "test functions cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.inputs, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, true))
    };

    match config {
        Ok(config) => parse_knobs(input, true, config),
        Err(e) => token_stream_with_error(parse_knobs(input, true, DEFAULT_ERROR_CONFIG), e),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum SystemFlavor {
    Inline,
    Stealing,
}

impl SystemFlavor {
    fn from_str(s: &str) -> Result<SystemFlavor, String> {
        match s {
            "stealing" => Ok(SystemFlavor::Stealing),
            "inline" => Ok(SystemFlavor::Inline),
            _ => Err(format!(
                "No such job system flavor `{s}`. The flavors are `stealing` and `inline`."
            )),
        }
    }
}

struct FinalConfig {
    flavor: SystemFlavor,
    worker_threads: Option<usize>,
}

struct ConfigBuilder {
    default_flavor: SystemFlavor,
    flavor: Option<SystemFlavor>,
    worker_threads: Option<(usize, Span)>,
    is_test: bool,
}

impl ConfigBuilder {
    fn new(is_test: bool) -> Self {
        ConfigBuilder {
            default_flavor: match is_test {
                true => SystemFlavor::Inline,
                false => SystemFlavor::Stealing,
            },
            flavor: None,
            worker_threads: None,
            is_test,
        }
    }

    fn macro_name(&self) -> &'static str {
        if self.is_test {
            "jobsys::test"
        } else {
            "jobsys::main"
        }
    }

    fn set_flavor(&mut self, flavor: syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.flavor.is_some() {
            return Err(syn::Error::new(span, "`flavor` set multiple times."));
        }

        let flavor_str = parse_string(flavor, span, "flavor")?;
        let flavor =
            SystemFlavor::from_str(&flavor_str).map_err(|err| syn::Error::new(span, err))?;
        self.flavor = Some(flavor);

        Ok(())
    }

    fn set_worker_threads(
        &mut self,
        worker_threads: syn::Lit,
        span: Span,
    ) -> Result<(), syn::Error> {
        if self.worker_threads.is_some() {
            return Err(syn::Error::new(
                span,
                "`worker_threads` set multiple times.",
            ));
        }

        let worker_threads = parse_int(worker_threads, span, "worker_threads")?;
        if worker_threads == 0 {
            return Err(syn::Error::new(span, "`worker_threads` may not be 0."));
        }
        self.worker_threads = Some((worker_threads, span));

        Ok(())
    }

    fn build(&self) -> Result<FinalConfig, syn::Error> {
        // Asking for workers selects the pool.
        let flavor = match (self.flavor, self.worker_threads) {
            (Some(flavor), _) => flavor,
            (None, Some(_)) => SystemFlavor::Stealing,
            (None, None) => self.default_flavor,
        };

        let worker_threads = match (flavor, self.worker_threads) {
            (SystemFlavor::Inline, Some((_, worker_threads_span))) => {
                let msg = format!(
                    "The `worker_threads` option requires the `stealing` flavor. Use `#[{}(flavor = \"stealing\")]`",
                    self.macro_name(),
                );
                return Err(syn::Error::new(worker_threads_span, msg));
            }
            (SystemFlavor::Stealing, Some((worker_threads, _))) => Some(worker_threads),
            (_, None) => None,
        };

        Ok(FinalConfig {
            flavor,
            worker_threads,
        })
    }
}

fn build_config(
    input: &syn::ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if let Some(asyncness) = input.sig.asyncness {
        let msg = "jobsys runs plain functions, remove the `async` keyword";
        return Err(syn::Error::new_spanned(asyncness, msg));
    }

    let mut config = ConfigBuilder::new(is_test);
    let macro_name = config.macro_name();

    for arg in args {
        match arg {
            syn::Meta::NameValue(namevalue) => {
                let ident = namevalue
                    .path
                    .get_ident()
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&namevalue, "Must have specified ident")
                    })?
                    .to_string()
                    .to_lowercase();
                let lit = match &namevalue.value {
                    syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
                    expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
                };
                match ident.as_str() {
                    "worker_threads" => config.set_worker_threads(lit.clone(), lit.span())?,
                    "flavor" => config.set_flavor(lit.clone(), lit.span())?,
                    name => {
                        let msg = format!(
                            "Unknown attribute {name} is specified; expected one of: `flavor`, `worker_threads`",
                        );
                        return Err(syn::Error::new_spanned(namevalue, msg));
                    }
                }
            }
            syn::Meta::Path(path) => {
                let name = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&path, "Must have specified ident"))?
                    .to_string()
                    .to_lowercase();
                let msg = match name.as_str() {
                    "stealing" | "inline" => {
                        format!("Set the flavor with #[{macro_name}(flavor = \"{name}\")].")
                    }
                    "flavor" | "worker_threads" => {
                        format!("The `{name}` attribute requires an argument.")
                    }
                    name => format!(
                        "Unknown attribute {name} is specified; expected one of: `flavor`, `worker_threads`."
                    ),
                };
                return Err(syn::Error::new_spanned(path, msg));
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Unknown attribute inside the macro",
                ));
            }
        }
    }

    config.build()
}

fn parse_knobs(mut input: syn::ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    // Type mismatches are reported on the last statement of the body.
    let last_stmt_span = input
        .block
        .stmts
        .last()
        .map_or_else(Span::call_site, |stmt| stmt.span());

    let mut system = match config.flavor {
        SystemFlavor::Inline => quote_spanned! {last_stmt_span=>
            jobsys::runtime::Builder::new_inline()
        },
        SystemFlavor::Stealing => quote_spanned! {last_stmt_span=>
            jobsys::runtime::Builder::new_stealing()
        },
    };

    if let Some(v) = config.worker_threads {
        system = quote_spanned! {last_stmt_span=> #system.worker_threads(#v) };
    }

    if is_test {
        input.attrs.push(syn::parse_quote! { #[::core::prelude::v1::test] });
    }

    let output_type = match &input.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ret_type) => quote! { #ret_type },
    };

    let body = &input.block;
    let new_block: syn::Block = syn::parse_quote_spanned! {last_stmt_span=>
        {
            let body = move || -> #output_type #body;

            #[allow(clippy::expect_used, clippy::needless_return)]
            {
                return #system
                    .try_build()
                    .expect("Failed building the JobSystem")
                    .install(body);
            }
        }
    };

    input.block = Box::new(new_block);
    quote! { #input }
}
