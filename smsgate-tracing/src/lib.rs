//! `#[traced]`: trace events on entry to and exit from a function.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
//! async fn send(&self) { /* ... */ }
//! ```
//!
//! `instrument(...)` is forwarded verbatim to `tracing::instrument`, and
//! `timing(...)` appends the elapsed time to the exit event. Callers need the
//! `tracing` crate in scope.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, LitStr, Stmt, parse::Parse, parse_macro_input, parse_quote, parse_quote_spanned};

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

/// Unit used when reporting elapsed time on exit.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Precision {
    fn from_unit(unit: &str) -> Option<Self> {
        match unit {
            "ns" | "nanos" | "nanoseconds" => Some(Self::Nanos),
            "us" | "micros" | "microseconds" => Some(Self::Micros),
            "ms" | "millis" | "milliseconds" => Some(Self::Millis),
            "s" | "secs" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    /// Expression rendering a `std::time::Duration` named `elapsed`.
    fn render(self) -> syn::Expr {
        match self {
            Self::Nanos => parse_quote!(format!("{} ns elapsed", elapsed.as_nanos())),
            Self::Micros => parse_quote!(format!("{} us elapsed", elapsed.as_micros())),
            Self::Millis => parse_quote!(format!("{} ms elapsed", elapsed.as_millis())),
            Self::Seconds => parse_quote!(format!("{} s elapsed", elapsed.as_secs())),
        }
    }
}

impl Parse for Precision {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let unit = content.parse::<LitStr>()?;

        Self::from_unit(&unit.value())
            .ok_or_else(|| syn::Error::new(unit.span(), "unknown precision, expected ns, us, ms or s"))
    }
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();

            if lookahead.peek(keywords::timing) {
                let keyword = input.parse::<keywords::timing>()?;
                if attributes.timing.replace(input.parse()?).is_some() {
                    return Err(syn::Error::new(keyword.span, "`timing` given more than once"));
                }
            } else if lookahead.peek(keywords::instrument) {
                let keyword = input.parse::<keywords::instrument>()?;
                let fields = if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    content.parse()?
                } else {
                    TokenStream::new()
                };
                if attributes.instrument.replace(fields).is_some() {
                    return Err(syn::Error::new(keyword.span, "`instrument` given more than once"));
                }
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(attributes)
    }
}

fn guard(name: &str, timing: Option<Precision>) -> Vec<Stmt> {
    let on_exit: Stmt = timing.map_or_else(
        || parse_quote! { tracing::trace!("OnExit: {}", #name); },
        |precision| {
            let render = precision.render();
            parse_quote! {
                {
                    let elapsed = self.started.elapsed();
                    tracing::trace!("OnExit: {} ({})", #name, #render);
                }
            }
        },
    );

    parse_quote! {
        #[allow(dead_code)]
        struct __TracedGuard {
            started: std::time::Instant,
        }

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        tracing::trace!("OnEnter: {}", #name);
        let __traced_guard = __TracedGuard {
            started: std::time::Instant::now(),
        };
    }
}

/// Emit `OnEnter`/`OnExit` trace events around the attributed function.
///
/// # Panics
///
/// Never; malformed input is reported as a compile error.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote! { #[allow(clippy::items_after_statements)] });

    if let Some(fields) = args.instrument {
        let span = item_fn.sig.ident.span();
        item_fn
            .attrs
            .push(parse_quote_spanned! {span=> #[tracing::instrument(#fields)] });
    }

    let name = item_fn.sig.ident.to_string();
    let mut stmts = guard(&name, args.timing);
    stmts.append(&mut item_fn.block.stmts);
    item_fn.block.stmts = stmts;

    proc_macro::TokenStream::from(quote! { #item_fn })
}
