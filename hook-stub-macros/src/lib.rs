use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parse, parse::ParseStream, parse_macro_input, FnArg, ItemFn, Result, Token};

struct HookArgs {
    interceptor: syn::Expr,
    symbol: syn::LitStr,
    id: Option<syn::LitStr>,
    export: bool,
}

impl Parse for HookArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut interceptor = None;
        let mut symbol = None;
        let mut id = None;
        let mut export = true;

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "interceptor" => interceptor = Some(input.parse()?),
                "symbol" => symbol = Some(input.parse()?),
                "id" => id = Some(input.parse()?),
                "export" => export = input.parse::<syn::LitBool>()?.value,
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown parameter: {}", ident),
                    ))
                }
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(HookArgs {
            interceptor: interceptor.ok_or_else(|| input.error("missing interceptor"))?,
            symbol: symbol.ok_or_else(|| input.error("missing symbol"))?,
            id,
            export,
        })
    }
}

/// generates the entry wrapper for one hooked function
///
/// the annotated function's body is the substitute: it runs when the
/// interceptor fires and may refer to the interceptor as `stub`. Parameters
/// are forwarded to the original as well, so they must be `Copy`. A `symbol`
/// missing from the interceptor's table terminates the process on first call.
///
/// # Example
/// ```ignore
/// static READ_STUB: Lazy<Arc<Interceptor>> =
///     Lazy::new(|| hook_stub::global().register(&hook_table![("libc.so.6", "read")]));
///
/// #[hook_stub(interceptor = READ_STUB, symbol = "read")]
/// pub extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
///     -1
/// }
/// ```
#[proc_macro_attribute]
pub fn hook_stub(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as HookArgs);
    let input_fn = parse_macro_input!(input as ItemFn);

    let HookArgs {
        interceptor,
        symbol,
        id,
        export,
    } = args;

    let fn_attrs = &input_fn.attrs;
    let fn_vis = &input_fn.vis;
    let fn_name = &input_fn.sig.ident;
    let fn_inputs = &input_fn.sig.inputs;
    let fn_output = &input_fn.sig.output;
    let substitute_body = &input_fn.block;
    let hook_id = id.map(|lit| lit.value()).unwrap_or_else(|| fn_name.to_string());

    if let Some(receiver) = fn_inputs.iter().find(|arg| matches!(arg, FnArg::Receiver(_))) {
        return syn::Error::new_spanned(receiver, "hooked functions cannot take self")
            .to_compile_error()
            .into();
    }

    // extract parameter names and types for forwarding to the original
    let param_names: Vec<_> = fn_inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg {
                if let syn::Pat::Ident(pat_ident) = &*pat_type.pat {
                    return Some(&pat_ident.ident);
                }
            }
            None
        })
        .collect();

    let param_types: Vec<_> = fn_inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg {
                return Some(&pat_type.ty);
            }
            None
        })
        .collect();

    if param_names.len() != param_types.len() {
        return syn::Error::new_spanned(fn_inputs, "hooked function parameters must be plain identifiers")
            .to_compile_error()
            .into();
    }

    let export_attr = if export {
        quote! { #[no_mangle] }
    } else {
        quote! {}
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #export_attr
        #fn_vis extern "C" fn #fn_name(#fn_inputs) #fn_output {
            const HOOK_ID: &str = #hook_id;
            type Original = extern "C" fn(#(#param_types),*) #fn_output;

            let stub: &::hook_stub::Interceptor = &#interceptor;

            // safety: the generator pairs each symbol with its real signature
            let original: Original = unsafe { stub.require_original::<Original>(#symbol) };

            let mut substitute =
                ::hook_stub::SubstituteFn::new(|stub: &::hook_stub::Interceptor| #substitute_body);

            stub.invoke(
                ::std::option::Option::Some(HOOK_ID),
                &mut substitute,
                || original(#(#param_names),*),
            )
        }
    };

    TokenStream::from(expanded)
}
