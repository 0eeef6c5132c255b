//! Proc-macros for declarative module registration.
//!
//! `#[modkit::module(...)]` turns a plain struct into a discoverable module:
//! it expands to an `inventory::submit!` of a [`Registrator`] that wires the
//! struct's trait impls (selected by `capabilities`) into the
//! `RegistryBuilder`, plus an `inventory::submit!` of a
//! [`DescriptorRegistrator`] carrying the richer Phase-2/settings/shutdown
//! metadata the kernel's Metadata Registry validates.
//!
//! `#[modkit::lifecycle(...)]` adapts a plain async method into a
//! `StatefulModule` by wrapping it in `WithLifecycle`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{braced, bracketed, parenthesized, parse_macro_input, Ident, ItemImpl, ItemStruct, LitInt, LitStr, Path, Token};

// ---------------------------------------------------------------------
// #[module(...)]
// ---------------------------------------------------------------------

struct ServiceAdvert {
    name: LitStr,
    priority: LitInt,
}

impl Parse for ServiceAdvert {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content;
        parenthesized!(content in input);
        let name: LitStr = content.parse()?;
        content.parse::<Token![,]>()?;
        let priority: LitInt = content.parse()?;
        Ok(Self { name, priority })
    }
}

struct Phase2OpSpec {
    method: LitStr,
    priority: LitInt,
    depends_on: Vec<LitStr>,
    /// Trailing `, required` keyword; absent means optional (the common
    /// case — most phase2 ops only degrade their module on failure).
    required: bool,
}

impl Parse for Phase2OpSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content;
        parenthesized!(content in input);
        let method: LitStr = content.parse()?;
        content.parse::<Token![,]>()?;
        let priority: LitInt = content.parse()?;
        content.parse::<Token![,]>()?;
        let deps_content;
        bracketed!(deps_content in content);
        let deps: Punctuated<LitStr, Token![,]> = deps_content.parse_terminated(LitStr::parse, Token![,])?;
        let mut required = false;
        if content.peek(Token![,]) {
            content.parse::<Token![,]>()?;
            let flag: Ident = content.parse()?;
            match flag.to_string().as_str() {
                "required" => required = true,
                "optional" => required = false,
                other => {
                    return Err(syn::Error::new(
                        flag.span(),
                        format!("unknown phase2 op qualifier `{other}`, expected `required` or `optional`"),
                    ));
                }
            }
        }
        Ok(Self {
            method,
            priority,
            depends_on: deps.into_iter().collect(),
            required,
        })
    }
}

struct ShutdownHookSpec {
    method: LitStr,
    priority: LitInt,
    timeout_ms: LitInt,
}

impl Parse for ShutdownHookSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content;
        parenthesized!(content in input);
        let method: LitStr = content.parse()?;
        content.parse::<Token![,]>()?;
        let priority: LitInt = content.parse()?;
        content.parse::<Token![,]>()?;
        let timeout_ms: LitInt = content.parse()?;
        Ok(Self { method, priority, timeout_ms })
    }
}

#[derive(Default)]
struct ModuleArgs {
    name: Option<LitStr>,
    deps: Vec<LitStr>,
    capabilities: Vec<Ident>,
    client: Option<Path>,
    services: Vec<ServiceAdvert>,
    services_required: Vec<LitStr>,
    settings_schema: Option<LitStr>,
    phase1: Vec<LitStr>,
    phase2_ops: Vec<Phase2OpSpec>,
    shutdown_graceful: Vec<ShutdownHookSpec>,
    shutdown_force: Vec<ShutdownHookSpec>,
    health_check: Option<(LitStr, LitInt)>,
    auto_service: Option<(LitStr, LitInt)>,
    integrity_base: Option<LitStr>,
}

fn parse_bracketed_lit_str_list(input: ParseStream) -> syn::Result<Vec<LitStr>> {
    let content;
    bracketed!(content in input);
    let items: Punctuated<LitStr, Token![,]> = content.parse_terminated(LitStr::parse, Token![,])?;
    Ok(items.into_iter().collect())
}

fn parse_bracketed_ident_list(input: ParseStream) -> syn::Result<Vec<Ident>> {
    let content;
    bracketed!(content in input);
    let items: Punctuated<Ident, Token![,]> = content.parse_terminated(Ident::parse, Token![,])?;
    Ok(items.into_iter().collect())
}

fn parse_bracketed<T: Parse>(input: ParseStream) -> syn::Result<Vec<T>> {
    let content;
    bracketed!(content in input);
    let items: Punctuated<T, Token![,]> = content.parse_terminated(T::parse, Token![,])?;
    Ok(items.into_iter().collect())
}

fn parse_method_and_int(input: ParseStream) -> syn::Result<(LitStr, LitInt)> {
    let content;
    parenthesized!(content in input);
    let method: LitStr = content.parse()?;
    content.parse::<Token![,]>()?;
    let n: LitInt = content.parse()?;
    Ok((method, n))
}

impl Parse for ModuleArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = ModuleArgs::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "name" => args.name = Some(input.parse()?),
                "deps" => args.deps = parse_bracketed_lit_str_list(input)?,
                "capabilities" => args.capabilities = parse_bracketed_ident_list(input)?,
                "client" => args.client = Some(input.parse()?),
                "services" => args.services = parse_bracketed::<ServiceAdvert>(input)?,
                "services_required" => args.services_required = parse_bracketed_lit_str_list(input)?,
                "settings_schema" => args.settings_schema = Some(input.parse()?),
                "phase1" => args.phase1 = parse_bracketed_lit_str_list(input)?,
                "phase2_ops" => args.phase2_ops = parse_bracketed::<Phase2OpSpec>(input)?,
                "shutdown_graceful" => args.shutdown_graceful = parse_bracketed::<ShutdownHookSpec>(input)?,
                "shutdown_force" => args.shutdown_force = parse_bracketed::<ShutdownHookSpec>(input)?,
                "health_check" => args.health_check = Some(parse_method_and_int(input)?),
                "auto_service" => args.auto_service = Some(parse_method_and_int(input)?),
                "integrity_base" => args.integrity_base = Some(input.parse()?),
                other => {
                    return Err(syn::Error::new(key.span(), format!("unknown `#[module]` key `{other}`")));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ModuleArgs);
    let item_struct = parse_macro_input!(item as ItemStruct);

    match expand_module(args, item_struct) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_module(args: ModuleArgs, item_struct: ItemStruct) -> syn::Result<TokenStream2> {
    let struct_ident = &item_struct.ident;
    let name = args
        .name
        .ok_or_else(|| syn::Error::new_spanned(&item_struct, "`#[module(name = \"...\")]` is required"))?;
    let name_str = name.value();

    let deps = &args.deps;
    let has = |cap: &str| args.capabilities.iter().any(|c| c == cap);

    let mut register_calls = Vec::new();
    if has("db") {
        register_calls.push(quote! {
            builder.register_db_with_meta(#name_str, instance.clone());
        });
    }
    if has("rest") {
        register_calls.push(quote! {
            builder.register_rest_with_meta(#name_str, instance.clone());
        });
    }
    if has("rest_host") {
        register_calls.push(quote! {
            builder.register_rest_host_with_meta(#name_str, instance.clone());
        });
    }
    if has("stateful") {
        register_calls.push(quote! {
            builder.register_stateful_with_meta(#name_str, instance.clone());
        });
    }
    if has("phase2") {
        register_calls.push(quote! {
            builder.register_phase2_with_meta(#name_str, instance.clone());
        });
    }

    let deps_array = quote! { &[#(#deps),*] };

    let registrator = quote! {
        ::modkit::inventory::submit! {
            ::modkit::registry::Registrator(|builder: &mut ::modkit::registry::RegistryBuilder| {
                let instance = ::std::sync::Arc::new(#struct_ident::default());
                builder.register_core_with_meta(#name_str, #deps_array, instance.clone());
                #(#register_calls)*
            })
        }
    };

    let services: Vec<TokenStream2> = args
        .services
        .iter()
        .map(|s| {
            let n = &s.name;
            let p = &s.priority;
            quote! { ::modkit::descriptor::ServiceAdvert { name: #n, priority: #p } }
        })
        .collect();

    let services_required = &args.services_required;
    let phase1 = &args.phase1;

    let phase2_ops: Vec<TokenStream2> = args
        .phase2_ops
        .iter()
        .map(|op| {
            let method = &op.method;
            let priority = &op.priority;
            let deps = &op.depends_on;
            let required = op.required;
            quote! {
                ::modkit::descriptor::Phase2Operation {
                    method_name: #method,
                    depends_on: &[#(#deps),*],
                    priority: #priority,
                    required: #required,
                }
            }
        })
        .collect();

    let shutdown_hooks: Vec<TokenStream2> = args
        .shutdown_graceful
        .iter()
        .map(|h| (h, quote! { ::modkit::descriptor::ShutdownKind::Graceful }))
        .chain(args.shutdown_force.iter().map(|h| (h, quote! { ::modkit::descriptor::ShutdownKind::Force })))
        .map(|(h, kind)| {
            let method = &h.method;
            let priority = &h.priority;
            let timeout_ms = &h.timeout_ms;
            quote! {
                ::modkit::descriptor::ShutdownHookDecl {
                    method_name: #method,
                    kind: #kind,
                    priority: #priority,
                    timeout_ms: #timeout_ms,
                }
            }
        })
        .collect();

    let health_check = match &args.health_check {
        Some((method, interval)) => quote! {
            Some(::modkit::descriptor::HealthCheckDecl { method_name: #method, interval_seconds: #interval })
        },
        None => quote! { None },
    };

    let auto_service_creation = match &args.auto_service {
        Some((svc_name, priority)) => quote! {
            Some(::modkit::descriptor::AutoServiceCreation { service_name: #svc_name, priority: #priority })
        },
        None => quote! { None },
    };

    let data_integrity = match &args.integrity_base {
        Some(base) => quote! {
            Some(::modkit::descriptor::DataIntegrityDecl { requires_base: #base })
        },
        None => quote! { None },
    };

    let settings_schema = match &args.settings_schema {
        Some(s) => quote! { Some(#s) },
        None => quote! { None },
    };

    let descriptor_registrator = quote! {
        ::modkit::inventory::submit! {
            ::modkit::descriptor::DescriptorRegistrator(|| ::modkit::descriptor::ModuleDescriptor {
                module_id: #name_str,
                dependencies: #deps_array,
                services_advertised: &[#(#services),*],
                services_required: &[#(#services_required),*],
                settings_schema: #settings_schema,
                phase1_sequence: &[#(#phase1),*],
                phase2_operations: &[#(#phase2_ops),*],
                shutdown_hooks: &[#(#shutdown_hooks),*],
                health_check: #health_check,
                api_endpoints: &[],
                data_integrity: #data_integrity,
                auto_service_creation: #auto_service_creation,
            })
        }
    };

    let client_fn = match &args.client {
        Some(path) => {
            let fn_ident = format_ident!("expose_{}_client", name_str.replace(['-', '.'], "_"));
            let last_segment = &path.segments.last().unwrap().ident;
            let _ = last_segment; // kept for readability of generated code only
            quote! {
                /// Registers this module's client implementation with the
                /// shared `ClientHub` so other modules can look it up by trait.
                pub fn #fn_ident(
                    ctx: &::modkit::ModuleCtx,
                    api: &::std::sync::Arc<dyn #path>,
                ) -> ::anyhow::Result<()> {
                    ctx.client_hub().register::<dyn #path>(api.clone());
                    Ok(())
                }
            }
        }
        None => quote! {},
    };

    Ok(quote! {
        #item_struct

        #registrator
        #descriptor_registrator
        #client_fn
    })
}

// ---------------------------------------------------------------------
// #[lifecycle(...)]
// ---------------------------------------------------------------------

struct LifecycleArgs {
    method: Ident,
    stop_timeout: Option<LitStr>,
    await_ready: bool,
}

impl Parse for LifecycleArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut method = None;
        let mut stop_timeout = None;
        let mut await_ready = false;
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "method" => {
                    let lit: LitStr = input.parse()?;
                    method = Some(Ident::new(&lit.value(), lit.span()));
                }
                "stop_timeout" => stop_timeout = Some(input.parse()?),
                "await_ready" => {
                    let lit: syn::LitBool = input.parse()?;
                    await_ready = lit.value;
                }
                other => return Err(syn::Error::new(key.span(), format!("unknown `#[lifecycle]` key `{other}`"))),
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(Self {
            method: method.ok_or_else(|| input.error("`#[lifecycle(method = \"...\")]` is required"))?,
            stop_timeout,
            await_ready,
        })
    }
}

#[proc_macro_attribute]
pub fn lifecycle(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as LifecycleArgs);
    let item_impl = parse_macro_input!(item as ItemImpl);
    expand_lifecycle(args, item_impl).into()
}

fn expand_lifecycle(args: LifecycleArgs, item_impl: ItemImpl) -> TokenStream2 {
    let self_ty = &item_impl.self_ty;
    let method = &args.method;
    let timeout_expr = match &args.stop_timeout {
        Some(lit) => quote! { #lit.parse::<::humantime::Duration>().expect("invalid stop_timeout").into() },
        None => quote! { ::std::time::Duration::from_secs(30) },
    };
    let await_ready = args.await_ready;

    // Does the annotated method take a `ready: ReadySignal` parameter in
    // addition to `cancel`? Inspected from the impl block so callers don't
    // have to restate it in the attribute.
    let has_ready_param = item_impl
        .items
        .iter()
        .find_map(|item| match item {
            syn::ImplItem::Fn(f) if f.sig.ident == *method => Some(f.sig.inputs.len()),
            _ => None,
        })
        .map(|input_count| input_count == 3) // &self, cancel, ready
        .unwrap_or(false);

    let runnable_impl = if has_ready_param {
        quote! {
            #[::modkit::async_trait]
            impl ::modkit::lifecycle::Runnable for #self_ty {
                async fn run(
                    self: ::std::sync::Arc<Self>,
                    cancel: ::tokio_util::sync::CancellationToken,
                ) -> ::anyhow::Result<()> {
                    let (tx, _rx) = ::tokio::sync::oneshot::channel();
                    self.#method(cancel, ::modkit::lifecycle::ReadySignal::from_sender(tx)).await
                }
            }
        }
    } else {
        quote! {
            #[::modkit::async_trait]
            impl ::modkit::lifecycle::Runnable for #self_ty {
                async fn run(
                    self: ::std::sync::Arc<Self>,
                    cancel: ::tokio_util::sync::CancellationToken,
                ) -> ::anyhow::Result<()> {
                    self.#method(cancel).await
                }
            }
        }
    };

    let with_ready_mode = if has_ready_param {
        quote! {
            fn __run_ready(
                inner: ::std::sync::Arc<#self_ty>,
                cancel: ::tokio_util::sync::CancellationToken,
                ready: ::modkit::lifecycle::ReadySignal,
            ) -> ::std::pin::Pin<::std::boxed::Box<dyn ::std::future::Future<Output = ::anyhow::Result<()>> + Send>> {
                ::std::boxed::Box::pin(async move { inner.#method(cancel, ready).await })
            }
            lc.with_ready_mode(#await_ready, true, Some(__run_ready as _))
        }
    } else {
        quote! {
            lc.with_ready_mode(#await_ready, false, None)
        }
    };

    quote! {
        #item_impl

        #runnable_impl

        impl #self_ty {
            /// Wraps this type in the lifecycle state machine, yielding a
            /// `StatefulModule` the registry can start/stop.
            pub fn into_module(self) -> ::modkit::lifecycle::WithLifecycle<Self> {
                let lc = ::modkit::lifecycle::WithLifecycle::new(self).with_stop_timeout(#timeout_expr);
                #with_ready_mode
            }
        }
    }
}
