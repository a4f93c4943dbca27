// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{TransformOptions, RUNTIME_ALIAS};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::{parse_quote, FnArg, Item, ReturnType, Type, Visibility};

pub(crate) fn rewrite_file(file: &mut syn::File, options: &TransformOptions) -> usize {
    let items = std::mem::take(&mut file.items);
    let (items, wrapped) = rewrite_items(items, options);
    file.items = items;
    wrapped
}

pub(crate) fn prepend_preamble(file: &mut syn::File) {
    let alias = runtime();
    let preamble: Item = parse_quote! {
        #[allow(unused_imports)]
        use taist_runtime as #alias;
    };
    file.items.insert(0, preamble);
}

fn rewrite_items(items: Vec<Item>, options: &TransformOptions) -> (Vec<Item>, usize) {
    let pub_types = collect_pub_types(&items);
    let mut wrapped = 0;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Fn(f) => rewrite_fn(f, options, &mut out, &mut wrapped),
            Item::Static(s) => rewrite_static(s, options, &mut out, &mut wrapped),
            Item::Const(c) => rewrite_const(c, options, &mut out, &mut wrapped),
            Item::Impl(i) => rewrite_impl(i, &pub_types, options, &mut out, &mut wrapped),
            Item::Mod(mut module) => {
                if let Some((brace, inner)) = module.content.take() {
                    let (inner, inner_wrapped) = rewrite_items(inner, options);
                    module.content = Some((brace, inner));
                    wrapped += inner_wrapped;
                }
                out.push(Item::Mod(module));
            }
            other => out.push(other),
        }
    }
    (out, wrapped)
}

fn collect_pub_types(items: &[Item]) -> HashSet<String> {
    let mut types = HashSet::new();
    for item in items {
        match item {
            Item::Struct(s) if is_pub(&s.vis) => {
                types.insert(s.ident.to_string());
            }
            Item::Enum(e) if is_pub(&e.vis) => {
                types.insert(e.ident.to_string());
            }
            _ => {}
        }
    }
    types
}

fn is_pub(vis: &Visibility) -> bool {
    matches!(vis, Visibility::Public(_))
}

fn excluded(name: &str, options: &TransformOptions) -> bool {
    name.starts_with('_') || options.exclude_functions.iter().any(|x| x == name)
}

/// Wrapping changes nothing observable for these, so they are left alone:
/// generic functions (the capture bounds would leak into the public
/// signature), unsafe and extern functions.
fn unwrappable(sig: &syn::Signature) -> bool {
    sig.generics.type_params().next().is_some()
        || sig.generics.const_params().next().is_some()
        || sig.unsafety.is_some()
        || sig.abi.is_some()
}

fn ret_is(output: &ReturnType, ident: &str) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };
    let Type::Path(path) = &**ty else {
        return false;
    };
    path.path
        .segments
        .last()
        .is_some_and(|segment| segment.ident == ident)
}

fn runtime() -> syn::Ident {
    syn::Ident::new(RUNTIME_ALIAS, Span::call_site())
}

/// Replaces every non-receiver parameter pattern with a plain reserved
/// ident, returning the idents for forwarding and capture.
fn rename_params(sig: &mut syn::Signature) -> Vec<syn::Ident> {
    let mut idents = vec![];
    for input in sig.inputs.iter_mut() {
        if let FnArg::Typed(pat_type) = input {
            let ident = format_ident!("__taist_arg{}", idents.len());
            pat_type.pat = Box::new(syn::Pat::Ident(syn::PatIdent {
                attrs: vec![],
                by_ref: None,
                mutability: None,
                ident: ident.clone(),
                subpat: None,
            }));
            idents.push(ident);
        }
    }
    idents
}

fn capture_expr(idents: &[syn::Ident]) -> TokenStream {
    let rt = runtime();
    if idents.is_empty() {
        quote!(None)
    } else {
        // A tuple of references serializes as the argument array.
        quote!(Some(#rt::capture(&(#(&#idents,)*))))
    }
}

fn wrapped_block(sig: &syn::Signature, qualified: &str, capture: TokenStream, call: TokenStream) -> syn::Block {
    let rt = runtime();
    let expr = match (sig.asyncness.is_some(), ret_is(&sig.output, "Result")) {
        (false, false) => quote!(#rt::traced(#qualified, #capture, move || #call)),
        (false, true) => quote!(#rt::traced_result(#qualified, #capture, move || #call)),
        (true, false) => quote!(#rt::traced_async(#qualified, #capture, #call).await),
        (true, true) => quote!(#rt::traced_result_async(#qualified, #capture, #call).await),
    };
    parse_quote!({ #expr })
}

fn impl_ident(ident: &syn::Ident) -> syn::Ident {
    format_ident!("__taist_impl_{}", ident)
}

fn rewrite_fn(
    mut f: syn::ItemFn,
    options: &TransformOptions,
    out: &mut Vec<Item>,
    wrapped: &mut usize,
) {
    let name = f.sig.ident.to_string();
    if !is_pub(&f.vis) || excluded(&name, options) || unwrappable(&f.sig) {
        out.push(Item::Fn(f));
        return;
    }

    if ret_is(&f.sig.output, "HandlerTree") {
        // The export shape for nested handler maps: the built tree goes
        // through the recursive decorator under the export's name.
        let rt = runtime();
        let body = f.block.clone();
        f.block = Box::new(parse_quote!({ #rt::instrument_tree(#name, #body) }));
        out.push(Item::Fn(f));
        *wrapped += 1;
        return;
    }

    let qualified = format!("{}.{}", options.module_prefix, name);
    let renamed_ident = impl_ident(&f.sig.ident);

    let mut renamed = f.clone();
    renamed.sig.ident = renamed_ident.clone();
    renamed.vis = Visibility::Inherited;

    let mut wrapper_sig = f.sig.clone();
    let args = rename_params(&mut wrapper_sig);
    let capture = capture_expr(&args);
    let call = quote!(#renamed_ident(#(#args),*));
    let wrapper = syn::ItemFn {
        attrs: f.attrs.clone(),
        vis: f.vis.clone(),
        sig: wrapper_sig,
        block: Box::new(wrapped_block(&f.sig, &qualified, capture, call)),
    };

    out.push(Item::Fn(renamed));
    out.push(Item::Fn(wrapper));
    *wrapped += 1;
}

fn rewrite_impl(
    mut imp: syn::ItemImpl,
    pub_types: &HashSet<String>,
    options: &TransformOptions,
    out: &mut Vec<Item>,
    wrapped: &mut usize,
) {
    let type_name = match (&imp.trait_, &*imp.self_ty) {
        (None, Type::Path(path)) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    };
    let Some(type_name) = type_name.filter(|name| pub_types.contains(name)) else {
        out.push(Item::Impl(imp));
        return;
    };

    let mut rewritten = Vec::with_capacity(imp.items.len());
    for item in std::mem::take(&mut imp.items) {
        let syn::ImplItem::Fn(method) = item else {
            rewritten.push(item);
            continue;
        };
        let name = method.sig.ident.to_string();
        // `new` is the constructor here; it stays unwrapped like the
        // underscore-prefixed helpers.
        if !is_pub(&method.vis)
            || name == "new"
            || excluded(&name, options)
            || unwrappable(&method.sig)
        {
            rewritten.push(syn::ImplItem::Fn(method));
            continue;
        }

        let qualified = format!("{type_name}.{name}");
        let renamed_ident = impl_ident(&method.sig.ident);

        let mut renamed = method.clone();
        renamed.sig.ident = renamed_ident.clone();
        renamed.vis = Visibility::Inherited;

        let mut wrapper_sig = method.sig.clone();
        let has_receiver = matches!(wrapper_sig.inputs.first(), Some(FnArg::Receiver(_)));
        let args = rename_params(&mut wrapper_sig);
        let capture = capture_expr(&args);
        let call = if has_receiver {
            quote!(self.#renamed_ident(#(#args),*))
        } else {
            quote!(Self::#renamed_ident(#(#args),*))
        };
        let wrapper = syn::ImplItemFn {
            attrs: method.attrs.clone(),
            vis: method.vis.clone(),
            defaultness: None,
            sig: wrapper_sig,
            block: wrapped_block(&method.sig, &qualified, capture, call),
        };

        rewritten.push(syn::ImplItem::Fn(renamed));
        rewritten.push(syn::ImplItem::Fn(wrapper));
        *wrapped += 1;
    }
    imp.items = rewritten;
    out.push(Item::Impl(imp));
}

fn rewrite_static(
    mut s: syn::ItemStatic,
    options: &TransformOptions,
    out: &mut Vec<Item>,
    wrapped: &mut usize,
) {
    let name = s.ident.to_string();
    if !is_pub(&s.vis) || excluded(&name, options) {
        out.push(Item::Static(s));
        return;
    }
    if let Type::BareFn(_) = &*s.ty {
        let vis = s.vis.clone();
        let ident = s.ident.clone();
        let ty = (*s.ty).clone();
        let expr = (*s.expr).clone();
        if split_pointer_binding(vis, ident, ty, expr, true, options, out) {
            *wrapped += 1;
            return;
        }
        out.push(Item::Static(s));
        return;
    }
    if lazy_handler_tree(&s.ty) && instrument_lazy_init(&mut s.expr, &name) {
        *wrapped += 1;
    }
    out.push(Item::Static(s));
}

fn rewrite_const(
    c: syn::ItemConst,
    options: &TransformOptions,
    out: &mut Vec<Item>,
    wrapped: &mut usize,
) {
    let name = c.ident.to_string();
    if !is_pub(&c.vis) || excluded(&name, options) || !matches!(&*c.ty, Type::BareFn(_)) {
        out.push(Item::Const(c));
        return;
    }
    let vis = c.vis.clone();
    let ident = c.ident.clone();
    let ty = (*c.ty).clone();
    let expr = (*c.expr).clone();
    if split_pointer_binding(vis, ident, ty, expr, false, options, out) {
        *wrapped += 1;
    } else {
        out.push(Item::Const(c));
    }
}

/// Shape 2: the initializer moves to a renamed private binding and the
/// re-exported pointer targets a hidden wrapper function.
fn split_pointer_binding(
    vis: Visibility,
    ident: syn::Ident,
    ty: Type,
    expr: syn::Expr,
    is_static: bool,
    options: &TransformOptions,
    out: &mut Vec<Item>,
) -> bool {
    let Type::BareFn(bare) = &ty else {
        return false;
    };
    if bare.lifetimes.is_some()
        || bare.unsafety.is_some()
        || bare.abi.is_some()
        || bare.variadic.is_some()
    {
        return false;
    }

    let qualified = format!("{}.{}", options.module_prefix, ident);
    let renamed_ident = impl_ident(&ident);
    let wrap_ident = format_ident!("__taist_wrap_{}", ident);
    let output = bare.output.clone();

    let mut params: Vec<TokenStream> = vec![];
    let mut args: Vec<syn::Ident> = vec![];
    for (index, input) in bare.inputs.iter().enumerate() {
        let arg = format_ident!("__taist_arg{}", index);
        let arg_ty = &input.ty;
        params.push(quote!(#arg: #arg_ty));
        args.push(arg);
    }
    let capture = capture_expr(&args);
    let rt = runtime();
    let entry = if ret_is(&output, "Result") {
        quote!(traced_result)
    } else {
        quote!(traced)
    };

    let renamed: Item = if is_static {
        parse_quote!(static #renamed_ident: #ty = #expr;)
    } else {
        parse_quote!(const #renamed_ident: #ty = #expr;)
    };
    let reexport: Item = if is_static {
        parse_quote!(#vis static #ident: #ty = #wrap_ident;)
    } else {
        parse_quote!(#vis const #ident: #ty = #wrap_ident;)
    };
    let wrapper: Item = parse_quote! {
        fn #wrap_ident(#(#params),*) #output {
            #rt::#entry(#qualified, #capture, move || (#renamed_ident)(#(#args),*))
        }
    };
    out.extend([renamed, reexport, wrapper]);
    true
}

fn lazy_handler_tree(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(segment) = path.path.segments.last() else {
        return false;
    };
    if segment.ident != "LazyLock" {
        return false;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return false;
    };
    args.args.iter().any(|arg| match arg {
        syn::GenericArgument::Type(Type::Path(inner)) => inner
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "HandlerTree"),
        _ => false,
    })
}

/// Shape 4 for lazily built trees: the closure's tree expression goes
/// through the recursive decorator under the binding's name.
fn instrument_lazy_init(expr: &mut syn::Expr, name: &str) -> bool {
    let syn::Expr::Call(call) = expr else {
        return false;
    };
    let Some(syn::Expr::Closure(closure)) = call.args.first_mut() else {
        return false;
    };
    let rt = runtime();
    let inner = closure.body.clone();
    closure.body = Box::new(parse_quote!(#rt::instrument_tree(#name, #inner)));
    true
}
