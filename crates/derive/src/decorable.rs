use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, LitStr, parse_macro_input};

/// Entry point for the `#[derive(Decorable)]` macro.
pub fn derive_decorable(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	expand(&input)
		.unwrap_or_else(syn::Error::into_compile_error)
		.into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
	// A static inside the impl cannot depend on type parameters.
	if !input.generics.params.is_empty() {
		return Err(syn::Error::new_spanned(
			&input.generics,
			"Decorable cannot be derived for generic types; implement it with a RegistryBuilder",
		));
	}

	let mut label: Option<LitStr> = None;
	for attr in input.attrs.iter().filter(|a| a.path().is_ident("decorable")) {
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("label") {
				label = Some(meta.value()?.parse()?);
				Ok(())
			} else {
				Err(meta.error("unknown decorable attribute"))
			}
		})?;
	}

	let ident = &input.ident;
	let label = label.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

	Ok(quote! {
		impl ::adorn_decorations::Decorable for #ident {
			fn registry() -> &'static ::std::sync::Arc<::adorn_decorations::Registry<Self>> {
				static REGISTRY: ::std::sync::LazyLock<
					::std::sync::Arc<::adorn_decorations::Registry<#ident>>,
				> = ::std::sync::LazyLock::new(|| {
					::adorn_decorations::collect::registry_for::<#ident>(#label)
				});
				&REGISTRY
			}
		}
	})
}
