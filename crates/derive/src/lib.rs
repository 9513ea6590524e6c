//! Procedural macros for adorn.
//!
//! * `#[derive(Decorable)]` - gives a host type its link-time decoration registry

use proc_macro::TokenStream;

/// Decorable derive macro implementation.
mod decorable;

/// Makes a type a decoration host.
///
/// Generates an `adorn_decorations::Decorable` impl whose registry is built on
/// first use from every `decoration!` declared for the type.
///
/// Attributes:
/// * `#[decorable(label = "...")]` - label used in diagnostics (defaults to the type name)
///
/// ```ignore
/// #[derive(Decorable)]
/// #[decorable(label = "session")]
/// pub struct Session {
///     pub peer: String,
/// }
/// ```
#[proc_macro_derive(Decorable, attributes(decorable))]
pub fn derive_decorable(input: TokenStream) -> TokenStream {
	decorable::derive_decorable(input)
}
