//! Per-instance typed decorations for host types.
//!
//! A host type opts in once (via [`Decorable`]) and any module, without
//! touching the host's definition, can then declare a typed field that every
//! instance of the host carries. All decorations of one instance live in a
//! single buffer laid out from the host's [`Registry`]:
//!
//! ```text
//! [ back-link | slot 0 | pad | slot 1 | slot 2 | ... ]
//!   ^ offset 0  ^ descriptor offsets
//! ```
//!
//! The back-link in the first word lets [`Decoration::owner`] recover the host
//! from a decoration reference without a pointer per decoration.
//!
//! # Declaring decorations
//!
//! * Static: [`decoration!`] collects declarations at link time into the
//!   host's registry, built on first use by `#[derive(Decorable)]`.
//! * Explicit: [`RegistryBuilder`] declares slots and freezes them into a
//!   [`Registry`] passed to [`Decorated::with_registry`].
//!
//! ```ignore
//! #[derive(Decorable)]
//! pub struct Session { pub peer: String }
//!
//! decoration! {
//!     /// Requests served on this session.
//!     pub static REQUESTS: Session => AtomicU64;
//! }
//!
//! let session = Session { peer: "10.0.0.1".into() }.decorate()?;
//! REQUESTS.get(&session).fetch_add(1, Ordering::Relaxed);
//! ```
//!
//! # Features
//!
//! * `static-registry` (default) - [`decoration!`] and link-time collection
//! * `derive` (default) - re-exports `#[derive(Decorable)]`
//! * `contracts` - validates layout invariants whenever a registry is built

#[cfg(feature = "static-registry")]
pub mod collect;
mod container;
mod decorated;
mod descriptor;
mod error;
mod guard;
mod layout;
mod registry;
mod slot;
#[cfg(test)]
mod test_fixtures;

#[cfg(feature = "derive")]
pub use adorn_derive::Decorable;
#[cfg(feature = "static-registry")]
pub use collect::StaticDecoration;
pub use container::Container;
pub use decorated::{Decorable, Decorated};
pub use descriptor::{Decoration, Descriptor, RegistryId};
pub use error::{BoxError, DecorationError, LayoutViolation};
pub use layout::{BACK_LINK_ALIGN, BACK_LINK_SIZE, SlotOffset};
pub use registry::{Registry, RegistryBuilder, SlotInfo};
pub use slot::{SlotHandler, TypedSlot};

#[doc(hidden)]
#[cfg(feature = "static-registry")]
pub mod __private {
	pub use {inventory, paste};
}
