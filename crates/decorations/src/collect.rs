//! Link-time decoration declarations via `inventory`.
//!
//! Each [`decoration!`](crate::decoration) invocation emits a
//! [`DecorationDef`] and submits it with `inventory::submit!`. The first time a
//! host type's registry is requested, [`registry_for`] gathers every
//! definition submitted for that host, lays them out and freezes the result.
//! Definitions are ordered by `(module path, static name)` so the layout does
//! not depend on link order.

use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use crate::decorated::Decorable;
use crate::descriptor::Decoration;
use crate::registry::{Registry, RegistryBuilder};
use crate::slot::{SlotHandler, TypedSlot};

/// Static description of one declared decoration.
///
/// Only [`DecorationDef::new`] builds one, so the layout, handler and type
/// identity always describe the same `T`.
pub struct DecorationDef {
	pub(crate) name: &'static str,
	pub(crate) module: &'static str,
	pub(crate) type_name: &'static str,
	pub(crate) layout: Layout,
	pub(crate) slot: &'static dyn SlotHandler,
	pub(crate) type_id: fn() -> TypeId,
}

impl DecorationDef {
	/// Describes a decoration of type `T` driven by `slot`.
	pub const fn new<T: Send + Sync + 'static>(
		name: &'static str,
		module: &'static str,
		type_name: &'static str,
		slot: &'static TypedSlot<T>,
	) -> Self {
		Self {
			name,
			module,
			type_name,
			layout: Layout::new::<T>(),
			slot,
			type_id: TypeId::of::<T>,
		}
	}

	/// Name of the declaring static.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Module path of the declaration.
	pub fn module(&self) -> &'static str {
		self.module
	}

	/// Decoration type as written at the declaration.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Size and alignment of the decoration type.
	pub fn layout(&self) -> Layout {
		self.layout
	}
}

impl fmt::Debug for DecorationDef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DecorationDef")
			.field("name", &self.name)
			.field("module", &self.module)
			.field("type_name", &self.type_name)
			.field("layout", &self.layout)
			.finish()
	}
}

/// Wrapper for `inventory::collect!`, pairing a definition with its host type.
pub struct DecorationReg {
	host: fn() -> TypeId,
	def: &'static DecorationDef,
}

impl DecorationReg {
	/// Registers `def` as a decoration of host type `H`.
	pub const fn new<H: 'static>(def: &'static DecorationDef) -> Self {
		Self {
			host: TypeId::of::<H>,
			def,
		}
	}
}

inventory::collect!(DecorationReg);

/// Returns every definition submitted for host type `H`, in layout order.
pub fn definitions_for<H: 'static>() -> Vec<&'static DecorationDef> {
	let host = TypeId::of::<H>();
	let mut defs: Vec<_> = inventory::iter::<DecorationReg>
		.into_iter()
		.filter(|reg| (reg.host)() == host)
		.map(|reg| reg.def)
		.collect();
	defs.sort_by_key(|def| (def.module, def.name));
	defs
}

/// Builds the registry of host type `H` from its link-time declarations.
///
/// Called once per host type by the derived [`Decorable::registry`].
///
/// # Panics
///
/// Panics if the declared decorations cannot be laid out in one buffer.
pub fn registry_for<H: 'static>(label: &'static str) -> Arc<Registry<H>> {
	let mut builder = RegistryBuilder::new(label);
	for def in definitions_for::<H>() {
		if let Err(err) = builder.declare_static(def) {
			tracing::error!(
				registry = label,
				module = def.module,
				decoration = def.name,
				error = %err,
				"cannot lay out decoration"
			);
			panic!("decoration registry {label}: {err}");
		}
	}
	builder.build()
}

/// Handle to a decoration declared with [`decoration!`](crate::decoration).
///
/// Dereferences to the [`Decoration`] resolved against `H`'s registry on first
/// use.
pub struct StaticDecoration<H: 'static, T: 'static> {
	def: &'static DecorationDef,
	resolved: OnceLock<Decoration<H, T>>,
}

impl<H: 'static, T: 'static> StaticDecoration<H, T> {
	#[doc(hidden)]
	pub const fn new(def: &'static DecorationDef) -> Self {
		Self {
			def,
			resolved: OnceLock::new(),
		}
	}

	/// Returns the link-time definition of this decoration.
	pub fn def(&self) -> &'static DecorationDef {
		self.def
	}
}

impl<H: Decorable, T: Send + Sync + 'static> StaticDecoration<H, T> {
	/// Returns the typed decoration for `H`'s registry.
	///
	/// # Panics
	///
	/// Panics if `H`'s registry was not assembled from link-time declarations.
	pub fn resolve(&self) -> Decoration<H, T> {
		**self
	}
}

impl<H: Decorable, T: Send + Sync + 'static> Deref for StaticDecoration<H, T> {
	type Target = Decoration<H, T>;

	fn deref(&self) -> &Decoration<H, T> {
		self.resolved.get_or_init(|| {
			H::registry().resolve::<T>(self.def).unwrap_or_else(|| {
				panic!(
					"decoration {}::{} is not part of the {} registry",
					self.def.module,
					self.def.name,
					type_name::<H>()
				)
			})
		})
	}
}

impl<H: 'static, T: 'static> fmt::Debug for StaticDecoration<H, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StaticDecoration")
			.field("def", self.def)
			.field("resolved", &self.resolved.get().is_some())
			.finish()
	}
}

/// Declares decorations of a host type from any module.
///
/// Each entry becomes a [`StaticDecoration`] static and is collected into the
/// host's registry at link time. The default initializer is `T::default()`;
/// `= init` names a `fn() -> Result<T, BoxError>` instead.
///
/// ```ignore
/// decoration! {
///     /// Requests served on this session.
///     pub static REQUESTS: Session => AtomicU64;
///     static QUOTA: Session => Quota = Quota::from_env;
/// }
/// ```
#[macro_export]
macro_rules! decoration {
	($(
		$(#[$meta:meta])*
		$vis:vis static $name:ident : $host:ty => $ty:ty $(= $init:expr)?;
	)+) => {
		$(
			$crate::__decoration_one!(
				$(#[$meta])* $vis $name, $host, $ty,
				$crate::__decoration_slot!($ty $(, $init)?)
			);
		)+
	};
}

#[macro_export]
#[doc(hidden)]
macro_rules! __decoration_slot {
	($ty:ty) => {
		$crate::TypedSlot::<$ty>::with_default()
	};
	($ty:ty, $init:expr) => {
		$crate::TypedSlot::<$ty>::new($init)
	};
}

#[macro_export]
#[doc(hidden)]
macro_rules! __decoration_one {
	($(#[$meta:meta])* $vis:vis $name:ident, $host:ty, $ty:ty, $slot:expr) => {
		$crate::__private::paste::paste! {
			#[doc(hidden)]
			#[allow(non_upper_case_globals)]
			static [<__DECORATION_SLOT_ $name>]: $crate::TypedSlot<$ty> = $slot;

			#[doc(hidden)]
			#[allow(non_upper_case_globals)]
			static [<__DECORATION_DEF_ $name>]: $crate::collect::DecorationDef =
				$crate::collect::DecorationDef::new::<$ty>(
					stringify!($name),
					module_path!(),
					stringify!($ty),
					&[<__DECORATION_SLOT_ $name>],
				);

			$(#[$meta])*
			$vis static $name: $crate::StaticDecoration<$host, $ty> =
				$crate::StaticDecoration::new(&[<__DECORATION_DEF_ $name>]);

			$crate::__private::inventory::submit! {
				$crate::collect::DecorationReg::new::<$host>(&[<__DECORATION_DEF_ $name>])
			}
		}
	};
}
