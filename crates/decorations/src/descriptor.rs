use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::decorated::Decorated;
use crate::layout::SlotOffset;

/// Process-unique stamp of the registry that issued a descriptor.
///
/// Ids are never reused: a stale descriptor must not match a newer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(u64);

impl RegistryId {
	/// # Panics
	///
	/// Panics once the id space is exhausted instead of wrapping.
	pub(crate) fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		match claim_id(&NEXT) {
			Some(id) => Self(id),
			None => panic!("decoration registry ids exhausted"),
		}
	}

	/// Returns the underlying u64 value.
	#[inline]
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

/// Takes the next id from `counter`, or `None` if it would wrap.
fn claim_id(counter: &AtomicU64) -> Option<u64> {
	counter
		.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
		.ok()
}

impl fmt::Display for RegistryId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RegistryId({})", self.0)
	}
}

/// Opaque handle to one slot of a registry.
///
/// Only meaningful against containers built from the registry that issued it;
/// the stamp lets containers reject handles from any other registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
	pub(crate) offset: SlotOffset,
	pub(crate) registry: RegistryId,
}

impl Descriptor {
	/// Returns the slot's byte offset within the decoration buffer.
	pub fn offset(self) -> SlotOffset {
		self.offset
	}

	/// Returns the stamp of the issuing registry.
	pub fn registry(self) -> RegistryId {
		self.registry
	}
}

/// Typed handle to a decoration of type `T` on host type `H`.
///
/// The type parameters never exist at runtime; they select the element type on
/// access and keep a handle for one host type from being used on another.
pub struct Decoration<H, T> {
	raw: Descriptor,
	_marker: PhantomData<(fn() -> H, fn() -> T)>,
}

impl<H, T> Clone for Decoration<H, T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<H, T> Copy for Decoration<H, T> {}

impl<H, T> PartialEq for Decoration<H, T> {
	fn eq(&self, other: &Self) -> bool {
		self.raw == other.raw
	}
}

impl<H, T> Eq for Decoration<H, T> {}

impl<H, T> fmt::Debug for Decoration<H, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Decoration")
			.field("type", &std::any::type_name::<T>())
			.field("offset", &self.raw.offset.get())
			.field("registry", &self.raw.registry)
			.finish()
	}
}

impl<H, T> Decoration<H, T> {
	/// Callers guarantee the slot behind `raw` holds a `T` for host `H`.
	pub(crate) const fn from_raw(raw: Descriptor) -> Self {
		Self {
			raw,
			_marker: PhantomData,
		}
	}

	/// Returns the untyped descriptor.
	pub fn descriptor(self) -> Descriptor {
		self.raw
	}

	/// Returns the slot's byte offset within the decoration buffer.
	pub fn offset(self) -> SlotOffset {
		self.raw.offset
	}
}

impl<H: 'static, T: Send + Sync + 'static> Decoration<H, T> {
	/// Returns this decoration on `host`.
	pub fn get<'a>(&self, host: &'a Decorated<H>) -> &'a T {
		host.decorations().get(*self)
	}

	/// Returns this decoration on `host` mutably.
	pub fn get_mut<'a>(&self, host: &'a mut Decorated<H>) -> &'a mut T {
		host.decorations_mut().get_mut(*self)
	}

	/// Recovers the host owning `value`.
	///
	/// Reads the back-link stored at the start of the buffer `value` lives in,
	/// found by rewinding this decoration's offset from `value`'s address.
	///
	/// # Safety
	///
	/// `value` must have been returned by [`get`](Self::get) or
	/// [`get_mut`](Self::get_mut) (or the matching [`crate::Container`]
	/// accessors) for this same decoration, and its container must still be
	/// alive. Any other reference makes the back-link read meaningless.
	///
	/// # Panics
	///
	/// Panics if `value`'s address cannot be the slot of this decoration.
	pub unsafe fn owner<'a>(&self, value: &'a T) -> &'a H {
		let link = self.back_link(ptr::from_ref(value).addr());
		unsafe { &*link.read() }
	}

	/// Mutable form of [`owner`](Self::owner).
	///
	/// # Safety
	///
	/// Same contract as [`owner`](Self::owner), with `value` obtained through
	/// [`get_mut`](Self::get_mut). The host is a separate allocation from the
	/// decoration buffer, so both borrows may coexist. Containers only move
	/// between threads when `H: Send`, so the `&mut H` stays on a thread
	/// allowed to own the host.
	pub unsafe fn owner_mut<'a>(&self, value: &'a mut T) -> &'a mut H {
		let link = self.back_link(ptr::from_mut(value).addr());
		unsafe { &mut *link.read().cast_mut() }
	}

	fn back_link(&self, slot_addr: usize) -> *const *const H {
		let Some(start) = self.raw.offset.rewind(slot_addr) else {
			panic!(
				"{:#x} is not a {} decoration slot at offset {}",
				slot_addr,
				std::any::type_name::<T>(),
				self.raw.offset.get()
			);
		};
		// Buffer provenance was exposed when the container allocated it.
		ptr::with_exposed_provenance::<*const H>(start)
	}
}
