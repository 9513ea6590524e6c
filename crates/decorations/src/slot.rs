//! Type-erased slot lifecycle handlers.
//!
//! The registry keeps one handler per slot so a heterogeneous schema fits in a
//! single list. [`TypedSlot`] is the only handler the crate builds itself;
//! foreign handlers can be declared with the unsafe
//! [`RegistryBuilder::declare_slot`](crate::RegistryBuilder::declare_slot),
//! whose caller vouches that the handler stays inside the declared layout.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::BoxError;

/// Constructs and destroys one slot's value in place.
pub trait SlotHandler: Send + Sync {
	/// Initializes the slot at `at`.
	///
	/// # Safety
	///
	/// `at` must be valid for writes of the slot's layout, suitably aligned and
	/// hold no live value.
	unsafe fn construct(&self, at: NonNull<u8>) -> Result<(), BoxError>;

	/// Drops the value at `at`. Must not panic.
	///
	/// # Safety
	///
	/// `at` must hold a value previously initialized by
	/// [`construct`](Self::construct) on this handler and not yet destroyed.
	unsafe fn destroy(&self, at: NonNull<u8>);
}

impl<S: SlotHandler + ?Sized> SlotHandler for &'static S {
	unsafe fn construct(&self, at: NonNull<u8>) -> Result<(), BoxError> {
		unsafe { (**self).construct(at) }
	}

	unsafe fn destroy(&self, at: NonNull<u8>) {
		unsafe { (**self).destroy(at) }
	}
}

/// Handler for a slot holding a `T` produced by an initializer function.
pub struct TypedSlot<T> {
	init: fn() -> Result<T, BoxError>,
	_marker: PhantomData<fn() -> T>,
}

impl<T> TypedSlot<T> {
	/// Creates a handler that fills the slot with `init()`.
	pub const fn new(init: fn() -> Result<T, BoxError>) -> Self {
		Self {
			init,
			_marker: PhantomData,
		}
	}
}

impl<T: Default> TypedSlot<T> {
	/// Creates a handler that fills the slot with `T::default()`.
	pub const fn with_default() -> Self {
		Self::new(default_value::<T>)
	}
}

fn default_value<T: Default>() -> Result<T, BoxError> {
	Ok(T::default())
}

impl<T: Send + Sync + 'static> SlotHandler for TypedSlot<T> {
	unsafe fn construct(&self, at: NonNull<u8>) -> Result<(), BoxError> {
		let value = (self.init)()?;
		unsafe { at.cast::<T>().write(value) };
		Ok(())
	}

	unsafe fn destroy(&self, at: NonNull<u8>) {
		unsafe { at.cast::<T>().drop_in_place() };
	}
}
