//! Per-instance decoration storage.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::descriptor::{Decoration, Descriptor};
use crate::error::DecorationError;
use crate::guard::ScopeGuard;
use crate::registry::Registry;


/// The decoration buffer of one host instance.
///
/// Holds a back-link to the host in its first word followed by every slot of
/// its [`Registry`], all constructed. Dropping the container destroys the
/// slots in reverse declaration order and frees the buffer.
pub struct Container<H: 'static> {
	base: NonNull<u8>,
	registry: Arc<Registry<H>>,
}

// Slots are `Send + Sync` by declaration. The back-link hands out `&H`, and
// `&mut H` through `owner_mut`, on whichever thread holds the container.
unsafe impl<H: Send + Sync + 'static> Send for Container<H> {}
unsafe impl<H: Sync + 'static> Sync for Container<H> {}

impl<H: 'static> Container<H> {
	/// Allocates and constructs the decorations of `host`.
	///
	/// On failure nothing is left behind: constructed slots are rolled back
	/// and the buffer released, on error returns and on unwinding alike.
	///
	/// # Safety
	///
	/// `host` must stay valid and at the same address for as long as the
	/// returned container lives. [`crate::Decorated`] upholds this by boxing
	/// the host.
	pub unsafe fn new(
		host: NonNull<H>,
		registry: Arc<Registry<H>>,
	) -> Result<Self, DecorationError> {
		let layout = registry.buffer_layout();
		let Some(base) = NonNull::new(unsafe { alloc::alloc(layout) }) else {
			return Err(DecorationError::Alloc {
				size: layout.size(),
				align: layout.align(),
			});
		};
		// Owner recovery re-derives the buffer from a slot address.
		let _ = base.as_ptr().expose_provenance();

		let release = ScopeGuard::new(|| unsafe { alloc::dealloc(base.as_ptr(), layout) });
		unsafe { base.cast::<*const H>().write(host.as_ptr().cast_const()) };
		unsafe { registry.construct_all(base) }?;
		release.dismiss();

		tracing::trace!(
			registry = registry.label(),
			size = layout.size(),
			slots = registry.len(),
			"constructed decorations"
		);
		Ok(Self { base, registry })
	}

	/// Returns the registry this container was built from.
	pub fn registry(&self) -> &Arc<Registry<H>> {
		&self.registry
	}

	/// Returns the host recorded in the back-link.
	pub fn host_ptr(&self) -> NonNull<H> {
		let link = unsafe { self.base.cast::<*const H>().read() };
		// Written from a `NonNull` in `new`.
		unsafe { NonNull::new_unchecked(link.cast_mut()) }
	}

	/// Returns the address of the slot behind `descriptor`.
	///
	/// # Panics
	///
	/// Panics if `descriptor` was issued by a different registry.
	pub fn slot_ptr(&self, descriptor: Descriptor) -> NonNull<u8> {
		assert_eq!(
			descriptor.registry,
			self.registry.id(),
			"descriptor from another registry used on a {} container",
			self.registry.label()
		);
		unsafe { descriptor.offset.apply(self.base) }
	}

	/// Returns the decoration behind `decoration`.
	pub fn get<T: Send + Sync + 'static>(&self, decoration: Decoration<H, T>) -> &T {
		let at = self.slot_ptr(decoration.descriptor());
		unsafe { at.cast::<T>().as_ref() }
	}

	/// Returns the decoration behind `decoration` mutably.
	pub fn get_mut<T: Send + Sync + 'static>(&mut self, decoration: Decoration<H, T>) -> &mut T {
		let at = self.slot_ptr(decoration.descriptor());
		unsafe { at.cast::<T>().as_mut() }
	}

	fn layout(&self) -> Layout {
		self.registry.buffer_layout()
	}
}

impl<H: 'static> Drop for Container<H> {
	fn drop(&mut self) {
		tracing::trace!(registry = self.registry.label(), "destroying decorations");
		unsafe {
			self.registry.destroy_all(self.base);
			alloc::dealloc(self.base.as_ptr(), self.layout());
		}
	}
}

impl<H: 'static> fmt::Debug for Container<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Container")
			.field("registry", &self.registry.label())
			.field("base", &self.base)
			.field("size", &self.registry.buffer_size())
			.finish()
	}
}
