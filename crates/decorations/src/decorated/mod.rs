//! Host side of decorations: the [`Decorable`] capability and the
//! [`Decorated`] owner that pins a host next to its container.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::container::Container;
use crate::descriptor::Decoration;
use crate::error::DecorationError;
use crate::guard::ScopeGuard;
use crate::registry::Registry;

#[cfg(test)]
mod tests;

/// A host type with a process-wide decoration registry.
///
/// Usually derived with `#[derive(Decorable)]`, which collects every
/// [`decoration!`](crate::decoration) declared for the type. Implement it by
/// hand to serve a registry assembled some other way, e.g. for generic hosts.
pub trait Decorable: Sized + 'static {
	/// Returns the registry every instance of this type is decorated from.
	fn registry() -> &'static Arc<Registry<Self>>;

	/// Wraps `self` with its decorations.
	fn decorate(self) -> Result<Decorated<Self>, DecorationError> {
		Decorated::new(self)
	}
}

/// A host instance together with its decorations.
///
/// The host is boxed so the container's back-link stays valid. Decorations
/// are torn down before the host is dropped, so their destructors may still
/// reach it.
pub struct Decorated<H: 'static> {
	decorations: ManuallyDrop<Container<H>>,
	host: NonNull<H>,
	_owns: PhantomData<H>,
}

// `Decorated` owns an `H` and shares it through the container's back-link.
unsafe impl<H: Send + Sync + 'static> Send for Decorated<H> {}
unsafe impl<H: Sync + 'static> Sync for Decorated<H> {}

impl<H: Decorable> Decorated<H> {
	/// Decorates `host` from its type's registry.
	pub fn new(host: H) -> Result<Self, DecorationError> {
		Self::with_registry(host, Arc::clone(H::registry()))
	}
}

impl<H: 'static> Decorated<H> {
	/// Decorates `host` from an explicitly built registry.
	///
	/// If any decoration fails to construct, `host` is dropped and the error
	/// returned; no partially decorated host is ever observable.
	pub fn with_registry(host: H, registry: Arc<Registry<H>>) -> Result<Self, DecorationError> {
		let host = NonNull::from(Box::leak(Box::new(host)));
		let release = ScopeGuard::new(|| drop(unsafe { Box::from_raw(host.as_ptr()) }));
		let decorations = unsafe { Container::new(host, registry) }?;
		release.dismiss();

		Ok(Self {
			decorations: ManuallyDrop::new(decorations),
			host,
			_owns: PhantomData,
		})
	}

	/// Returns the container holding this host's decorations.
	pub fn decorations(&self) -> &Container<H> {
		&self.decorations
	}

	pub(crate) fn decorations_mut(&mut self) -> &mut Container<H> {
		&mut self.decorations
	}

	/// Returns the registry this host was decorated from.
	pub fn registry(&self) -> &Arc<Registry<H>> {
		self.decorations.registry()
	}

	/// Returns the decoration behind `decoration`.
	pub fn get<T: Send + Sync + 'static>(&self, decoration: Decoration<H, T>) -> &T {
		self.decorations.get(decoration)
	}

	/// Returns the decoration behind `decoration` mutably.
	pub fn get_mut<T: Send + Sync + 'static>(&mut self, decoration: Decoration<H, T>) -> &mut T {
		self.decorations.get_mut(decoration)
	}

	/// Tears down the decorations and returns the bare host.
	pub fn into_inner(self) -> H {
		let mut this = ManuallyDrop::new(self);
		unsafe {
			ManuallyDrop::drop(&mut this.decorations);
			*Box::from_raw(this.host.as_ptr())
		}
	}
}

impl<H: 'static> Deref for Decorated<H> {
	type Target = H;

	fn deref(&self) -> &H {
		unsafe { self.host.as_ref() }
	}
}

impl<H: 'static> DerefMut for Decorated<H> {
	fn deref_mut(&mut self) -> &mut H {
		unsafe { self.host.as_mut() }
	}
}

impl<H: 'static> Drop for Decorated<H> {
	fn drop(&mut self) {
		unsafe {
			ManuallyDrop::drop(&mut self.decorations);
			drop(Box::from_raw(self.host.as_ptr()));
		}
	}
}

impl<H: fmt::Debug + 'static> fmt::Debug for Decorated<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Decorated")
			.field("host", &**self)
			.field("decorations", &*self.decorations)
			.finish()
	}
}
