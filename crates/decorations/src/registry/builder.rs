use std::alloc::Layout;
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "static-registry")]
use rustc_hash::FxHashMap as HashMap;

use super::{Registry, SlotInfo};
use crate::descriptor::{Decoration, Descriptor, RegistryId};
use crate::error::{BoxError, DecorationError};
use crate::layout;
use crate::slot::{SlotHandler, TypedSlot};

/// Builder for a [`Registry`].
///
/// Slots are appended in declaration order; [`build`](Self::build) consumes
/// the builder, so a registry can never grow once containers exist.
pub struct RegistryBuilder<H> {
	label: &'static str,
	id: RegistryId,
	slots: Vec<SlotInfo>,
	buffer: Layout,
	#[cfg(feature = "static-registry")]
	by_origin: HashMap<usize, usize>,
	_host: PhantomData<fn() -> H>,
}

impl<H> RegistryBuilder<H> {
	/// Creates an empty builder with the given label for diagnostics.
	pub fn new(label: &'static str) -> Self {
		Self {
			label,
			id: RegistryId::next(),
			slots: Vec::new(),
			buffer: Layout::new::<*const ()>(),
			#[cfg(feature = "static-registry")]
			by_origin: HashMap::default(),
			_host: PhantomData,
		}
	}

	/// Returns the label used in diagnostics.
	pub fn label(&self) -> &'static str {
		self.label
	}

	/// Returns the number of slots declared so far.
	pub fn len(&self) -> usize {
		self.slots.len()
	}

	/// Returns true if no slots have been declared so far.
	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	/// Returns the buffer size implied by the slots declared so far.
	pub fn buffer_size(&self) -> usize {
		self.buffer.size()
	}

	/// Declares a decoration initialized with `T::default()`.
	pub fn declare<T>(&mut self) -> Result<Decoration<H, T>, DecorationError>
	where
		T: Default + Send + Sync + 'static,
	{
		self.declare_typed(type_name::<T>(), TypedSlot::<T>::with_default())
	}

	/// Declares a decoration initialized by a fallible `init`.
	///
	/// An `Err` from `init` fails construction of the host instance being
	/// decorated.
	pub fn declare_with<T>(
		&mut self,
		name: &'static str,
		init: fn() -> Result<T, BoxError>,
	) -> Result<Decoration<H, T>, DecorationError>
	where
		T: Send + Sync + 'static,
	{
		self.declare_typed(name, TypedSlot::new(init))
	}

	fn declare_typed<T: Send + Sync + 'static>(
		&mut self,
		name: &'static str,
		slot: TypedSlot<T>,
	) -> Result<Decoration<H, T>, DecorationError> {
		// `TypedSlot<T>` writes exactly one `T`.
		let descriptor = unsafe { self.declare_slot(name, Layout::new::<T>(), Box::new(slot)) }?;
		Ok(Decoration::from_raw(descriptor))
	}

	/// Declares an untyped slot of `layout` driven by `handler`.
	///
	/// The slot is placed at the first offset past the current buffer end that
	/// satisfies `layout.align()`.
	///
	/// # Safety
	///
	/// `handler` must only touch the `layout.size()` bytes at the slot address
	/// and must not need more alignment than `layout.align()`. The registry
	/// trusts `layout` when packing neighbouring slots and sizing the buffer.
	pub unsafe fn declare_slot(
		&mut self,
		name: &'static str,
		layout: Layout,
		handler: Box<dyn SlotHandler>,
	) -> Result<Descriptor, DecorationError> {
		let overflow = || DecorationError::LayoutOverflow {
			name,
			size: layout.size(),
			align: layout.align(),
		};
		let (offset, end) = layout::place(self.buffer.size(), layout).ok_or_else(overflow)?;
		self.buffer = Layout::from_size_align(end, self.buffer.align().max(layout.align()))
			.map_err(|_| overflow())?;

		tracing::debug!(
			registry = self.label,
			slot = name,
			offset = offset.get(),
			size = layout.size(),
			align = layout.align(),
			"declared decoration slot"
		);

		self.slots.push(SlotInfo {
			name,
			offset,
			layout,
			handler,
		});
		Ok(Descriptor {
			offset,
			registry: self.id,
		})
	}

	/// Declares the slot described by a link-time definition.
	#[cfg(feature = "static-registry")]
	pub(crate) fn declare_static(
		&mut self,
		def: &'static crate::collect::DecorationDef,
	) -> Result<Descriptor, DecorationError> {
		// `DecorationDef::new` derives the layout from the slot's element type.
		let descriptor = unsafe { self.declare_slot(def.name, def.layout, Box::new(def.slot)) }?;
		self.by_origin
			.insert(std::ptr::from_ref(def).addr(), self.slots.len() - 1);
		Ok(descriptor)
	}

	/// Freezes the schema.
	///
	/// With the `contracts` feature the layout invariants are verified here and
	/// a violation panics.
	pub fn build(self) -> Arc<Registry<H>> {
		let registry = Registry {
			id: self.id,
			label: self.label,
			slots: self.slots,
			buffer: self.buffer,
			#[cfg(feature = "static-registry")]
			by_origin: self.by_origin,
			_host: PhantomData,
		};

		#[cfg(feature = "contracts")]
		if let Err(violation) = registry.check_invariants() {
			panic!("decoration registry {}: {}", registry.label, violation);
		}

		tracing::debug!(
			registry = registry.label,
			slots = registry.slots.len(),
			size = registry.buffer.size(),
			align = registry.buffer.align(),
			"decoration registry frozen"
		);
		Arc::new(registry)
	}
}

impl<H> std::fmt::Debug for RegistryBuilder<H> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistryBuilder")
			.field("label", &self.label)
			.field("slots", &self.slots)
			.field("size", &self.buffer.size())
			.finish()
	}
}
