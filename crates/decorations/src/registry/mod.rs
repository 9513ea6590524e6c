//! Decoration schemas: slot layout plus lifecycle handlers.

mod builder;

use std::alloc::Layout;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::ptr::NonNull;

pub use builder::RegistryBuilder;
#[cfg(feature = "static-registry")]
use rustc_hash::FxHashMap as HashMap;

use crate::descriptor::{Descriptor, RegistryId};
use crate::error::{DecorationError, LayoutViolation};
use crate::guard::{AbortOnUnwind, ScopeGuard};
use crate::layout::{BACK_LINK_SIZE, SlotOffset};
use crate::slot::SlotHandler;

#[cfg(test)]
mod tests;

/// One declared slot of a [`Registry`].
pub struct SlotInfo {
	pub(crate) name: &'static str,
	pub(crate) offset: SlotOffset,
	pub(crate) layout: Layout,
	pub(crate) handler: Box<dyn SlotHandler>,
}

impl SlotInfo {
	/// Returns the name the slot was declared with.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Returns the slot's offset within the decoration buffer.
	pub fn offset(&self) -> SlotOffset {
		self.offset
	}

	/// Returns the size and alignment of the slot's value.
	pub fn layout(&self) -> Layout {
		self.layout
	}

	/// Returns the byte range the slot occupies in the buffer.
	pub fn range(&self) -> Range<usize> {
		self.offset.get()..self.offset.get() + self.layout.size()
	}
}

impl fmt::Debug for SlotInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SlotInfo")
			.field("name", &self.name)
			.field("offset", &self.offset.get())
			.field("size", &self.layout.size())
			.field("align", &self.layout.align())
			.finish()
	}
}

/// Frozen decoration schema for host type `H`.
///
/// Produced by [`RegistryBuilder::build`]; has no way to declare further
/// slots, so every container built from it agrees on the layout for its
/// whole lifetime.
pub struct Registry<H> {
	id: RegistryId,
	label: &'static str,
	slots: Vec<SlotInfo>,
	buffer: Layout,
	#[cfg(feature = "static-registry")]
	by_origin: HashMap<usize, usize>,
	_host: PhantomData<fn() -> H>,
}

impl<H> Registry<H> {
	/// Returns the stamp carried by every descriptor this registry issued.
	pub fn id(&self) -> RegistryId {
		self.id
	}

	/// Returns the label used in diagnostics.
	pub fn label(&self) -> &'static str {
		self.label
	}

	/// Returns the number of declared slots.
	pub fn len(&self) -> usize {
		self.slots.len()
	}

	/// Returns true if no slots were declared.
	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	/// Returns the byte size of every container's buffer, back-link included.
	pub fn buffer_size(&self) -> usize {
		self.buffer.size()
	}

	/// Returns the size and alignment every container allocates.
	pub fn buffer_layout(&self) -> Layout {
		self.buffer
	}

	/// Returns the slots in declaration order.
	pub fn slots(&self) -> &[SlotInfo] {
		&self.slots
	}

	/// Returns the descriptor of the slot at `index` in declaration order.
	pub fn descriptor(&self, index: usize) -> Option<Descriptor> {
		self.slots.get(index).map(|slot| Descriptor {
			offset: slot.offset,
			registry: self.id,
		})
	}

	/// Verifies the layout invariants every container relies on.
	///
	/// Slots must sit past the back-link, be aligned, fit in the buffer, and
	/// not overlap each other. The buffer alignment must cover every slot.
	pub fn check_invariants(&self) -> Result<(), LayoutViolation> {
		for slot in &self.slots {
			let offset = slot.offset.get();
			let align = slot.layout.align();
			if offset < BACK_LINK_SIZE {
				return Err(LayoutViolation::OverlapsBackLink {
					name: slot.name,
					offset,
				});
			}
			if offset % align != 0 {
				return Err(LayoutViolation::Misaligned {
					name: slot.name,
					offset,
					align,
				});
			}
			if align > self.buffer.align() {
				return Err(LayoutViolation::WeakBufferAlign {
					name: slot.name,
					align,
					buffer: self.buffer.align(),
				});
			}
			let end = slot.range().end;
			if end > self.buffer.size() {
				return Err(LayoutViolation::OutOfBounds {
					name: slot.name,
					end,
					size: self.buffer.size(),
				});
			}
		}

		let mut occupied: Vec<&SlotInfo> = self
			.slots
			.iter()
			.filter(|slot| slot.layout.size() > 0)
			.collect();
		occupied.sort_by_key(|slot| slot.offset);
		for pair in occupied.windows(2) {
			if pair[0].range().end > pair[1].offset.get() {
				return Err(LayoutViolation::Overlap {
					first: pair[0].name,
					second: pair[1].name,
				});
			}
		}

		Ok(())
	}

	/// Constructs every slot in declaration order.
	///
	/// On failure, slots constructed so far are destroyed in reverse order
	/// before the error (or panic) leaves this function.
	///
	/// # Safety
	///
	/// `base` must point at an uninitialized buffer of [`Self::buffer_layout`].
	pub(crate) unsafe fn construct_all(&self, base: NonNull<u8>) -> Result<(), DecorationError> {
		let constructed = Cell::new(0usize);
		let rollback = ScopeGuard::new(|| {
			let done = constructed.get();
			tracing::warn!(
				registry = self.label,
				constructed = done,
				"rolling back partially constructed decorations"
			);
			unsafe { self.destroy_prefix(base, done) };
		});

		for (index, slot) in self.slots.iter().enumerate() {
			let at = unsafe { slot.offset.apply(base) };
			let built = unsafe { slot.handler.construct(at) };
			built.map_err(|source| DecorationError::Construct {
				name: slot.name,
				source,
			})?;
			constructed.set(index + 1);
		}

		rollback.dismiss();
		Ok(())
	}

	/// Destroys every slot in reverse declaration order.
	///
	/// # Safety
	///
	/// Every slot in the buffer at `base` must be live.
	pub(crate) unsafe fn destroy_all(&self, base: NonNull<u8>) {
		unsafe { self.destroy_prefix(base, self.slots.len()) }
	}

	unsafe fn destroy_prefix(&self, base: NonNull<u8>, count: usize) {
		let bomb = AbortOnUnwind::arm(self.label);
		for slot in self.slots[..count].iter().rev() {
			unsafe { slot.handler.destroy(slot.offset.apply(base)) };
		}
		bomb.defuse();
	}

	/// Returns the typed decoration declared by `def`, if `def` belongs to
	/// this registry and declares a `T`.
	#[cfg(feature = "static-registry")]
	pub(crate) fn resolve<T: 'static>(
		&self,
		def: &'static crate::collect::DecorationDef,
	) -> Option<crate::descriptor::Decoration<H, T>> {
		if (def.type_id)() != std::any::TypeId::of::<T>() {
			return None;
		}
		let index = *self.by_origin.get(&std::ptr::from_ref(def).addr())?;
		self.descriptor(index)
			.map(crate::descriptor::Decoration::from_raw)
	}
}

impl<H> fmt::Debug for Registry<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("label", &self.label)
			.field("id", &self.id)
			.field("slots", &self.slots)
			.field("size", &self.buffer.size())
			.field("align", &self.buffer.align())
			.finish()
	}
}
