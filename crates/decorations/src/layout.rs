//! Slot placement arithmetic for decoration buffers.

use std::alloc::Layout;
use std::ptr::NonNull;

/// Bytes reserved at the start of every buffer for the back-link.
pub const BACK_LINK_SIZE: usize = size_of::<*const ()>();

/// Alignment of the back-link word.
pub const BACK_LINK_ALIGN: usize = align_of::<*const ()>();

/// Byte offset of a slot from the start of its decoration buffer.
///
/// Always at or past [`BACK_LINK_SIZE`]. Both directions of navigation go
/// through this type: [`apply`](Self::apply) from buffer to slot and
/// [`rewind`](Self::rewind) from slot back to buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotOffset(usize);

impl SlotOffset {
	pub(crate) const fn new(offset: usize) -> Self {
		debug_assert!(offset >= BACK_LINK_SIZE);
		Self(offset)
	}

	/// Returns the raw byte offset.
	#[inline]
	pub const fn get(self) -> usize {
		self.0
	}

	/// Returns the slot address inside the buffer starting at `base`.
	///
	/// # Safety
	///
	/// `base` must point at a live buffer of a layout this offset was placed in.
	#[inline]
	pub(crate) unsafe fn apply(self, base: NonNull<u8>) -> NonNull<u8> {
		unsafe { base.add(self.0) }
	}

	/// Recovers the buffer start address from a slot address.
	///
	/// Returns `None` when the subtraction underflows or the result cannot hold
	/// a back-link, which rules out addresses that never came from a buffer.
	#[inline]
	pub fn rewind(self, slot_addr: usize) -> Option<usize> {
		let start = slot_addr.checked_sub(self.0)?;
		(start % BACK_LINK_ALIGN == 0 && start != 0).then_some(start)
	}
}

/// Places a slot of `layout` after `size` bytes already in use.
///
/// Returns the slot offset and the new running size. Padding is only added
/// when `size` is not already a multiple of the slot alignment.
pub(crate) fn place(size: usize, layout: Layout) -> Option<(SlotOffset, usize)> {
	let misalignment = size % layout.align();
	let offset = if misalignment == 0 {
		size
	} else {
		size.checked_add(layout.align() - misalignment)?
	};
	let end = offset.checked_add(layout.size())?;
	Some((SlotOffset::new(offset), end))
}
