use thiserror::Error;

/// Error type accepted from fallible decoration initializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced while declaring decorations or decorating a host.
///
/// Every variant raised during construction means the host instance was not
/// created: already constructed slots were rolled back and the buffer freed.
#[derive(Error, Debug)]
pub enum DecorationError {
	/// Declaring the slot would push the buffer past what a [`std::alloc::Layout`] can describe.
	#[error("decoration layout overflow declaring {name} (size={size}, align={align})")]
	LayoutOverflow {
		name: &'static str,
		size: usize,
		align: usize,
	},
	/// A slot initializer reported failure.
	#[error("decoration {name} failed to construct: {source}")]
	Construct {
		name: &'static str,
		#[source]
		source: BoxError,
	},
	/// The global allocator returned null for the decoration buffer.
	#[error("failed to allocate {size} byte decoration buffer (align {align})")]
	Alloc { size: usize, align: usize },
}

/// A broken layout invariant found by [`crate::Registry::check_invariants`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutViolation {
	#[error("slot {name} at offset {offset} overlaps the back-link")]
	OverlapsBackLink { name: &'static str, offset: usize },
	#[error("slot {name} at offset {offset} is not aligned to {align}")]
	Misaligned {
		name: &'static str,
		offset: usize,
		align: usize,
	},
	#[error("slots {first} and {second} overlap")]
	Overlap {
		first: &'static str,
		second: &'static str,
	},
	#[error("slot {name} ends at {end}, past the buffer size {size}")]
	OutOfBounds {
		name: &'static str,
		end: usize,
		size: usize,
	},
	#[error("buffer alignment {buffer} is weaker than slot {name} alignment {align}")]
	WeakBufferAlign {
		name: &'static str,
		align: usize,
		buffer: usize,
	},
}
