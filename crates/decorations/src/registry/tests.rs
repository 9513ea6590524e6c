use std::alloc::Layout;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::Command;
use std::ptr::NonNull;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::RegistryBuilder;
use crate::decorated::Decorated;
use crate::error::{BoxError, DecorationError};
use crate::layout::{BACK_LINK_ALIGN, BACK_LINK_SIZE};
use crate::slot::SlotHandler;
use crate::test_fixtures::{Event, Host, Probe, explode, refuse, take_events};

/// Zero-fills its bytes and owns nothing.
struct RawSlot {
	size: usize,
}

impl SlotHandler for RawSlot {
	unsafe fn construct(&self, at: NonNull<u8>) -> Result<(), BoxError> {
		unsafe { at.write_bytes(0, self.size) };
		Ok(())
	}

	unsafe fn destroy(&self, _at: NonNull<u8>) {}
}

#[cfg(target_pointer_width = "64")]
#[test]
fn int_double_bool_layout() {
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("scalars");
	let int = builder.declare::<i32>().unwrap();
	let double = builder.declare::<f64>().unwrap();
	let flag = builder.declare::<bool>().unwrap();

	assert_eq!(int.offset().get(), 8);
	assert_eq!(double.offset().get(), 16);
	assert_eq!(flag.offset().get(), 24);

	let registry = builder.build();
	assert_eq!(registry.buffer_size(), 25);
	assert_eq!(registry.buffer_layout().align(), 8);
	assert_eq!(registry.check_invariants(), Ok(()));

	let mut host = Decorated::with_registry(Host::named("first"), registry.clone()).unwrap();
	assert_eq!(*int.get(&host), 0);
	assert_eq!(*double.get(&host), 0.0);
	assert!(!*flag.get(&host));

	*int.get_mut(&mut host) = 42;
	assert_eq!(*int.get(&host), 42);
	drop(host);

	let fresh = Decorated::with_registry(Host::named("second"), registry).unwrap();
	assert_eq!(*int.get(&fresh), 0);
}

#[test]
fn sibling_decorations_do_not_alias() {
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("siblings");
	let a = builder.declare::<i32>().unwrap();
	let b = builder.declare::<i32>().unwrap();
	let registry = builder.build();

	let mut host = Decorated::with_registry(Host::default(), registry).unwrap();
	*a.get_mut(&mut host) = 1;
	*b.get_mut(&mut host) = 2;

	assert_eq!(*a.get(&host), 1);
	assert_eq!(*b.get(&host), 2);
	assert_ne!(a, b);
}

#[test]
fn buffer_size_tracks_declarations() {
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("growth");
	assert!(builder.is_empty());
	assert_eq!(builder.buffer_size(), BACK_LINK_SIZE);

	builder.declare::<u8>().unwrap();
	assert_eq!(builder.buffer_size(), BACK_LINK_SIZE + 1);

	builder.declare::<u16>().unwrap();
	assert_eq!(builder.buffer_size(), BACK_LINK_SIZE + 4);
	assert_eq!(builder.len(), 2);

	let registry = builder.build();
	assert_eq!(registry.len(), 2);
	assert_eq!(registry.slots()[1].range(), BACK_LINK_SIZE + 2..BACK_LINK_SIZE + 4);
	assert_eq!(
		registry.descriptor(1).map(|d| d.offset().get()),
		Some(BACK_LINK_SIZE + 2)
	);
	assert!(registry.descriptor(2).is_none());
}

#[test]
fn over_aligned_slot_raises_buffer_alignment() {
	#[derive(Default)]
	#[repr(align(64))]
	struct CacheLine {
		_bytes: [u8; 32],
	}

	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("wide");
	builder.declare::<u8>().unwrap();
	let line = builder.declare::<CacheLine>().unwrap();
	let registry = builder.build();

	assert_eq!(line.offset().get(), 64);
	assert_eq!(registry.buffer_layout().align(), 64);

	let host = Decorated::with_registry(Host::default(), registry).unwrap();
	let addr = std::ptr::from_ref(line.get(&host)).addr();
	assert_eq!(addr % 64, 0);
}

#[test]
fn declaring_past_isize_max_overflows() {
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("huge");
	let layout = Layout::from_size_align(isize::MAX as usize - 7, 8).unwrap();
	let err = unsafe { builder.declare_slot("huge", layout, Box::new(RawSlot { size: 0 })) }
		.unwrap_err();

	assert!(matches!(
		err,
		DecorationError::LayoutOverflow { name: "huge", .. }
	));
	assert!(builder.is_empty());
	assert_eq!(builder.buffer_size(), BACK_LINK_SIZE);
}

#[test]
fn failed_initializer_unwinds_earlier_slots() {
	take_events();
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("rollback");
	builder.declare::<Probe<1>>().unwrap();
	builder.declare::<Probe<2>>().unwrap();
	builder.declare_with::<Probe<3>>("probe-3", refuse).unwrap();
	builder.declare::<Probe<4>>().unwrap();
	builder.declare::<Probe<5>>().unwrap();
	let registry = builder.build();

	let err = Decorated::with_registry(Host::default(), registry).unwrap_err();

	assert!(matches!(err, DecorationError::Construct { name: "probe-3", .. }));
	assert_eq!(
		take_events(),
		vec![
			Event::Construct(1),
			Event::Construct(2),
			Event::Destroy(2),
			Event::Destroy(1),
		]
	);
}

#[test]
fn panicking_initializer_unwinds_earlier_slots() {
	take_events();
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("panic-rollback");
	builder.declare::<Probe<1>>().unwrap();
	builder.declare::<Probe<2>>().unwrap();
	builder.declare_with::<Probe<3>>("probe-3", explode).unwrap();
	builder.declare::<Probe<4>>().unwrap();
	let registry = builder.build();

	let outcome = catch_unwind(AssertUnwindSafe(|| {
		Decorated::with_registry(Host::default(), registry)
	}));

	assert!(outcome.is_err());
	assert_eq!(
		take_events(),
		vec![
			Event::Construct(1),
			Event::Construct(2),
			Event::Destroy(2),
			Event::Destroy(1),
		]
	);
}

#[test]
fn first_slot_failure_destroys_nothing() {
	take_events();
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("first-fails");
	builder.declare_with::<Probe<1>>("probe-1", refuse).unwrap();
	builder.declare::<Probe<2>>().unwrap();
	let registry = builder.build();

	assert!(Decorated::with_registry(Host::default(), registry).is_err());
	assert_eq!(take_events(), vec![]);
}

#[test]
fn teardown_runs_in_reverse_declaration_order() {
	take_events();
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("teardown");
	builder.declare::<Probe<1>>().unwrap();
	builder.declare::<Probe<2>>().unwrap();
	builder.declare::<Probe<3>>().unwrap();
	let registry = builder.build();

	let host = Decorated::with_registry(Host::default(), registry).unwrap();
	drop(host);

	assert_eq!(
		take_events(),
		vec![
			Event::Construct(1),
			Event::Construct(2),
			Event::Construct(3),
			Event::Destroy(3),
			Event::Destroy(2),
			Event::Destroy(1),
		]
	);
}

#[test]
fn typed_declarations_reserve_their_full_width() {
	let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("widths");
	let wide = builder.declare_with::<u64>("wide", || Ok(u64::MAX)).unwrap();
	let narrow = builder.declare::<u8>().unwrap();
	let registry = builder.build();

	assert_eq!(registry.slots()[0].layout(), Layout::new::<u64>());
	assert_eq!(registry.slots()[1].layout(), Layout::new::<u8>());
	assert!(narrow.offset().get() >= wide.offset().get() + size_of::<u64>());
	assert!(registry.buffer_size() > narrow.offset().get());

	let mut host = Decorated::with_registry(Host::default(), registry).unwrap();
	*narrow.get_mut(&mut host) = 0x11;
	assert_eq!(*wide.get(&host), u64::MAX);
	assert_eq!(*narrow.get(&host), 0x11);
}

/// Decoration whose destructor panics.
#[derive(Default)]
struct Bomb;

impl Drop for Bomb {
	fn drop(&mut self) {
		panic!("decoration destructor failed");
	}
}

const DESTRUCTOR_PANIC_CHILD: &str = "ADORN_DESTRUCTOR_PANIC_CHILD";
const SURVIVED_TEARDOWN: &str = "teardown returned after a destructor panic";

#[test]
fn panicking_destructor_aborts_the_process() {
	if std::env::var_os(DESTRUCTOR_PANIC_CHILD).is_some() {
		let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("bomb");
		builder.declare::<Bomb>().unwrap();
		let host = Decorated::with_registry(Host::default(), builder.build()).unwrap();
		let _ = catch_unwind(AssertUnwindSafe(move || drop(host)));
		println!("{SURVIVED_TEARDOWN}");
		return;
	}

	let output = Command::new(std::env::current_exe().unwrap())
		.args([
			"--exact",
			"registry::tests::panicking_destructor_aborts_the_process",
			"--nocapture",
			"--test-threads=1",
		])
		.env(DESTRUCTOR_PANIC_CHILD, "1")
		.output()
		.unwrap();

	assert!(!output.status.success());
	assert!(!String::from_utf8_lossy(&output.stdout).contains(SURVIVED_TEARDOWN));
	#[cfg(unix)]
	{
		use std::os::unix::process::ExitStatusExt;
		assert!(output.status.signal().is_some(), "child exited with {}", output.status);
	}
}

#[test]
fn registries_get_distinct_ids() {
	let a: RegistryBuilder<Host> = RegistryBuilder::new("a");
	let b: RegistryBuilder<Host> = RegistryBuilder::new("b");
	assert_ne!(a.build().id(), b.build().id());
}

fn slot_layout() -> impl Strategy<Value = Layout> {
	(0usize..96, 0u32..7).prop_map(|(size, align_pow)| {
		let align = 1usize << align_pow;
		Layout::from_size_align(size, align).unwrap()
	})
}

proptest! {
	#[test]
	fn declared_slots_are_aligned_and_disjoint(
		layouts in prop::collection::vec(slot_layout(), 0..24)
	) {
		let mut builder: RegistryBuilder<Host> = RegistryBuilder::new("prop");
		for layout in &layouts {
			let slot = Box::new(RawSlot { size: layout.size() });
			let declared = unsafe { builder.declare_slot("raw", *layout, slot) };
			prop_assert!(declared.is_ok());
		}
		let registry = builder.build();

		prop_assert_eq!(registry.check_invariants(), Ok(()));
		prop_assert!(registry.buffer_layout().align() >= BACK_LINK_ALIGN);

		let slots = registry.slots();
		for (i, slot) in slots.iter().enumerate() {
			prop_assert_eq!(slot.offset().get() % slot.layout().align(), 0);
			prop_assert!(slot.offset().get() >= BACK_LINK_SIZE);
			for other in &slots[i + 1..] {
				let (a, b) = (slot.range(), other.range());
				prop_assert!(a.is_empty() || b.is_empty() || a.end <= b.start || b.end <= a.start);
			}
		}

		// Every slot can be constructed and torn down in a real buffer.
		let host = Decorated::with_registry(Host::default(), registry);
		prop_assert!(host.is_ok());
	}
}
