use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Decorated;
use crate::error::DecorationError;
use crate::registry::RegistryBuilder;
use crate::test_fixtures::{Event, Host, Probe, refuse, take_events};

/// Host that counts its drops.
struct Tracked {
	id: usize,
	drops: &'static AtomicUsize,
}

impl Drop for Tracked {
	fn drop(&mut self) {
		self.drops.fetch_add(1, Ordering::SeqCst);
	}
}

#[test]
fn deref_reaches_host() {
	let registry = RegistryBuilder::<Host>::new("deref").build();
	let mut host = Decorated::with_registry(Host::named("alpha"), registry).unwrap();

	assert_eq!(host.name, "alpha");
	host.name.push_str("-beta");
	assert_eq!(host.name, "alpha-beta");
}

#[test]
fn empty_registry_still_decorates() {
	let registry = RegistryBuilder::<Host>::new("empty").build();
	assert!(registry.is_empty());

	let host = Decorated::with_registry(Host::default(), Arc::clone(&registry)).unwrap();
	assert!(Arc::ptr_eq(host.registry(), &registry));
}

#[test]
fn into_inner_tears_down_decorations_first() {
	take_events();
	let mut builder = RegistryBuilder::new("into-inner");
	builder.declare::<Probe<1>>().unwrap();
	builder.declare::<Probe<2>>().unwrap();

	let host = Decorated::with_registry(Host::named("kept"), builder.build()).unwrap();
	let bare = host.into_inner();

	assert_eq!(bare, Host::named("kept"));
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
fn failed_decoration_drops_host() {
	let mut builder = RegistryBuilder::new("tracked");
	builder.declare::<u32>().unwrap();
	builder.declare_with::<String>("name", refuse).unwrap();
	let registry = builder.build();

	static DROPS: AtomicUsize = AtomicUsize::new(0);
	let host = Tracked {
		id: 1,
		drops: &DROPS,
	};
	let err = Decorated::with_registry(host, registry)
		.err()
		.expect("decoration should fail");

	assert!(matches!(err, DecorationError::Construct { name: "name", .. }));
	assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_decorated_drops_host_once() {
	let mut builder = RegistryBuilder::new("tracked-drop");
	let counter = builder.declare::<u64>().unwrap();
	let registry = builder.build();

	static DROPS: AtomicUsize = AtomicUsize::new(0);
	let host = Tracked {
		id: 2,
		drops: &DROPS,
	};
	let mut host = Decorated::with_registry(host, registry)
		.ok()
		.expect("plain decorations construct");
	*counter.get_mut(&mut host) += 5;
	assert_eq!(host.id, 2);
	assert_eq!(*host.get(counter), 5);
	assert_eq!(DROPS.load(Ordering::SeqCst), 0);
	drop(host);

	assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn debug_shows_host_and_registry() {
	let registry = RegistryBuilder::<Host>::new("debugged").build();
	let host = Decorated::with_registry(Host::named("dbg"), registry).unwrap();

	let rendered = format!("{host:?}");
	assert!(rendered.contains("dbg"));
	assert!(rendered.contains("debugged"));
}
