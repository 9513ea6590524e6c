//! Decoration types that record their lifecycle for assertions.

use std::cell::RefCell;

use crate::error::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
	Construct(usize),
	Destroy(usize),
}

thread_local! {
	static EVENTS: RefCell<Vec<Event>> = const { RefCell::new(Vec::new()) };
}

fn record(event: Event) {
	EVENTS.with(|events| events.borrow_mut().push(event));
}

/// Drains the events recorded on the current thread.
pub fn take_events() -> Vec<Event> {
	EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

/// Decoration tagged `N` that logs construction and destruction.
#[derive(Debug)]
pub struct Probe<const N: usize> {
	pub tag: usize,
}

impl<const N: usize> Default for Probe<N> {
	fn default() -> Self {
		record(Event::Construct(N));
		Self { tag: N }
	}
}

impl<const N: usize> Drop for Probe<N> {
	fn drop(&mut self) {
		record(Event::Destroy(N));
	}
}

/// Initializer that always fails.
pub fn refuse<T>() -> Result<T, BoxError> {
	Err("probe refused to construct".into())
}

/// Initializer that always panics.
pub fn explode<T>() -> Result<T, BoxError> {
	panic!("probe exploded during construction")
}

/// Plain host type for unit tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Host {
	pub name: String,
}

impl Host {
	pub fn named(name: &str) -> Self {
		Self {
			name: name.to_string(),
		}
	}
}
