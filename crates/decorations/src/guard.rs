//! Drop guards for construction rollback and fatal teardown.

/// Runs a cleanup closure on drop unless dismissed.
///
/// Fires on early `?` returns and on unwinding alike.
pub(crate) struct ScopeGuard<F: FnOnce()> {
	cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
	pub(crate) fn new(cleanup: F) -> Self {
		Self {
			cleanup: Some(cleanup),
		}
	}

	/// Disarms the guard; the cleanup never runs.
	pub(crate) fn dismiss(mut self) {
		self.cleanup = None;
	}
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
	fn drop(&mut self) {
		if let Some(cleanup) = self.cleanup.take() {
			cleanup();
		}
	}
}

/// Aborts the process if dropped while armed.
///
/// Armed across decoration destructors: a panic escaping one leaves the
/// buffer half torn down, which cannot be reported or resumed.
pub(crate) struct AbortOnUnwind {
	context: &'static str,
}

impl AbortOnUnwind {
	pub(crate) fn arm(context: &'static str) -> Self {
		Self { context }
	}

	pub(crate) fn defuse(self) {
		std::mem::forget(self);
	}
}

impl Drop for AbortOnUnwind {
	fn drop(&mut self) {
		tracing::error!(
			registry = self.context,
			"decoration destructor panicked; aborting"
		);
		std::process::abort();
	}
}
