//! Eager reactive side effects.
//!
//! An effect runs its body once when created and re-runs the whole body
//! whenever a tracked dependency changes. Changes raised by the body itself
//! are coalesced into exactly one follow-up run after the current run
//! completes, and a run-count bound converts an infinite bidirectional
//! dependency loop into a loud [`ObservationError::RecursiveEffect`]
//! instead of a hang.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::collections::IndexMap;
use crate::connectable::DependencyRecord;
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::locator::ObserverLocator;
use crate::subscriber::Subscriber;
use crate::tracker;
use crate::value::Value;

/// Default bound on re-runs within one external trigger.
pub const DEFAULT_MAX_RUN_COUNT: u32 = 10;

/// Body of an effect. Tracked reads performed inside become the effect's
/// dependencies on every run.
pub type EffectFn = dyn FnMut() -> Result<()>;

struct EffectInner {
	body: RefCell<Box<EffectFn>>,
	record: Rc<DependencyRecord>,
	running: Cell<bool>,
	queued: Cell<bool>,
	run_count: Cell<u32>,
	max_run_count: u32,
	stopped: Cell<bool>,
	self_ref: Weak<EffectInner>,
}

/// Handle to a running effect. Dropping the handle stops the effect.
pub struct Effect {
	inner: Rc<EffectInner>,
}

impl std::fmt::Debug for Effect {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Effect").finish_non_exhaustive()
	}
}

impl Effect {
	/// Create the effect and run the body once, tracking its dependencies.
	///
	/// Fails with [`ObservationError::RecursiveEffect`] if the initial run
	/// immediately exceeds the re-run bound.
	pub fn new(
		locator: &ObserverLocator,
		body: impl FnMut() -> Result<()> + 'static,
	) -> Result<Effect> {
		Self::with_max_run_count(locator, DEFAULT_MAX_RUN_COUNT, body)
	}

	/// Like [`Effect::new`] with an explicit re-run bound.
	pub fn with_max_run_count(
		locator: &ObserverLocator,
		max_run_count: u32,
		body: impl FnMut() -> Result<()> + 'static,
	) -> Result<Effect> {
		let record = DependencyRecord::new(locator.clone());
		let inner = Rc::new_cyclic(|self_ref| EffectInner {
			body: RefCell::new(Box::new(body)),
			record: Rc::clone(&record),
			running: Cell::new(false),
			queued: Cell::new(false),
			run_count: Cell::new(0),
			max_run_count,
			stopped: Cell::new(false),
			self_ref: self_ref.clone(),
		});
		record.set_owner(Rc::downgrade(&inner) as Weak<dyn Subscriber>);

		if let Err(error) = inner.execute() {
			inner.stop();
			return Err(error);
		}
		Ok(Effect { inner })
	}

	/// Re-run the body now. Fails with
	/// [`ObservationError::EffectStopped`] after [`stop`](Effect::stop).
	pub fn run(&self) -> Result<()> {
		if self.inner.stopped.get() {
			return Err(ObservationError::EffectStopped);
		}
		self.inner.execute()
	}

	/// Unsubscribe from everything and forbid further runs.
	pub fn stop(&self) {
		self.inner.stop();
	}

	pub fn is_stopped(&self) -> bool {
		self.inner.stopped.get()
	}

	/// Number of currently tracked dependencies.
	pub fn dependency_count(&self) -> usize {
		self.inner.record.len()
	}
}

impl Drop for Effect {
	fn drop(&mut self) {
		self.inner.stop();
	}
}

impl EffectInner {
	fn execute(self: &Rc<Self>) -> Result<()> {
		if self.running.get() {
			self.queued.set(true);
			return Ok(());
		}
		let run_count = self.run_count.get() + 1;
		self.run_count.set(run_count);
		if run_count > self.max_run_count {
			self.run_count.set(0);
			self.queued.set(false);
			return Err(ObservationError::RecursiveEffect {
				max_run_count: self.max_run_count,
			});
		}
		trace!(run = run_count, "effect run");

		self.running.set(true);
		self.record.start();
		let result = match tracker::begin_tracking(Rc::clone(&self.record)) {
			Ok(guard) => {
				let mut body = self.body.borrow_mut();
				let result = (*body)();
				drop(body);
				drop(guard);
				result
			}
			Err(error) => Err(error),
		};
		self.record.clear(false);
		self.running.set(false);
		result?;

		if self.queued.get() {
			// Changes raised during the run coalesce into one more run.
			self.queued.set(false);
			self.execute()
		} else {
			self.run_count.set(0);
			Ok(())
		}
	}

	fn stop(&self) {
		if self.stopped.get() {
			return;
		}
		self.stopped.set(true);
		self.record.clear(true);
		trace!("effect stopped");
	}

	fn on_dependency_changed(self: &Rc<Self>) -> Result<()> {
		if self.stopped.get() {
			return Ok(());
		}
		if self.running.get() {
			self.queued.set(true);
			return Ok(());
		}
		self.execute()
	}
}

impl Subscriber for EffectInner {
	fn handle_change(&self, _new: &Value, _old: &Value, _flags: ChangeFlags) -> Result<()> {
		match self.self_ref.upgrade() {
			Some(this) => this.on_dependency_changed(),
			None => Ok(()),
		}
	}

	fn handle_collection_change(&self, _index_map: &IndexMap, _flags: ChangeFlags) -> Result<()> {
		match self.self_ref.upgrade() {
			Some(this) => this.on_dependency_changed(),
			None => Ok(()),
		}
	}
}
