//! Lazily-evaluated observer of a computed value.
//!
//! State machine: *uncomputed* → *clean* → *dirty* → *clean*, with
//! *uncomputed* reachable again when the last subscriber leaves.
//!
//! With subscribers the observer is push-based: a dependency change
//! recomputes immediately and notifies only when the result differs under
//! SameValue. With no subscribers it is fully pull-based: reads run the
//! getter directly, uncached and untracked.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::collections::IndexMap;
use crate::connectable::DependencyRecord;
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::locator::ObserverLocator;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value};

/// Getter of a computed value. Tracked property reads performed inside
/// become the computed's dependencies.
pub type ComputeFn = dyn Fn() -> Result<Value>;
/// Setter of a writable computed value.
pub type WriteFn = dyn Fn(Value) -> Result<()>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ComputedState {
	Uncomputed,
	Clean,
	Dirty,
}

pub struct ComputedObserver {
	name: String,
	get: Rc<ComputeFn>,
	set: Option<Rc<WriteFn>>,
	value: RefCell<Value>,
	state: Cell<ComputedState>,
	/// Guard set while the setter runs, suppressing the recompute its own
	/// dependency writes would trigger.
	running: Cell<bool>,
	record: Rc<DependencyRecord>,
	registry: SubscriberRecord,
	self_ref: Weak<ComputedObserver>,
}

impl ComputedObserver {
	/// Read-only computed value.
	pub fn new(
		locator: &ObserverLocator,
		get: impl Fn() -> Result<Value> + 'static,
	) -> Rc<Self> {
		Self::named(locator, "computed".to_string(), Rc::new(get), None)
	}

	/// Computed value with a setter.
	pub fn with_setter(
		locator: &ObserverLocator,
		get: impl Fn() -> Result<Value> + 'static,
		set: impl Fn(Value) -> Result<()> + 'static,
	) -> Rc<Self> {
		Self::named(locator, "computed".to_string(), Rc::new(get), Some(Rc::new(set)))
	}

	pub(crate) fn named(
		locator: &ObserverLocator,
		name: String,
		get: Rc<ComputeFn>,
		set: Option<Rc<WriteFn>>,
	) -> Rc<Self> {
		let record = DependencyRecord::new(locator.clone());
		let observer = Rc::new_cyclic(|self_ref| Self {
			name,
			get,
			set,
			value: RefCell::new(Value::Null),
			state: Cell::new(ComputedState::Uncomputed),
			running: Cell::new(false),
			record: Rc::clone(&record),
			registry: SubscriberRecord::new(),
			self_ref: self_ref.clone(),
		});
		record.set_owner(Rc::downgrade(&observer) as Weak<dyn Subscriber>);
		observer
	}

	/// The dependency record backing this observer.
	pub fn record(&self) -> &Rc<DependencyRecord> {
		&self.record
	}

	/// Number of currently tracked dependencies.
	pub fn dependency_count(&self) -> usize {
		self.record.len()
	}

	fn observed(&self) -> bool {
		self.registry.any()
	}

	/// Run the getter under this observer's evaluation context, sweep
	/// stale dependencies, cache and return the result.
	fn recompute_tracked(&self) -> Result<Value> {
		self.record.start();
		let guard = tracker::begin_tracking(Rc::clone(&self.record))?;
		let result = (*self.get)();
		drop(guard);
		self.record.clear(false);
		let value = result?;
		*self.value.borrow_mut() = value.clone();
		self.state.set(ComputedState::Clean);
		trace!(name = %self.name, dependencies = self.record.len(), "computed value refreshed");
		Ok(value)
	}

	fn on_dependency_changed(&self, flags: ChangeFlags) -> Result<()> {
		if self.running.get() {
			self.state.set(ComputedState::Dirty);
			return Ok(());
		}
		self.state.set(ComputedState::Dirty);
		if !self.observed() {
			return Ok(());
		}
		let previous = self.value.borrow().clone();
		let current = self.recompute_tracked()?;
		if same_value(&current, &previous) {
			return Ok(());
		}
		self.registry.notify(&current, &previous, flags)
	}
}

impl Subscriber for ComputedObserver {
	fn handle_change(&self, _new: &Value, _old: &Value, flags: ChangeFlags) -> Result<()> {
		self.on_dependency_changed(flags)
	}

	fn handle_collection_change(&self, _index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		self.on_dependency_changed(flags)
	}
}

impl Observable for ComputedObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		if !self.observed() {
			// Pull semantics: no subscribers, no caching, no tracking.
			return (*self.get)();
		}
		match self.state.get() {
			ComputedState::Clean => Ok(self.value.borrow().clone()),
			ComputedState::Dirty | ComputedState::Uncomputed => self.recompute_tracked(),
		}
	}

	fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
		let Some(set) = self.set.clone() else {
			return Err(ObservationError::read_only(&self.name));
		};
		self.running.set(true);
		let result = (*set)(value);
		self.running.set(false);
		result?;
		// One explicit recompute after the write, instead of the one the
		// running guard suppressed.
		if self.observed() {
			let previous = self.value.borrow().clone();
			let current = self.recompute_tracked()?;
			if !same_value(&current, &previous) {
				self.registry.notify(&current, &previous, flags)?;
			}
		} else {
			self.state.set(ComputedState::Dirty);
		}
		Ok(())
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		let first = !self.registry.any();
		self.registry.add_flagged(subscriber, own_flags);
		if first {
			// Eagerly compute so dependency changes can push. A failing
			// getter leaves the observer dirty; the next read retries and
			// surfaces the error.
			if let Err(error) = self.recompute_tracked() {
				self.state.set(ComputedState::Dirty);
				debug!(name = %self.name, %error, "initial computed evaluation failed");
			}
		}
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
		if !self.registry.any() {
			self.record.clear(true);
			self.state.set(ComputedState::Uncomputed);
			trace!(name = %self.name, "computed observer released dependencies");
		}
	}
}
