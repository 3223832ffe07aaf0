//! Dirty-checking fallback for properties no other strategy can observe.
//!
//! A [`DirtyCheckProperty`] registers with the thread-local [`DirtyChecker`]
//! when it gains its first subscriber and deregisters when the last one
//! leaves. The checker polls its tracked properties every
//! `timeouts_per_check` ticks and notifies on mismatch.
//!
//! Ticking is driven by a pluggable [`TickScheduler`] (installed once per
//! thread); with no scheduler installed, embedders and tests call
//! [`DirtyChecker::tick`] or [`DirtyChecker::check`] directly. The repeating
//! task is the engine's one cancellable resource: it is cancelled when the
//! last tracked property deregisters.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::object::WeakObject;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value};

/// Global configuration surface for the dirty checker.
#[derive(Clone, Copy, Debug)]
pub struct DirtyCheckSettings {
	/// Whether polling runs at all. Disabled, dirty-checked properties
	/// silently never notify.
	pub enabled: bool,
	/// How many ticks elapse between polls. The default keeps CPU cost
	/// bounded on a per-frame tick source.
	pub timeouts_per_check: u32,
	/// Strict mode: refuse to create dirty-checked observers entirely,
	/// so accidental reliance on polling fails loudly.
	pub throw_on_dirty_check: bool,
}

impl Default for DirtyCheckSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			timeouts_per_check: 25,
			throw_on_dirty_check: false,
		}
	}
}

/// Host hook that drives the checker's repeating tick.
pub trait TickScheduler {
	/// Schedule `tick` to run repeatedly; the returned handle cancels it.
	fn schedule_repeating(&self, tick: Box<dyn Fn()>) -> Box<dyn ScheduledTask>;
}

/// Cancellable handle to a scheduled repeating task.
pub trait ScheduledTask {
	fn cancel(&self);
}

/// Thread-local polling registry of dirty-checked properties.
pub struct DirtyChecker {
	tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
	elapsed: Cell<u32>,
	settings: RefCell<DirtyCheckSettings>,
	scheduler: RefCell<Option<Rc<dyn TickScheduler>>>,
	task: RefCell<Option<Box<dyn ScheduledTask>>>,
}

thread_local! {
	static DIRTY_CHECKER: Rc<DirtyChecker> = Rc::new(DirtyChecker::new());
}

/// Access this thread's dirty checker.
pub fn with_dirty_checker<R>(f: impl FnOnce(&Rc<DirtyChecker>) -> R) -> R {
	DIRTY_CHECKER.with(f)
}

impl DirtyChecker {
	fn new() -> Self {
		Self {
			tracked: RefCell::new(Vec::new()),
			elapsed: Cell::new(0),
			settings: RefCell::new(DirtyCheckSettings::default()),
			scheduler: RefCell::new(None),
			task: RefCell::new(None),
		}
	}

	/// Current settings snapshot.
	pub fn settings(&self) -> DirtyCheckSettings {
		*self.settings.borrow()
	}

	/// Adjust the settings in place.
	pub fn configure(&self, f: impl FnOnce(&mut DirtyCheckSettings)) {
		f(&mut self.settings.borrow_mut());
	}

	/// Install the tick source. If properties are already tracked, the
	/// repeating task starts immediately.
	pub fn set_scheduler(&self, scheduler: Rc<dyn TickScheduler>) {
		*self.scheduler.borrow_mut() = Some(scheduler);
		if !self.tracked.borrow().is_empty() {
			self.start_task();
		}
	}

	/// Number of currently tracked properties.
	pub fn tracked_count(&self) -> usize {
		self.tracked.borrow().len()
	}

	/// Whether the repeating task is currently scheduled.
	pub fn is_polling(&self) -> bool {
		self.task.borrow().is_some()
	}

	/// One tick from the host. Polls every `timeouts_per_check` ticks.
	pub fn tick(&self) -> Result<()> {
		let elapsed = self.elapsed.get() + 1;
		if elapsed < self.settings.borrow().timeouts_per_check {
			self.elapsed.set(elapsed);
			return Ok(());
		}
		self.elapsed.set(0);
		self.check()
	}

	/// Poll every tracked property now, regardless of tick cadence.
	pub fn check(&self) -> Result<()> {
		if !self.settings.borrow().enabled {
			return Ok(());
		}
		let snapshot: Vec<Rc<DirtyCheckProperty>> = self.tracked.borrow().clone();
		for property in snapshot {
			property.flush_changes()?;
		}
		Ok(())
	}

	pub(crate) fn add_property(&self, property: Rc<DirtyCheckProperty>) {
		let mut tracked = self.tracked.borrow_mut();
		if tracked
			.iter()
			.any(|existing| Rc::ptr_eq(existing, &property))
		{
			return;
		}
		tracked.push(property);
		let first = tracked.len() == 1;
		drop(tracked);
		trace!(tracked = self.tracked_count(), "dirty-check property added");
		if first {
			self.start_task();
		}
	}

	pub(crate) fn remove_property(&self, property: &Rc<DirtyCheckProperty>) {
		self.tracked
			.borrow_mut()
			.retain(|existing| !Rc::ptr_eq(existing, property));
		trace!(tracked = self.tracked_count(), "dirty-check property removed");
		if self.tracked.borrow().is_empty() {
			self.cancel_task();
		}
	}

	fn start_task(&self) {
		let Some(scheduler) = self.scheduler.borrow().clone() else {
			return;
		};
		let mut task = self.task.borrow_mut();
		if task.is_some() {
			return;
		}
		*task = Some(scheduler.schedule_repeating(Box::new(|| {
			let result = with_dirty_checker(|checker| checker.tick());
			if let Err(error) = result {
				debug!(%error, "dirty-check tick failed");
			}
		})));
		debug!("dirty-check polling started");
	}

	fn cancel_task(&self) {
		if let Some(task) = self.task.borrow_mut().take() {
			task.cancel();
			debug!("dirty-check polling cancelled");
		}
	}
}

/// Fallback observer that detects changes by polling.
///
/// Reads run under a pause guard: the polled getter never registers
/// dependencies of its own. Writing through a dirty-checked property is
/// refused.
pub struct DirtyCheckProperty {
	object: WeakObject,
	key: String,
	old_value: RefCell<Value>,
	registry: SubscriberRecord,
	self_ref: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
	pub(crate) fn new(object: WeakObject, key: String) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			object,
			key,
			old_value: RefCell::new(Value::Null),
			registry: SubscriberRecord::new(),
			self_ref: self_ref.clone(),
		})
	}

	fn current(&self) -> Result<Value> {
		let Some(object) = self.object.upgrade() else {
			return Ok(Value::Null);
		};
		let _pause = tracker::pause_tracking();
		object.get_untracked(&self.key)
	}

	/// Compare against the last seen value and notify on mismatch.
	pub(crate) fn flush_changes(&self) -> Result<()> {
		let current = self.current()?;
		let previous = self.old_value.borrow().clone();
		if same_value(&current, &previous) {
			return Ok(());
		}
		*self.old_value.borrow_mut() = current.clone();
		self.registry
			.notify(&current, &previous, ChangeFlags::FROM_DIRTY_CHECK)
	}
}

impl Observable for DirtyCheckProperty {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		self.current()
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Err(ObservationError::read_only(&self.key))
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		let first = !self.registry.any();
		self.registry.add_flagged(subscriber, own_flags);
		if first {
			if let Ok(current) = self.current() {
				*self.old_value.borrow_mut() = current;
			}
			if let Some(this) = self.self_ref.upgrade() {
				with_dirty_checker(|checker| checker.add_property(this));
			}
		}
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
		if !self.registry.any() {
			if let Some(this) = self.self_ref.upgrade() {
				with_dirty_checker(|checker| checker.remove_property(&this));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::ObservedObject;
	use serial_test::serial;
	use std::cell::RefCell as StdRefCell;

	struct ScalarProbe {
		changes: StdRefCell<Vec<(Value, Value)>>,
	}

	impl ScalarProbe {
		fn new() -> Rc<Self> {
			Rc::new(Self {
				changes: StdRefCell::new(Vec::new()),
			})
		}
	}

	impl Subscriber for ScalarProbe {
		fn handle_change(&self, new: &Value, old: &Value, _flags: ChangeFlags) -> Result<()> {
			self.changes.borrow_mut().push((new.clone(), old.clone()));
			Ok(())
		}
	}

	fn sealed_object() -> ObservedObject {
		ObservedObject::builder()
			.data("raw", 1i64)
			.sealed("opaque", |obj| obj.get_untracked("raw"))
			.build()
	}

	fn reset_checker() {
		with_dirty_checker(|checker| {
			checker.configure(|s| *s = DirtyCheckSettings::default());
		});
	}

	#[test]
	#[serial]
	fn test_poll_notifies_on_mismatch() {
		reset_checker();
		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());
		let probe = ScalarProbe::new();
		property.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);

		with_dirty_checker(|checker| checker.check()).unwrap();
		assert!(probe.changes.borrow().is_empty());

		obj.write_data("raw", Value::from(2i64));
		with_dirty_checker(|checker| checker.check()).unwrap();
		{
			let changes = probe.changes.borrow();
			assert_eq!(changes.len(), 1);
			assert_eq!(changes[0], (Value::from(2i64), Value::from(1i64)));
		}

		property.unsubscribe(&(Rc::clone(&probe) as Rc<dyn Subscriber>));
	}

	#[test]
	#[serial]
	fn test_tick_cadence_respects_timeouts_per_check() {
		reset_checker();
		with_dirty_checker(|checker| checker.configure(|s| s.timeouts_per_check = 3));

		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());
		let probe = ScalarProbe::new();
		property.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);

		obj.write_data("raw", Value::from(5i64));
		with_dirty_checker(|checker| {
			checker.tick().unwrap();
			checker.tick().unwrap();
		});
		assert!(probe.changes.borrow().is_empty());

		with_dirty_checker(|checker| checker.tick()).unwrap();
		assert_eq!(probe.changes.borrow().len(), 1);

		property.unsubscribe(&(Rc::clone(&probe) as Rc<dyn Subscriber>));
		reset_checker();
	}

	#[test]
	#[serial]
	fn test_disabled_checker_never_notifies() {
		reset_checker();
		with_dirty_checker(|checker| checker.configure(|s| s.enabled = false));

		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());
		let probe = ScalarProbe::new();
		property.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);

		obj.write_data("raw", Value::from(9i64));
		with_dirty_checker(|checker| checker.check()).unwrap();
		assert!(probe.changes.borrow().is_empty());

		property.unsubscribe(&(Rc::clone(&probe) as Rc<dyn Subscriber>));
		reset_checker();
	}

	#[test]
	#[serial]
	fn test_last_unsubscribe_stops_tracking() {
		reset_checker();
		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());
		let probe = ScalarProbe::new();

		property.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);
		assert_eq!(with_dirty_checker(|c| c.tracked_count()), 1);

		property.unsubscribe(&(Rc::clone(&probe) as Rc<dyn Subscriber>));
		assert_eq!(with_dirty_checker(|c| c.tracked_count()), 0);
	}

	#[test]
	#[serial]
	fn test_writes_are_refused() {
		reset_checker();
		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());

		let err = property.set_value(Value::from(1i64), ChangeFlags::NONE).unwrap_err();
		assert_eq!(err, ObservationError::read_only("opaque"));
	}

	#[test]
	#[serial]
	fn test_scheduler_task_lifecycle() {
		use std::cell::Cell;

		reset_checker();

		struct RecordingTask {
			cancelled: Rc<Cell<bool>>,
		}
		impl ScheduledTask for RecordingTask {
			fn cancel(&self) {
				self.cancelled.set(true);
			}
		}

		struct RecordingScheduler {
			started: Cell<usize>,
			cancelled: Rc<Cell<bool>>,
		}
		impl TickScheduler for RecordingScheduler {
			fn schedule_repeating(&self, _tick: Box<dyn Fn()>) -> Box<dyn ScheduledTask> {
				self.started.set(self.started.get() + 1);
				Box::new(RecordingTask {
					cancelled: Rc::clone(&self.cancelled),
				})
			}
		}

		let cancelled = Rc::new(Cell::new(false));
		let scheduler = Rc::new(RecordingScheduler {
			started: Cell::new(0),
			cancelled: Rc::clone(&cancelled),
		});
		with_dirty_checker(|checker| checker.set_scheduler(Rc::clone(&scheduler) as Rc<dyn TickScheduler>));

		let obj = sealed_object();
		let property = DirtyCheckProperty::new(obj.downgrade(), "opaque".to_string());
		let probe = ScalarProbe::new();

		property.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);
		assert_eq!(scheduler.started.get(), 1);
		assert!(with_dirty_checker(|c| c.is_polling()));

		// The immortal-timer guard: the task dies with its last property.
		property.unsubscribe(&(Rc::clone(&probe) as Rc<dyn Subscriber>));
		assert!(cancelled.get());
		assert!(!with_dirty_checker(|c| c.is_polling()));
	}
}
