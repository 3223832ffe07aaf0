//! Evaluation context stack ("connectable switcher").
//!
//! Tracks which dependency record is currently collecting dependencies.
//! The stack is thread-local: each thread gets an independent observation
//! engine, and within a thread there is at most one collecting record at a
//! time, with suspended records stacked beneath it to support re-entrant
//! evaluation (a computed value reading another computed value).
//!
//! All internal evaluation goes through the RAII [`TrackingGuard`] so the
//! stack is restored on every exit path; `enter`/`exit` remain public and
//! fail fast on misuse.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::connectable::DependencyRecord;
use crate::error::{ObservationError, Result};
use crate::subscriber::Observable;

struct Tracker {
	/// Record currently collecting dependencies, if any.
	current: RefCell<Option<Rc<DependencyRecord>>>,
	/// Records suspended by re-entrant evaluation, innermost last. A `None`
	/// entry records that nothing was collecting when `enter` was called.
	suspended: RefCell<Vec<Option<Rc<DependencyRecord>>>>,
	/// Pause depth; dependency collection is suspended while non-zero.
	pause_depth: Cell<usize>,
}

impl Tracker {
	fn new() -> Self {
		Self {
			current: RefCell::new(None),
			suspended: RefCell::new(Vec::new()),
			pause_depth: Cell::new(0),
		}
	}
}

thread_local! {
	static TRACKER: Tracker = Tracker::new();
}

/// The record currently collecting dependencies, if any.
pub fn current() -> Option<Rc<DependencyRecord>> {
	TRACKER.with(|t| t.current.borrow().clone())
}

/// Whether a record is collecting and collection is not paused.
pub fn is_connecting() -> bool {
	TRACKER.with(|t| t.current.borrow().is_some() && t.pause_depth.get() == 0)
}

/// The collecting record, unless collection is paused.
pub(crate) fn current_connecting() -> Option<Rc<DependencyRecord>> {
	TRACKER.with(|t| {
		if t.pause_depth.get() != 0 {
			return None;
		}
		t.current.borrow().clone()
	})
}

/// Make `record` the collecting record, suspending the previous one.
///
/// Fails with [`ObservationError::InvariantViolation`] if `record` is
/// already the collecting record: a consumer cannot collect its own
/// dependencies twice concurrently.
pub fn enter(record: &Rc<DependencyRecord>) -> Result<()> {
	TRACKER.with(|t| {
		let mut current = t.current.borrow_mut();
		if let Some(existing) = current.as_ref() {
			if Rc::ptr_eq(existing, record) {
				return Err(ObservationError::invariant(
					"record is already collecting dependencies",
				));
			}
		}
		t.suspended.borrow_mut().push(current.take());
		*current = Some(Rc::clone(record));
		trace!("evaluation context entered");
		Ok(())
	})
}

/// End `record`'s collection and restore the previously suspended record.
///
/// Fails with [`ObservationError::InvariantViolation`] if `record` is not
/// the collecting record.
pub fn exit(record: &Rc<DependencyRecord>) -> Result<()> {
	TRACKER.with(|t| {
		let mut current = t.current.borrow_mut();
		match current.as_ref() {
			Some(existing) if Rc::ptr_eq(existing, record) => {
				*current = t.suspended.borrow_mut().pop().flatten();
				trace!("evaluation context exited");
				Ok(())
			}
			_ => Err(ObservationError::invariant(
				"record is not currently collecting dependencies",
			)),
		}
	})
}

/// Enter `record` and return a guard that exits it on drop, on every path.
pub fn begin_tracking(record: Rc<DependencyRecord>) -> Result<TrackingGuard> {
	enter(&record)?;
	Ok(TrackingGuard { record })
}

/// Suspend dependency collection without popping the stack. Used for
/// administrative reads that must not register dependencies. Collection
/// resumes when the guard drops.
pub fn pause_tracking() -> PauseGuard {
	TRACKER.with(|t| t.pause_depth.set(t.pause_depth.get() + 1));
	PauseGuard { _private: () }
}

/// Report a read of `observable` to the collecting record, if any.
pub(crate) fn track_read(observable: Rc<dyn Observable>) {
	TRACKER.with(|t| {
		if t.pause_depth.get() != 0 {
			return;
		}
		if let Some(record) = t.current.borrow().as_ref() {
			record.add(observable);
		}
	});
}

/// Scoped evaluation context; exits its record when dropped.
pub struct TrackingGuard {
	record: Rc<DependencyRecord>,
}

impl Drop for TrackingGuard {
	fn drop(&mut self) {
		// The guard held the context since enter succeeded, so exit can
		// only fail during thread teardown.
		let _ = exit(&self.record);
	}
}

/// Scoped pause of dependency collection.
pub struct PauseGuard {
	_private: (),
}

impl Drop for PauseGuard {
	fn drop(&mut self) {
		let _ = TRACKER.try_with(|t| t.pause_depth.set(t.pause_depth.get().saturating_sub(1)));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::locator::ObserverLocator;
	use serial_test::serial;

	fn record() -> Rc<DependencyRecord> {
		DependencyRecord::new(ObserverLocator::new())
	}

	#[test]
	#[serial]
	fn test_enter_exit_restores_previous() {
		let outer = record();
		let inner = record();

		assert!(current().is_none());

		enter(&outer).unwrap();
		assert!(Rc::ptr_eq(&current().unwrap(), &outer));

		enter(&inner).unwrap();
		assert!(Rc::ptr_eq(&current().unwrap(), &inner));

		exit(&inner).unwrap();
		assert!(Rc::ptr_eq(&current().unwrap(), &outer));

		exit(&outer).unwrap();
		assert!(current().is_none());
	}

	#[test]
	#[serial]
	fn test_double_enter_fails() {
		let rec = record();
		enter(&rec).unwrap();
		let err = enter(&rec).unwrap_err();
		assert!(matches!(err, ObservationError::InvariantViolation { .. }));
		exit(&rec).unwrap();
	}

	#[test]
	#[serial]
	fn test_exit_wrong_record_fails() {
		let a = record();
		let b = record();
		enter(&a).unwrap();
		let err = exit(&b).unwrap_err();
		assert!(matches!(err, ObservationError::InvariantViolation { .. }));
		exit(&a).unwrap();
	}

	#[test]
	#[serial]
	fn test_exit_with_empty_stack_fails() {
		let rec = record();
		assert!(exit(&rec).is_err());
	}

	#[test]
	#[serial]
	fn test_guard_exits_on_drop() {
		let rec = record();
		{
			let _guard = begin_tracking(Rc::clone(&rec)).unwrap();
			assert!(is_connecting());
		}
		assert!(current().is_none());
	}

	#[test]
	#[serial]
	fn test_pause_suspends_connecting_without_popping() {
		let rec = record();
		let _guard = begin_tracking(Rc::clone(&rec)).unwrap();
		assert!(is_connecting());
		{
			let _pause = pause_tracking();
			assert!(!is_connecting());
			// The stack itself is untouched.
			assert!(Rc::ptr_eq(&current().unwrap(), &rec));
		}
		assert!(is_connecting());
	}
}
