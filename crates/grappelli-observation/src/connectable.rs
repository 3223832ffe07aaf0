//! Per-consumer dependency record ("connectable").
//!
//! A consumer that evaluates an expression — a computed observer or an
//! effect — owns one [`DependencyRecord`]. During evaluation the record is
//! made current on the evaluation context stack and every observable read
//! reports itself through [`crate::tracker::track_read`], which lands in
//! [`DependencyRecord::add`].
//!
//! The record is versioned: the owner bumps the version before each pass,
//! `add` stamps touched observables with the current version, and
//! [`DependencyRecord::clear`] sweeps everything left on a stale version.
//! Dependencies that stop being read — the untaken branch of a conditional —
//! are therefore unsubscribed automatically on the next pass, with no
//! explicit dependency-removal API.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::flags::ChangeFlags;
use crate::locator::ObserverLocator;
use crate::subscriber::{Observable, Subscriber, observable_eq};

/// Number of inline dependency slots before the overflow list is used.
const INLINE_DEPENDENCIES: usize = 3;

struct ObservableEntry {
	observable: Rc<dyn Observable>,
	/// Record version at which this dependency was last touched.
	version: u64,
}

struct RecordSlots {
	slots: [Option<ObservableEntry>; INLINE_DEPENDENCIES],
	rest: Option<Vec<ObservableEntry>>,
	count: usize,
}

/// Versioned set of the observables one consumer is currently subscribed to.
pub struct DependencyRecord {
	version: Cell<u64>,
	inner: RefCell<RecordSlots>,
	/// The consumer notified by tracked observables. Held weakly here; the
	/// observables' registries hold it strongly while subscribed.
	owner: RefCell<Weak<dyn Subscriber>>,
	locator: ObserverLocator,
}

impl DependencyRecord {
	pub fn new(locator: ObserverLocator) -> Rc<Self> {
		struct NoOwner;
		impl Subscriber for NoOwner {}

		Rc::new(Self {
			version: Cell::new(0),
			inner: RefCell::new(RecordSlots {
				slots: [None, None, None],
				rest: None,
				count: 0,
			}),
			owner: RefCell::new(Weak::<NoOwner>::new() as Weak<dyn Subscriber>),
			locator,
		})
	}

	/// Bind the consumer that tracked observables should notify. Called
	/// once by the owning computed/effect after construction.
	pub fn set_owner(&self, owner: Weak<dyn Subscriber>) {
		*self.owner.borrow_mut() = owner;
	}

	/// The locator this record resolves auto-tracked reads through.
	pub fn locator(&self) -> &ObserverLocator {
		&self.locator
	}

	/// Begin an evaluation pass: every dependency must be re-touched at
	/// the new version to survive the next [`clear`](Self::clear).
	pub fn start(&self) {
		self.version.set(self.version.get() + 1);
	}

	pub fn version(&self) -> u64 {
		self.version.get()
	}

	/// Record that `observable` was read during the current pass.
	///
	/// A known observable only has its version stamp refreshed; an unknown
	/// one takes the first free slot and the owner is subscribed to it with
	/// the update-target own flag.
	pub fn add(&self, observable: Rc<dyn Observable>) {
		let version = self.version.get();
		{
			let mut guard = self.inner.borrow_mut();
			let inner = &mut *guard;
			for entry in inner.slots.iter_mut().flatten() {
				if observable_eq(&entry.observable, &observable) {
					entry.version = version;
					return;
				}
			}
			if let Some(rest) = inner.rest.as_mut() {
				for entry in rest.iter_mut() {
					if observable_eq(&entry.observable, &observable) {
						entry.version = version;
						return;
					}
				}
			}

			let entry = ObservableEntry {
				observable: Rc::clone(&observable),
				version,
			};
			match inner.slots.iter().position(|slot| slot.is_none()) {
				Some(i) => inner.slots[i] = Some(entry),
				None => inner.rest.get_or_insert_with(Vec::new).push(entry),
			}
			inner.count += 1;
			trace!(dependencies = inner.count, "dependency added");
		}
		if let Some(owner) = self.owner.borrow().upgrade() {
			observable.subscribe_flagged(owner, ChangeFlags::UPDATE_TARGET);
		}
	}

	/// Evict dependencies.
	///
	/// With `all == false`, evicts every dependency whose version stamp is
	/// stale — the mark-and-sweep step after a completed pass. With
	/// `all == true`, evicts unconditionally (consumer teardown).
	pub fn clear(&self, all: bool) {
		let version = self.version.get();
		let mut evicted: Vec<Rc<dyn Observable>> = Vec::new();
		{
			let mut guard = self.inner.borrow_mut();
			let inner = &mut *guard;
			for slot in inner.slots.iter_mut() {
				if let Some(entry) = slot {
					if all || entry.version != version {
						evicted.push(Rc::clone(&entry.observable));
						*slot = None;
						inner.count -= 1;
					}
				}
			}
			if let Some(rest) = inner.rest.as_mut() {
				let mut kept = Vec::with_capacity(rest.len());
				for entry in rest.drain(..) {
					if all || entry.version != version {
						evicted.push(entry.observable);
						inner.count -= 1;
					} else {
						kept.push(entry);
					}
				}
				*rest = kept;
			}
		}
		if evicted.is_empty() {
			return;
		}
		trace!(evicted = evicted.len(), all, "dependencies swept");
		if let Some(owner) = self.owner.borrow().upgrade() {
			for observable in evicted {
				observable.unsubscribe(&owner);
			}
		}
	}

	/// Number of tracked dependencies.
	pub fn len(&self) -> usize {
		self.inner.borrow().count
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether `observable` is currently tracked.
	pub fn is_tracking(&self, observable: &Rc<dyn Observable>) -> bool {
		let inner = self.inner.borrow();
		inner
			.slots
			.iter()
			.flatten()
			.any(|entry| observable_eq(&entry.observable, observable))
			|| inner
				.rest
				.as_ref()
				.is_some_and(|rest| rest.iter().any(|e| observable_eq(&e.observable, observable)))
	}
}
