//! Observable/subscriber contract and the multi-slot subscriber registry.
//!
//! Every observable owns exactly one [`SubscriberRecord`]. The registry keeps
//! up to three subscribers inline (no allocation) and spills additional ones
//! into an overflow list that is allocated once and reused. Notification
//! snapshots the current subscriber set first, so subscribers added or
//! removed during a pass do not affect that pass.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::collections::IndexMap;
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::value::Value;

/// Number of inline subscriber slots before the overflow list is used.
const INLINE_SUBSCRIBERS: usize = 3;

/// A party interested in changes to one observable.
///
/// Scalar observables call [`handle_change`](Subscriber::handle_change);
/// collection observables call
/// [`handle_collection_change`](Subscriber::handle_collection_change).
/// A consumer implements whichever it expects to receive; the defaults
/// report a programming error if invoked.
pub trait Subscriber {
	/// Called when a scalar observable's value changed.
	fn handle_change(&self, new_value: &Value, old_value: &Value, flags: ChangeFlags) -> Result<()> {
		let _ = (new_value, old_value, flags);
		Err(ObservationError::not_implemented("handleChange"))
	}

	/// Called when a collection observable's structure changed.
	fn handle_collection_change(&self, index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		let _ = (index_map, flags);
		Err(ObservationError::not_implemented("handleCollectionChange"))
	}
}

/// Anything whose value can be read, written and observed.
///
/// `subscribe`/`unsubscribe` are idempotent: re-adding an existing
/// subscriber or removing an absent one is a silent no-op.
pub trait Observable {
	/// Current value. Reading inside an active evaluation registers this
	/// observable as a dependency of the evaluating consumer.
	fn get_value(&self) -> Result<Value>;

	/// Replace the value. Fails with [`ObservationError::ReadOnly`] when
	/// the underlying value has no setter, or
	/// [`ObservationError::InvalidWrite`] for structurally invalid writes.
	fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()>;

	/// Add a subscriber, storing `own_flags` against its registry entry.
	/// The flags are OR-ed into the caller flags (update mask cleared
	/// first) on every notification delivered to this subscriber.
	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags);

	/// Add a subscriber with no own flags.
	fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
		self.subscribe_flagged(subscriber, ChangeFlags::NONE);
	}

	/// Remove a subscriber.
	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>);
}

impl std::fmt::Debug for dyn Observable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("dyn Observable")
	}
}

/// Identity comparison for subscribers: two handles are the same subscriber
/// when they point at the same allocation.
pub(crate) fn subscriber_eq(a: &Rc<dyn Subscriber>, b: &Rc<dyn Subscriber>) -> bool {
	std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Identity comparison for observables, by allocation address.
pub(crate) fn observable_eq(a: &Rc<dyn Observable>, b: &Rc<dyn Observable>) -> bool {
	std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

#[derive(Clone)]
struct SubscriberEntry {
	subscriber: Rc<dyn Subscriber>,
	own_flags: ChangeFlags,
}

struct RecordInner {
	/// Inline slots; a slot stays allocated but empty after removal so it
	/// can be reused by the next subscriber.
	slots: [Option<SubscriberEntry>; INLINE_SUBSCRIBERS],
	/// Occupancy bitmask over the inline slots.
	occupancy: u8,
	/// Overflow list, allocated on the fourth subscriber and kept for the
	/// registry's lifetime afterwards.
	rest: Option<Vec<SubscriberEntry>>,
	/// Number of active subscribers across inline slots and overflow.
	count: usize,
}

/// Fixed-slot + overflow storage of the subscribers of one observable.
///
/// Pure bookkeeping: no method of the registry itself ever fails. A
/// `Result` returned from a notify method always originates in a
/// subscriber's handler.
pub struct SubscriberRecord {
	inner: RefCell<RecordInner>,
}

impl Default for SubscriberRecord {
	fn default() -> Self {
		Self::new()
	}
}

impl SubscriberRecord {
	pub fn new() -> Self {
		Self {
			inner: RefCell::new(RecordInner {
				slots: [None, None, None],
				occupancy: 0,
				rest: None,
				count: 0,
			}),
		}
	}

	/// Add a subscriber with no own flags. Returns `false` if it is
	/// already present.
	pub fn add(&self, subscriber: Rc<dyn Subscriber>) -> bool {
		self.add_flagged(subscriber, ChangeFlags::NONE)
	}

	/// Add a subscriber, storing `own_flags` against its entry. Returns
	/// `false` (and stores nothing) if it is already present.
	pub fn add_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) -> bool {
		if self.has(&subscriber) {
			return false;
		}
		let mut guard = self.inner.borrow_mut();
		let inner = &mut *guard;
		let entry = SubscriberEntry {
			subscriber,
			own_flags,
		};
		match inner.slots.iter().position(|slot| slot.is_none()) {
			Some(i) => {
				inner.slots[i] = Some(entry);
				inner.occupancy |= 1 << i;
			}
			None => inner.rest.get_or_insert_with(Vec::new).push(entry),
		}
		inner.count += 1;
		trace!(count = inner.count, "subscriber added");
		true
	}

	/// Remove a subscriber. Returns `false` if it was not present.
	pub fn remove(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
		let mut guard = self.inner.borrow_mut();
		let inner = &mut *guard;
		let inline_hit = inner.slots.iter().position(|slot| {
			slot.as_ref()
				.is_some_and(|entry| subscriber_eq(&entry.subscriber, subscriber))
		});
		if let Some(i) = inline_hit {
			// The slot is nulled, not compacted, so it can be reused.
			inner.slots[i] = None;
			inner.occupancy &= !(1 << i);
			inner.count -= 1;
			trace!(count = inner.count, "subscriber removed");
			return true;
		}
		if let Some(rest) = inner.rest.as_mut() {
			if let Some(pos) = rest
				.iter()
				.position(|entry| subscriber_eq(&entry.subscriber, subscriber))
			{
				rest.remove(pos);
				inner.count -= 1;
				trace!(count = inner.count, "subscriber removed");
				return true;
			}
		}
		false
	}

	/// Whether the subscriber is currently registered.
	pub fn has(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
		let inner = self.inner.borrow();
		inner
			.slots
			.iter()
			.flatten()
			.any(|entry| subscriber_eq(&entry.subscriber, subscriber))
			|| inner
				.rest
				.as_ref()
				.is_some_and(|rest| rest.iter().any(|e| subscriber_eq(&e.subscriber, subscriber)))
	}

	/// Whether any subscriber is registered.
	pub fn any(&self) -> bool {
		self.inner.borrow().count > 0
	}

	/// Number of active subscribers.
	pub fn count(&self) -> usize {
		self.inner.borrow().count
	}

	/// Whether the overflow list has ever been allocated.
	pub fn has_overflow(&self) -> bool {
		self.inner.borrow().rest.is_some()
	}

	/// Notify every subscriber of a scalar change. Inline slots are
	/// notified in registration order, then the overflow list. The first
	/// subscriber error aborts the pass and propagates.
	pub fn notify(&self, new_value: &Value, old_value: &Value, flags: ChangeFlags) -> Result<()> {
		let snapshot = self.snapshot();
		trace!(subscribers = snapshot.len(), "notifying change");
		for entry in snapshot {
			entry
				.subscriber
				.handle_change(new_value, old_value, flags.combined_with(entry.own_flags))?;
		}
		Ok(())
	}

	/// Notify every subscriber of a structural collection change.
	pub fn notify_collection(&self, index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		let snapshot = self.snapshot();
		trace!(subscribers = snapshot.len(), "notifying collection change");
		for entry in snapshot {
			entry
				.subscriber
				.handle_collection_change(index_map, flags.combined_with(entry.own_flags))?;
		}
		Ok(())
	}

	fn snapshot(&self) -> Vec<SubscriberEntry> {
		let inner = self.inner.borrow();
		let mut entries: Vec<SubscriberEntry> = inner.slots.iter().flatten().cloned().collect();
		if let Some(rest) = inner.rest.as_ref() {
			entries.extend(rest.iter().cloned());
		}
		entries
	}
}
