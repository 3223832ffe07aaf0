//! Observable set: insertion-ordered values with SameValueZero membership.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::index_map::{IndexMap, IndexSlot};
use crate::collections::length::{CollectionSizeObserver, SizeSource};
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value_zero};

pub(crate) struct SetInner {
	values: RefCell<Vec<Value>>,
	observer: RefCell<Option<Rc<SetObserver>>>,
}

/// Handle to a shared observable set. Clones share the same storage and
/// compare equal by identity.
#[derive(Clone)]
pub struct ObservedSet {
	inner: Rc<SetInner>,
}

#[derive(Clone)]
pub(crate) struct WeakSet(Weak<SetInner>);

impl WeakSet {
	pub(crate) fn upgrade(&self) -> Option<ObservedSet> {
		self.0.upgrade().map(|inner| ObservedSet { inner })
	}
}

impl Default for ObservedSet {
	fn default() -> Self {
		Self::new()
	}
}

impl ObservedSet {
	pub fn new() -> Self {
		Self {
			inner: Rc::new(SetInner {
				values: RefCell::new(Vec::new()),
				observer: RefCell::new(None),
			}),
		}
	}

	/// Build from values, dropping SameValueZero duplicates.
	pub fn from_values(values: Vec<Value>) -> Self {
		let set = Self::new();
		{
			let mut stored = set.inner.values.borrow_mut();
			for value in values {
				if !stored.iter().any(|v| same_value_zero(v, &value)) {
					stored.push(value);
				}
			}
		}
		set
	}

	pub fn handle_eq(&self, other: &ObservedSet) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakSet {
		WeakSet(Rc::downgrade(&self.inner))
	}

	/// The structural observer for this instance, created on first use.
	pub fn observer(&self) -> Rc<SetObserver> {
		let mut slot = self.inner.observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let observer = SetObserver::new(self.downgrade());
				*slot = Some(Rc::clone(&observer));
				observer
			}
		}
	}

	fn existing_observer(&self) -> Option<Rc<SetObserver>> {
		self.inner.observer.borrow().clone()
	}

	/// Number of values; registers a dependency on the size observer when
	/// read during an evaluation.
	pub fn size(&self) -> usize {
		if tracker::is_connecting() {
			tracker::track_read(self.observer().size_observer() as Rc<dyn Observable>);
		}
		self.size_untracked()
	}

	pub fn size_untracked(&self) -> usize {
		self.inner.values.borrow().len()
	}

	pub fn has(&self, value: &Value) -> bool {
		self.track_structure();
		self.inner
			.values
			.borrow()
			.iter()
			.any(|v| same_value_zero(v, value))
	}

	/// Snapshot of the values in insertion order.
	pub fn values(&self) -> Vec<Value> {
		self.track_structure();
		self.inner.values.borrow().clone()
	}

	/// Add a value. Adding a value already present is a no-op with no
	/// notification; returns whether the value was inserted.
	pub fn add(&self, value: Value) -> Result<bool> {
		let old_len = {
			let mut values = self.inner.values.borrow_mut();
			if values.iter().any(|v| same_value_zero(v, &value)) {
				return Ok(false);
			}
			let old_len = values.len();
			values.push(value);
			old_len
		};
		let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
		slots.push(IndexSlot::New);
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))?;
		Ok(true)
	}

	/// Remove a value. Deleting a missing value is a no-op with no
	/// notification.
	pub fn delete(&self, value: &Value) -> Result<bool> {
		let (old_len, position) = {
			let mut values = self.inner.values.borrow_mut();
			let old_len = values.len();
			match values.iter().position(|v| same_value_zero(v, value)) {
				Some(position) => {
					values.remove(position);
					(old_len, position)
				}
				None => return Ok(false),
			}
		};
		let slots: Vec<IndexSlot> = (0..old_len)
			.filter(|i| *i != position)
			.map(IndexSlot::Retained)
			.collect();
		self.notify_structural(old_len, IndexMap::from_parts(slots, vec![position]))?;
		Ok(true)
	}

	/// Remove all values. Clearing an empty set is a no-op with no
	/// notification.
	pub fn clear(&self) -> Result<()> {
		let old_len = {
			let mut values = self.inner.values.borrow_mut();
			let old_len = values.len();
			if old_len == 0 {
				return Ok(());
			}
			values.clear();
			old_len
		};
		self.notify_structural(
			old_len,
			IndexMap::from_parts(Vec::new(), (0..old_len).collect()),
		)
	}

	fn track_structure(&self) {
		if tracker::is_connecting() {
			tracker::track_read(self.observer() as Rc<dyn Observable>);
		}
	}

	fn notify_structural(&self, old_len: usize, map: IndexMap) -> Result<()> {
		debug_assert!(map.is_consistent(old_len));
		if let Some(observer) = self.existing_observer() {
			observer.notify_collection(&map, ChangeFlags::NONE)?;
		}
		Ok(())
	}
}

impl fmt::Debug for ObservedSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObservedSet")
			.field("values", &*self.inner.values.borrow())
			.finish()
	}
}

/// Structural observer of one [`ObservedSet`] instance.
pub struct SetObserver {
	set: WeakSet,
	registry: SubscriberRecord,
	size_observer: RefCell<Option<Rc<CollectionSizeObserver>>>,
	self_ref: Weak<SetObserver>,
}

impl SetObserver {
	fn new(set: WeakSet) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			set,
			registry: SubscriberRecord::new(),
			size_observer: RefCell::new(None),
			self_ref: self_ref.clone(),
		})
	}

	/// The derived observer for the set's `size` pseudo-property.
	pub fn size_observer(&self) -> Rc<CollectionSizeObserver> {
		let mut slot = self.size_observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let current = self
					.set
					.upgrade()
					.map(|s| s.size_untracked())
					.unwrap_or_default();
				let observer = CollectionSizeObserver::new(SizeSource::Set(self.set.clone()), current);
				*slot = Some(Rc::clone(&observer));
				drop(slot);
				self.registry
					.add(Rc::clone(&observer) as Rc<dyn Subscriber>);
				observer
			}
		}
	}

	pub fn notify_collection(&self, index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		self.registry.notify_collection(index_map, flags)
	}

	pub fn subscriber_count(&self) -> usize {
		self.registry.count()
	}
}

impl Observable for SetObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(self.set.upgrade().map(Value::Set).unwrap_or(Value::Null))
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Err(ObservationError::read_only("[set]"))
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
	}
}
