//! Observable keyed map: insertion-ordered entries with SameValueZero key
//! equality. Index-map positions are insertion positions.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::index_map::{IndexMap, IndexSlot};
use crate::collections::length::{CollectionSizeObserver, SizeSource};
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value, same_value_zero};

pub(crate) struct MapInner {
	entries: RefCell<Vec<(Value, Value)>>,
	observer: RefCell<Option<Rc<MapObserver>>>,
}

/// Handle to a shared observable map. Clones share the same storage and
/// compare equal by identity.
#[derive(Clone)]
pub struct ObservedMap {
	inner: Rc<MapInner>,
}

#[derive(Clone)]
pub(crate) struct WeakMap(Weak<MapInner>);

impl WeakMap {
	pub(crate) fn upgrade(&self) -> Option<ObservedMap> {
		self.0.upgrade().map(|inner| ObservedMap { inner })
	}
}

impl Default for ObservedMap {
	fn default() -> Self {
		Self::new()
	}
}

impl ObservedMap {
	pub fn new() -> Self {
		Self {
			inner: Rc::new(MapInner {
				entries: RefCell::new(Vec::new()),
				observer: RefCell::new(None),
			}),
		}
	}

	/// Build from entries; a repeated key keeps the last value at the
	/// first occurrence's position.
	pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
		let map = Self::new();
		{
			let mut stored = map.inner.entries.borrow_mut();
			for (key, value) in entries {
				if let Some(pos) = stored.iter().position(|(k, _)| same_value_zero(k, &key)) {
					stored[pos].1 = value;
				} else {
					stored.push((key, value));
				}
			}
		}
		map
	}

	pub fn handle_eq(&self, other: &ObservedMap) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakMap {
		WeakMap(Rc::downgrade(&self.inner))
	}

	/// The structural observer for this instance, created on first use.
	pub fn observer(&self) -> Rc<MapObserver> {
		let mut slot = self.inner.observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let observer = MapObserver::new(self.downgrade());
				*slot = Some(Rc::clone(&observer));
				observer
			}
		}
	}

	fn existing_observer(&self) -> Option<Rc<MapObserver>> {
		self.inner.observer.borrow().clone()
	}

	/// Number of entries; registers a dependency on the size observer when
	/// read during an evaluation.
	pub fn size(&self) -> usize {
		if tracker::is_connecting() {
			tracker::track_read(self.observer().size_observer() as Rc<dyn Observable>);
		}
		self.size_untracked()
	}

	pub fn size_untracked(&self) -> usize {
		self.inner.entries.borrow().len()
	}

	/// Value for `key`; registers a dependency on the structural observer
	/// when read during an evaluation.
	pub fn get(&self, key: &Value) -> Option<Value> {
		self.track_structure();
		self.inner
			.entries
			.borrow()
			.iter()
			.find(|(k, _)| same_value_zero(k, key))
			.map(|(_, v)| v.clone())
	}

	pub fn has(&self, key: &Value) -> bool {
		self.track_structure();
		self.inner
			.entries
			.borrow()
			.iter()
			.any(|(k, _)| same_value_zero(k, key))
	}

	/// Snapshot of the entries in insertion order.
	pub fn entries(&self) -> Vec<(Value, Value)> {
		self.track_structure();
		self.inner.entries.borrow().clone()
	}

	pub fn keys(&self) -> Vec<Value> {
		self.track_structure();
		self.inner
			.entries
			.borrow()
			.iter()
			.map(|(k, _)| k.clone())
			.collect()
	}

	pub fn values(&self) -> Vec<Value> {
		self.track_structure();
		self.inner
			.entries
			.borrow()
			.iter()
			.map(|(_, v)| v.clone())
			.collect()
	}

	/// Insert or replace an entry. Replacing an entry with a
	/// SameValue-equal value is a no-op with no notification.
	pub fn set(&self, key: Value, value: Value) -> Result<()> {
		enum Write {
			Replaced { position: usize },
			Appended,
		}
		let (old_len, write) = {
			let mut entries = self.inner.entries.borrow_mut();
			let old_len = entries.len();
			match entries.iter().position(|(k, _)| same_value_zero(k, &key)) {
				Some(position) => {
					if same_value(&entries[position].1, &value) {
						return Ok(());
					}
					entries[position].1 = value;
					(old_len, Write::Replaced { position })
				}
				None => {
					entries.push((key, value));
					(old_len, Write::Appended)
				}
			}
		};
		let map = match write {
			Write::Replaced { position } => {
				let mut map = IndexMap::identity(old_len);
				map.mark_replaced(position);
				map
			}
			Write::Appended => {
				let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
				slots.push(IndexSlot::New);
				IndexMap::from_parts(slots, Vec::new())
			}
		};
		self.notify_structural(old_len, map)
	}

	/// Remove an entry. Deleting a missing key is a no-op with no
	/// notification.
	pub fn delete(&self, key: &Value) -> Result<bool> {
		let (old_len, position) = {
			let mut entries = self.inner.entries.borrow_mut();
			let old_len = entries.len();
			match entries.iter().position(|(k, _)| same_value_zero(k, key)) {
				Some(position) => {
					entries.remove(position);
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

	/// Remove all entries. Clearing an empty map is a no-op with no
	/// notification.
	pub fn clear(&self) -> Result<()> {
		let old_len = {
			let mut entries = self.inner.entries.borrow_mut();
			let old_len = entries.len();
			if old_len == 0 {
				return Ok(());
			}
			entries.clear();
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

impl fmt::Debug for ObservedMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObservedMap")
			.field("entries", &*self.inner.entries.borrow())
			.finish()
	}
}

/// Structural observer of one [`ObservedMap`] instance.
pub struct MapObserver {
	map: WeakMap,
	registry: SubscriberRecord,
	size_observer: RefCell<Option<Rc<CollectionSizeObserver>>>,
	self_ref: Weak<MapObserver>,
}

impl MapObserver {
	fn new(map: WeakMap) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			map,
			registry: SubscriberRecord::new(),
			size_observer: RefCell::new(None),
			self_ref: self_ref.clone(),
		})
	}

	/// The derived observer for the map's `size` pseudo-property.
	pub fn size_observer(&self) -> Rc<CollectionSizeObserver> {
		let mut slot = self.size_observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let current = self
					.map
					.upgrade()
					.map(|m| m.size_untracked())
					.unwrap_or_default();
				let observer = CollectionSizeObserver::new(SizeSource::Map(self.map.clone()), current);
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

impl Observable for MapObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(self.map.upgrade().map(Value::Map).unwrap_or(Value::Null))
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Err(ObservationError::read_only("[map]"))
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell as StdRefCell;

	struct CollectingSubscriber {
		maps: StdRefCell<Vec<IndexMap>>,
	}

	impl CollectingSubscriber {
		fn new() -> Rc<Self> {
			Rc::new(Self {
				maps: StdRefCell::new(Vec::new()),
			})
		}
	}

	impl Subscriber for CollectingSubscriber {
		fn handle_collection_change(&self, index_map: &IndexMap, _flags: ChangeFlags) -> Result<()> {
			self.maps.borrow_mut().push(index_map.clone());
			Ok(())
		}
	}

	fn observed() -> (ObservedMap, Rc<CollectingSubscriber>) {
		let map = ObservedMap::new();
		let sub = CollectingSubscriber::new();
		map.observer().subscribe(Rc::clone(&sub) as Rc<dyn Subscriber>);
		(map, sub)
	}

	#[test]
	fn test_set_new_key_appends() {
		let (map, sub) = observed();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		map.set(Value::from("b"), Value::from(2i64)).unwrap();

		let last = sub.maps.borrow().last().cloned().unwrap();
		assert_eq!(last.slots(), &[IndexSlot::Retained(0), IndexSlot::New]);
		assert_eq!(map.size_untracked(), 2);
	}

	#[test]
	fn test_set_existing_key_same_value_is_noop() {
		let (map, sub) = observed();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		assert_eq!(sub.maps.borrow().len(), 1);
	}

	#[test]
	fn test_set_existing_key_records_replacement() {
		let (map, sub) = observed();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		map.set(Value::from("b"), Value::from(2i64)).unwrap();
		map.set(Value::from("a"), Value::from(9i64)).unwrap();

		let last = sub.maps.borrow().last().cloned().unwrap();
		assert_eq!(last.slots(), &[IndexSlot::New, IndexSlot::Retained(1)]);
		assert_eq!(last.deleted_items(), &[0]);
	}

	#[test]
	fn test_delete_missing_key_is_noop() {
		let (map, sub) = observed();
		assert!(!map.delete(&Value::from("missing")).unwrap());
		assert!(sub.maps.borrow().is_empty());
	}

	#[test]
	fn test_delete_records_position() {
		let (map, sub) = observed();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		map.set(Value::from("b"), Value::from(2i64)).unwrap();
		map.set(Value::from("c"), Value::from(3i64)).unwrap();

		assert!(map.delete(&Value::from("b")).unwrap());
		let last = sub.maps.borrow().last().cloned().unwrap();
		assert_eq!(last.slots(), &[IndexSlot::Retained(0), IndexSlot::Retained(2)]);
		assert_eq!(last.deleted_items(), &[1]);
	}

	#[test]
	fn test_clear_empty_is_noop() {
		let (map, sub) = observed();
		map.clear().unwrap();
		assert!(sub.maps.borrow().is_empty());
	}

	#[test]
	fn test_clear_deletes_all_positions() {
		let (map, sub) = observed();
		map.set(Value::from("a"), Value::from(1i64)).unwrap();
		map.set(Value::from("b"), Value::from(2i64)).unwrap();
		map.clear().unwrap();

		let last = sub.maps.borrow().last().cloned().unwrap();
		assert!(last.slots().is_empty());
		assert_eq!(last.deleted_items(), &[0, 1]);
	}

	#[test]
	fn test_same_value_zero_key_lookup() {
		let map = ObservedMap::new();
		map.set(Value::Number(0.0), Value::from("zero")).unwrap();
		// -0 finds the +0 key under SameValueZero.
		assert_eq!(map.get(&Value::Number(-0.0)), Some(Value::from("zero")));
		// NaN keys are found.
		map.set(Value::Number(f64::NAN), Value::from("nan")).unwrap();
		assert_eq!(map.get(&Value::Number(f64::NAN)), Some(Value::from("nan")));
	}
}
