//! Observable array: a typed wrapper owning the raw storage, whose mutators
//! perform the native mutation and record an [`IndexMap`] describing exactly
//! which elements survived, moved, were deleted or are new.
//!
//! An unobserved array pays a single branch per mutation: the diff is only
//! recorded and delivered once an [`ArrayObserver`] has been created for the
//! instance.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::index_map::{IndexMap, IndexSlot};
use crate::collections::length::CollectionLengthObserver;
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value};

pub(crate) struct ArrayInner {
	items: RefCell<Vec<Value>>,
	observer: RefCell<Option<Rc<ArrayObserver>>>,
}

/// Handle to a shared observable array. Clones share the same storage and
/// compare equal by identity.
#[derive(Clone)]
pub struct ObservedArray {
	inner: Rc<ArrayInner>,
}

/// Weak counterpart of [`ObservedArray`], held by derived observers.
#[derive(Clone)]
pub(crate) struct WeakArray(Weak<ArrayInner>);

impl WeakArray {
	pub(crate) fn upgrade(&self) -> Option<ObservedArray> {
		self.0.upgrade().map(|inner| ObservedArray { inner })
	}
}

impl Default for ObservedArray {
	fn default() -> Self {
		Self::new()
	}
}

impl ObservedArray {
	pub fn new() -> Self {
		Self::from_values(Vec::new())
	}

	pub fn from_values(values: Vec<Value>) -> Self {
		Self {
			inner: Rc::new(ArrayInner {
				items: RefCell::new(values),
				observer: RefCell::new(None),
			}),
		}
	}

	/// Identity comparison of handles.
	pub fn handle_eq(&self, other: &ObservedArray) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakArray {
		WeakArray(Rc::downgrade(&self.inner))
	}

	/// The structural observer for this instance, created on first use.
	pub fn observer(&self) -> Rc<ArrayObserver> {
		let mut slot = self.inner.observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let observer = ArrayObserver::new(self.downgrade());
				*slot = Some(Rc::clone(&observer));
				observer
			}
		}
	}

	fn existing_observer(&self) -> Option<Rc<ArrayObserver>> {
		self.inner.observer.borrow().clone()
	}

	/// Length; registers a dependency on the length observer when read
	/// during an evaluation.
	pub fn len(&self) -> usize {
		if tracker::is_connecting() {
			tracker::track_read(self.observer().length_observer() as Rc<dyn Observable>);
		}
		self.len_untracked()
	}

	pub fn len_untracked(&self) -> usize {
		self.inner.items.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Element at `index`; registers a dependency on the matching index
	/// observer when read during an evaluation.
	pub fn get(&self, index: usize) -> Option<Value> {
		if tracker::is_connecting() {
			tracker::track_read(self.observer().index_observer(index) as Rc<dyn Observable>);
		}
		self.get_untracked(index)
	}

	pub fn get_untracked(&self, index: usize) -> Option<Value> {
		self.inner.items.borrow().get(index).cloned()
	}

	/// Snapshot of the whole array; registers a dependency on the
	/// structural observer when read during an evaluation.
	pub fn to_vec(&self) -> Vec<Value> {
		if tracker::is_connecting() {
			tracker::track_read(self.observer() as Rc<dyn Observable>);
		}
		self.inner.items.borrow().clone()
	}

	pub fn push(&self, value: Value) -> Result<()> {
		let old_len = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			items.push(value);
			old_len
		};
		let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
		slots.push(IndexSlot::New);
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))
	}

	pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> Result<()> {
		let (old_len, added) = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			let before = items.len();
			items.extend(values);
			(old_len, items.len() - before)
		};
		if added == 0 {
			return Ok(());
		}
		let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
		slots.extend(std::iter::repeat_n(IndexSlot::New, added));
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))
	}

	/// Remove and return the last element. Popping an empty array is a
	/// no-op with no notification.
	pub fn pop(&self) -> Result<Option<Value>> {
		let (old_len, removed) = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			(old_len, items.pop())
		};
		let Some(removed) = removed else {
			return Ok(None);
		};
		let slots: Vec<IndexSlot> = (0..old_len - 1).map(IndexSlot::Retained).collect();
		self.notify_structural(old_len, IndexMap::from_parts(slots, vec![old_len - 1]))?;
		Ok(Some(removed))
	}

	/// Remove and return the first element.
	pub fn shift(&self) -> Result<Option<Value>> {
		let (old_len, removed) = {
			let mut items = self.inner.items.borrow_mut();
			if items.is_empty() {
				(0, None)
			} else {
				(items.len(), Some(items.remove(0)))
			}
		};
		let Some(removed) = removed else {
			return Ok(None);
		};
		let slots: Vec<IndexSlot> = (1..old_len).map(IndexSlot::Retained).collect();
		self.notify_structural(old_len, IndexMap::from_parts(slots, vec![0]))?;
		Ok(Some(removed))
	}

	/// Insert an element at the front.
	pub fn unshift(&self, value: Value) -> Result<()> {
		let old_len = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			items.insert(0, value);
			old_len
		};
		let mut slots = vec![IndexSlot::New];
		slots.extend((0..old_len).map(IndexSlot::Retained));
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))
	}

	/// Remove `delete_count` elements starting at `start` and insert
	/// `insert` in their place, returning the removed elements. Out-of-range
	/// arguments are clamped. A splice that neither removes nor inserts is
	/// a no-op with no notification.
	pub fn splice(
		&self,
		start: usize,
		delete_count: usize,
		insert: Vec<Value>,
	) -> Result<Vec<Value>> {
		let inserted = insert.len();
		let (old_len, start, removed) = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			let start = start.min(old_len);
			let delete_count = delete_count.min(old_len - start);
			if delete_count == 0 && insert.is_empty() {
				return Ok(Vec::new());
			}
			let removed: Vec<Value> = items.splice(start..start + delete_count, insert).collect();
			(old_len, start, removed)
		};

		let mut slots: Vec<IndexSlot> = (0..start).map(IndexSlot::Retained).collect();
		slots.extend(std::iter::repeat_n(IndexSlot::New, inserted));
		slots.extend((start + removed.len()..old_len).map(IndexSlot::Retained));
		let deleted: Vec<usize> = (start..start + removed.len()).collect();
		self.notify_structural(old_len, IndexMap::from_parts(slots, deleted))?;
		Ok(removed)
	}

	/// Reverse in place. Arrays shorter than two elements are unchanged
	/// and nothing is notified.
	pub fn reverse(&self) -> Result<()> {
		let old_len = {
			let mut items = self.inner.items.borrow_mut();
			if items.len() < 2 {
				return Ok(());
			}
			items.reverse();
			items.len()
		};
		let slots: Vec<IndexSlot> = (0..old_len)
			.map(|i| IndexSlot::Retained(old_len - 1 - i))
			.collect();
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))
	}

	/// Stable sort by a comparator. If the resulting order equals the
	/// current order, nothing is mutated or notified.
	pub fn sort_by(&self, compare: impl Fn(&Value, &Value) -> Ordering) -> Result<()> {
		let (old_len, slots) = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			if old_len < 2 {
				return Ok(());
			}
			let mut paired: Vec<(usize, Value)> = items.drain(..).enumerate().collect();
			paired.sort_by(|a, b| compare(&a.1, &b.1));
			let unchanged = paired.iter().enumerate().all(|(new_i, (old_i, _))| new_i == *old_i);
			let slots: Vec<IndexSlot> = paired
				.iter()
				.map(|(old_i, _)| IndexSlot::Retained(*old_i))
				.collect();
			items.extend(paired.into_iter().map(|(_, value)| value));
			if unchanged {
				return Ok(());
			}
			(old_len, slots)
		};
		self.notify_structural(old_len, IndexMap::from_parts(slots, Vec::new()))
	}

	/// Write one element. Writing a SameValue-equal element is a no-op.
	/// Writing past the end fills the gap with `Null`.
	pub fn set_index(&self, index: usize, value: Value) -> Result<()> {
		enum Write {
			Replaced,
			Grown { added: usize },
		}
		let (old_len, write) = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			if index < old_len {
				if same_value(&items[index], &value) {
					return Ok(());
				}
				items[index] = value;
				(old_len, Write::Replaced)
			} else {
				items.resize(index, Value::Null);
				items.push(value);
				(
					old_len,
					Write::Grown {
						added: index - old_len + 1,
					},
				)
			}
		};
		let map = match write {
			Write::Replaced => {
				let mut map = IndexMap::identity(old_len);
				map.mark_replaced(index);
				map
			}
			Write::Grown { added } => {
				let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
				slots.extend(std::iter::repeat_n(IndexSlot::New, added));
				IndexMap::from_parts(slots, Vec::new())
			}
		};
		self.notify_structural(old_len, map)
	}

	/// Truncate or grow to `new_len`, filling new slots with `Null`.
	/// Setting the current length is a no-op.
	pub fn set_length(&self, new_len: usize) -> Result<()> {
		let old_len = {
			let mut items = self.inner.items.borrow_mut();
			let old_len = items.len();
			if new_len == old_len {
				return Ok(());
			}
			items.resize(new_len, Value::Null);
			old_len
		};
		let map = if new_len < old_len {
			IndexMap::from_parts(
				(0..new_len).map(IndexSlot::Retained).collect(),
				(new_len..old_len).collect(),
			)
		} else {
			let mut slots: Vec<IndexSlot> = (0..old_len).map(IndexSlot::Retained).collect();
			slots.extend(std::iter::repeat_n(IndexSlot::New, new_len - old_len));
			IndexMap::from_parts(slots, Vec::new())
		};
		self.notify_structural(old_len, map)
	}

	fn notify_structural(&self, old_len: usize, map: IndexMap) -> Result<()> {
		debug_assert!(map.is_consistent(old_len));
		if let Some(observer) = self.existing_observer() {
			observer.notify_collection(&map, ChangeFlags::NONE)?;
		}
		Ok(())
	}
}

impl fmt::Debug for ObservedArray {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObservedArray")
			.field("items", &*self.inner.items.borrow())
			.finish()
	}
}

/// Structural observer of one [`ObservedArray`] instance. Owns the
/// subscriber registry and the derived length/index observers.
pub struct ArrayObserver {
	array: WeakArray,
	registry: SubscriberRecord,
	length_observer: RefCell<Option<Rc<CollectionLengthObserver>>>,
	index_observers: RefCell<BTreeMap<usize, Rc<ArrayIndexObserver>>>,
	self_ref: Weak<ArrayObserver>,
}

impl ArrayObserver {
	fn new(array: WeakArray) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			array,
			registry: SubscriberRecord::new(),
			length_observer: RefCell::new(None),
			index_observers: RefCell::new(BTreeMap::new()),
			self_ref: self_ref.clone(),
		})
	}

	pub(crate) fn handle(&self) -> Option<ObservedArray> {
		self.array.upgrade()
	}

	/// The derived observer for the array's `length` pseudo-property.
	pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
		let mut slot = self.length_observer.borrow_mut();
		match slot.as_ref() {
			Some(observer) => Rc::clone(observer),
			None => {
				let current = self
					.array
					.upgrade()
					.map(|a| a.len_untracked())
					.unwrap_or_default();
				let observer = CollectionLengthObserver::new(self.array.clone(), current);
				*slot = Some(Rc::clone(&observer));
				drop(slot);
				self.registry
					.add(Rc::clone(&observer) as Rc<dyn Subscriber>);
				observer
			}
		}
	}

	/// The derived observer for one array index.
	pub fn index_observer(&self, index: usize) -> Rc<ArrayIndexObserver> {
		let mut observers = self.index_observers.borrow_mut();
		match observers.get(&index) {
			Some(observer) => Rc::clone(observer),
			None => {
				let current = self
					.array
					.upgrade()
					.and_then(|a| a.get_untracked(index))
					.unwrap_or(Value::Null);
				let observer = ArrayIndexObserver::new(self.array.clone(), index, current);
				observers.insert(index, Rc::clone(&observer));
				drop(observers);
				self.registry
					.add(Rc::clone(&observer) as Rc<dyn Subscriber>);
				observer
			}
		}
	}

	/// Deliver a structural change to every subscriber.
	pub fn notify_collection(&self, index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		self.registry.notify_collection(index_map, flags)
	}

	/// Number of registered subscribers (derived observers included).
	pub fn subscriber_count(&self) -> usize {
		self.registry.count()
	}

	fn self_rc(&self) -> Option<Rc<ArrayObserver>> {
		self.self_ref.upgrade()
	}
}

impl Observable for ArrayObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_rc() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(self.handle().map(Value::Array).unwrap_or(Value::Null))
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Err(ObservationError::read_only("[array]"))
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
	}
}

/// Scalar observer for one index of an observed array. Writes are funnelled
/// through the structural notification path; scalar notifications are
/// derived from the structural ones.
pub struct ArrayIndexObserver {
	array: WeakArray,
	index: usize,
	registry: SubscriberRecord,
	old_value: RefCell<Value>,
	self_ref: Weak<ArrayIndexObserver>,
}

impl ArrayIndexObserver {
	fn new(array: WeakArray, index: usize, current: Value) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			array,
			index,
			registry: SubscriberRecord::new(),
			old_value: RefCell::new(current),
			self_ref: self_ref.clone(),
		})
	}

	pub fn index(&self) -> usize {
		self.index
	}

	fn current(&self) -> Value {
		self.array
			.upgrade()
			.and_then(|a| a.get_untracked(self.index))
			.unwrap_or(Value::Null)
	}
}

impl Subscriber for ArrayIndexObserver {
	fn handle_collection_change(&self, _index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		let current = self.current();
		let previous = self.old_value.borrow().clone();
		if same_value(&current, &previous) {
			return Ok(());
		}
		*self.old_value.borrow_mut() = current.clone();
		self.registry.notify(&current, &previous, flags)
	}
}

impl Observable for ArrayIndexObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(self.current())
	}

	fn set_value(&self, value: Value, _flags: ChangeFlags) -> Result<()> {
		match self.array.upgrade() {
			Some(array) => array.set_index(self.index, value),
			None => Ok(()),
		}
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

		fn last(&self) -> IndexMap {
			self.maps.borrow().last().cloned().expect("no notification")
		}

		fn notification_count(&self) -> usize {
			self.maps.borrow().len()
		}
	}

	impl Subscriber for CollectingSubscriber {
		fn handle_collection_change(&self, index_map: &IndexMap, _flags: ChangeFlags) -> Result<()> {
			self.maps.borrow_mut().push(index_map.clone());
			Ok(())
		}
	}

	fn observed(values: Vec<i64>) -> (ObservedArray, Rc<CollectingSubscriber>) {
		let array = ObservedArray::from_values(values.into_iter().map(Value::from).collect());
		let sub = CollectingSubscriber::new();
		array.observer().subscribe(Rc::clone(&sub) as Rc<dyn Subscriber>);
		(array, sub)
	}

	#[test]
	fn test_push_records_new_slot() {
		let (array, sub) = observed(vec![1, 2, 3]);
		array.push(Value::from(4i64)).unwrap();

		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[
				IndexSlot::Retained(0),
				IndexSlot::Retained(1),
				IndexSlot::Retained(2),
				IndexSlot::New
			]
		);
		assert!(map.deleted_items().is_empty());
	}

	#[test]
	fn test_splice_replace_middle() {
		let (array, sub) = observed(vec![10, 20, 30]);
		let removed = array.splice(1, 1, vec![Value::from(99i64)]).unwrap();

		assert_eq!(removed.len(), 1);
		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[IndexSlot::Retained(0), IndexSlot::New, IndexSlot::Retained(2)]
		);
		assert_eq!(map.deleted_items(), &[1]);
	}

	#[test]
	fn test_empty_splice_is_noop() {
		let (array, sub) = observed(vec![1, 2]);
		array.splice(1, 0, Vec::new()).unwrap();
		assert_eq!(sub.notification_count(), 0);
	}

	#[test]
	fn test_pop_empty_is_noop() {
		let (array, sub) = observed(vec![]);
		assert_eq!(array.pop().unwrap(), None);
		assert_eq!(sub.notification_count(), 0);
	}

	#[test]
	fn test_shift_and_unshift() {
		let (array, sub) = observed(vec![1, 2, 3]);

		array.shift().unwrap();
		let map = sub.last();
		assert_eq!(map.slots(), &[IndexSlot::Retained(1), IndexSlot::Retained(2)]);
		assert_eq!(map.deleted_items(), &[0]);

		array.unshift(Value::from(0i64)).unwrap();
		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[IndexSlot::New, IndexSlot::Retained(0), IndexSlot::Retained(1)]
		);
	}

	#[test]
	fn test_reverse_maps_moves() {
		let (array, sub) = observed(vec![1, 2, 3]);
		array.reverse().unwrap();

		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[
				IndexSlot::Retained(2),
				IndexSlot::Retained(1),
				IndexSlot::Retained(0)
			]
		);
		assert_eq!(array.get_untracked(0), Some(Value::from(3i64)));
	}

	#[test]
	fn test_sort_records_permutation() {
		let (array, sub) = observed(vec![3, 1, 2]);
		array
			.sort_by(|a, b| match (a, b) {
				(Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
				_ => Ordering::Equal,
			})
			.unwrap();

		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[
				IndexSlot::Retained(1),
				IndexSlot::Retained(2),
				IndexSlot::Retained(0)
			]
		);
	}

	#[test]
	fn test_sorted_array_sort_is_noop() {
		let (array, sub) = observed(vec![1, 2, 3]);
		array
			.sort_by(|a, b| match (a, b) {
				(Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
				_ => Ordering::Equal,
			})
			.unwrap();
		assert_eq!(sub.notification_count(), 0);
	}

	#[test]
	fn test_set_index_same_value_is_noop() {
		let (array, sub) = observed(vec![5]);
		array.set_index(0, Value::from(5i64)).unwrap();
		assert_eq!(sub.notification_count(), 0);

		array.set_index(0, Value::from(6i64)).unwrap();
		assert_eq!(sub.notification_count(), 1);
		let map = sub.last();
		assert_eq!(map.slots(), &[IndexSlot::New]);
		assert_eq!(map.deleted_items(), &[0]);
	}

	#[test]
	fn test_set_index_past_end_fills_nulls() {
		let (array, sub) = observed(vec![1]);
		array.set_index(3, Value::from(9i64)).unwrap();

		assert_eq!(array.len_untracked(), 4);
		assert_eq!(array.get_untracked(1), Some(Value::Null));
		let map = sub.last();
		assert_eq!(
			map.slots(),
			&[
				IndexSlot::Retained(0),
				IndexSlot::New,
				IndexSlot::New,
				IndexSlot::New
			]
		);
	}

	#[test]
	fn test_set_length_truncates_with_deletions() {
		let (array, sub) = observed(vec![1, 2, 3, 4]);
		array.set_length(2).unwrap();

		let map = sub.last();
		assert_eq!(map.slots(), &[IndexSlot::Retained(0), IndexSlot::Retained(1)]);
		assert_eq!(map.deleted_items(), &[2, 3]);
	}

	#[test]
	fn test_unobserved_array_mutation_has_no_observer() {
		let array = ObservedArray::from_values(vec![Value::from(1i64)]);
		array.push(Value::from(2i64)).unwrap();
		assert!(array.existing_observer().is_none());
		assert_eq!(array.len_untracked(), 2);
	}

	#[test]
	fn test_index_observer_scalar_notification() {
		use std::cell::RefCell as Cells;

		struct ScalarProbe {
			changes: Cells<Vec<(Value, Value)>>,
		}
		impl Subscriber for ScalarProbe {
			fn handle_change(&self, new: &Value, old: &Value, _flags: ChangeFlags) -> Result<()> {
				self.changes.borrow_mut().push((new.clone(), old.clone()));
				Ok(())
			}
		}

		let array = ObservedArray::from_values(vec![Value::from(1i64), Value::from(2i64)]);
		let index_observer = array.observer().index_observer(0);
		let probe = Rc::new(ScalarProbe {
			changes: Cells::new(Vec::new()),
		});
		index_observer.subscribe(Rc::clone(&probe) as Rc<dyn Subscriber>);

		// A structural change that shifts index 0 produces a scalar change.
		array.shift().unwrap();
		let changes = probe.changes.borrow();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].0, Value::from(2i64));
		assert_eq!(changes[0].1, Value::from(1i64));
	}
}
