//! Derived observers for a collection's `length` / `size` pseudo-property.
//!
//! Both are subscribed to the owning collection observer's structural
//! notifications and derive their scalar change notifications from those.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::collections::array::WeakArray;
use crate::collections::index_map::IndexMap;
use crate::collections::map::WeakMap;
use crate::collections::set::WeakSet;
use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::Value;

/// Observer for an array's writable `length`.
///
/// Writes are permitted only for a valid array length (a non-negative
/// integer no greater than 2^32 - 1); anything else is an
/// [`ObservationError::InvalidWrite`].
pub struct CollectionLengthObserver {
	array: WeakArray,
	registry: SubscriberRecord,
	current: Cell<usize>,
	self_ref: Weak<CollectionLengthObserver>,
}

impl CollectionLengthObserver {
	pub(crate) fn new(array: WeakArray, current: usize) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			array,
			registry: SubscriberRecord::new(),
			current: Cell::new(current),
			self_ref: self_ref.clone(),
		})
	}

	fn length(&self) -> usize {
		self.array
			.upgrade()
			.map(|a| a.len_untracked())
			.unwrap_or_default()
	}
}

impl Subscriber for CollectionLengthObserver {
	fn handle_collection_change(&self, _index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		let new_len = self.length();
		let old_len = self.current.get();
		if new_len == old_len {
			return Ok(());
		}
		self.current.set(new_len);
		self.registry
			.notify(&Value::from(new_len), &Value::from(old_len), flags)
	}
}

impl Observable for CollectionLengthObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(Value::from(self.length()))
	}

	fn set_value(&self, value: Value, _flags: ChangeFlags) -> Result<()> {
		let Some(new_len) = value.as_array_length() else {
			return Err(ObservationError::invalid_write(
				"length",
				format!("expected a non-negative integer, got {}", value.type_name()),
			));
		};
		match self.array.upgrade() {
			Some(array) => array.set_length(new_len),
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

/// The collection backing a [`CollectionSizeObserver`].
#[derive(Clone)]
pub(crate) enum SizeSource {
	Map(WeakMap),
	Set(WeakSet),
}

impl SizeSource {
	fn size(&self) -> usize {
		match self {
			SizeSource::Map(map) => map.upgrade().map(|m| m.size_untracked()).unwrap_or_default(),
			SizeSource::Set(set) => set.upgrade().map(|s| s.size_untracked()).unwrap_or_default(),
		}
	}
}

/// Observer for a map's or set's read-only `size`.
pub struct CollectionSizeObserver {
	source: SizeSource,
	registry: SubscriberRecord,
	current: Cell<usize>,
	self_ref: Weak<CollectionSizeObserver>,
}

impl CollectionSizeObserver {
	pub(crate) fn new(source: SizeSource, current: usize) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			source,
			registry: SubscriberRecord::new(),
			current: Cell::new(current),
			self_ref: self_ref.clone(),
		})
	}
}

impl Subscriber for CollectionSizeObserver {
	fn handle_collection_change(&self, _index_map: &IndexMap, flags: ChangeFlags) -> Result<()> {
		let new_size = self.source.size();
		let old_size = self.current.get();
		if new_size == old_size {
			return Ok(());
		}
		self.current.set(new_size);
		self.registry
			.notify(&Value::from(new_size), &Value::from(old_size), flags)
	}
}

impl Observable for CollectionSizeObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(Value::from(self.source.size()))
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Err(ObservationError::read_only("size"))
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
	}
}
