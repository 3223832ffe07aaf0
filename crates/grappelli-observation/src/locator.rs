//! Observer locator: picks the correct observation strategy for a
//! `(target, key)` pair.
//!
//! Precedence for observed objects:
//! 1. the observer already cached on the object for this key;
//! 2. a pluggable host-environment locator that claims the pair;
//! 3. built-in well-known keys (`length` on arrays, `size` on maps and
//!    sets, numeric indices on arrays);
//! 4. accessor properties: registered adapters first, then computed for
//!    reconfigurable accessors, else the dirty-check fallback;
//! 5. plain data properties: the setter observer.
//!
//! Primitive targets always yield an uncached [`PrimitiveObserver`].

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::collections::{ArrayObserver, MapObserver, ObservedArray, ObservedMap, ObservedSet, SetObserver};
use crate::error::{ObservationError, Result};
use crate::object::ObservedObject;
use crate::observers::computed::ComputedObserver;
use crate::observers::dirty::{DirtyCheckProperty, with_dirty_checker};
use crate::observers::primitive::PrimitiveObserver;
use crate::observers::setter::SetterObserver;
use crate::subscriber::Observable;
use crate::value::Value;

/// Host hook claiming environment-specific `(target, key)` pairs, such as
/// UI-element attributes. Checked before the built-in strategies.
pub trait NodeObserverLocator {
	fn handles(&self, target: &Value, key: &str) -> bool;

	fn get_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn Observable>>;

	fn get_accessor(&self, target: &Value, key: &str) -> Result<Rc<dyn PropertyAccessor>> {
		let _ = (target, key);
		Err(ObservationError::not_implemented("node accessor"))
	}
}

/// Adapter consulted for accessor properties before the built-in computed
/// and dirty-check strategies.
pub trait ObservationAdapter {
	/// Return an observer for the pair, or `None` to decline it.
	fn get_observer(&self, object: &ObservedObject, key: &str) -> Option<Rc<dyn Observable>>;
}

/// Non-observing read/write pair for a `(target, key)`.
///
/// Reads never register dependencies; writes go through the target's
/// ordinary write semantics but create no observers.
pub trait PropertyAccessor {
	fn get_value(&self) -> Result<Value>;
	fn set_value(&self, value: Value) -> Result<()>;
}

struct LocatorInner {
	adapters: RefCell<Vec<Rc<dyn ObservationAdapter>>>,
	node_locator: RefCell<Option<Rc<dyn NodeObserverLocator>>>,
}

/// Factory selecting the correct observable for a `(target, key)` pair.
/// Cheap to clone; clones share adapter and node-locator registrations.
#[derive(Clone)]
pub struct ObserverLocator {
	inner: Rc<LocatorInner>,
}

impl Default for ObserverLocator {
	fn default() -> Self {
		Self::new()
	}
}

impl ObserverLocator {
	pub fn new() -> Self {
		Self {
			inner: Rc::new(LocatorInner {
				adapters: RefCell::new(Vec::new()),
				node_locator: RefCell::new(None),
			}),
		}
	}

	/// Register an adapter for accessor properties.
	pub fn add_adapter(&self, adapter: Rc<dyn ObservationAdapter>) {
		self.inner.adapters.borrow_mut().push(adapter);
	}

	/// Install the host-environment observer locator.
	pub fn set_node_observer_locator(&self, locator: Rc<dyn NodeObserverLocator>) {
		*self.inner.node_locator.borrow_mut() = Some(locator);
	}

	/// The observable for `(target, key)`.
	pub fn get_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn Observable>> {
		match target {
			Value::Object(object) => self.get_object_observer(object, key),
			Value::Array(array) => Ok(self.array_key_observer(array, key)),
			Value::Map(map) => match key {
				"size" => Ok(map.observer().size_observer() as Rc<dyn Observable>),
				_ => Ok(PrimitiveObserver::new(target.clone(), key) as Rc<dyn Observable>),
			},
			Value::Set(set) => match key {
				"size" => Ok(set.observer().size_observer() as Rc<dyn Observable>),
				_ => Ok(PrimitiveObserver::new(target.clone(), key) as Rc<dyn Observable>),
			},
			// Primitives always get a fresh, uncached wrapper.
			_ => Ok(PrimitiveObserver::new(target.clone(), key) as Rc<dyn Observable>),
		}
	}

	/// The observable for a property of an observed object.
	pub fn get_object_observer(
		&self,
		object: &ObservedObject,
		key: &str,
	) -> Result<Rc<dyn Observable>> {
		if let Some(cached) = object.cached_observer(key) {
			return Ok(cached);
		}

		if let Some(node_locator) = self.inner.node_locator.borrow().clone() {
			let target = Value::Object(object.clone());
			if node_locator.handles(&target, key) {
				let observer = node_locator.get_observer(&target, key)?;
				object.cache_observer(key, Rc::clone(&observer));
				return Ok(observer);
			}
		}

		let observer = self.build_object_observer(object, key)?;
		object.cache_observer(key, Rc::clone(&observer));
		trace!(key, "observer created");
		Ok(observer)
	}

	fn build_object_observer(
		&self,
		object: &ObservedObject,
		key: &str,
	) -> Result<Rc<dyn Observable>> {
		use crate::object::SlotKind;

		match object.slot_kind(key) {
			None => {
				// Observing an undeclared property defines it as Null data.
				object.ensure_data_slot(key);
				Ok(SetterObserver::new(object.downgrade(), key.to_string()) as Rc<dyn Observable>)
			}
			Some(SlotKind::Data) => {
				Ok(SetterObserver::new(object.downgrade(), key.to_string()) as Rc<dyn Observable>)
			}
			Some(SlotKind::Observable) => object.ensure_notifier(key),
			Some(SlotKind::Accessor) => {
				for adapter in self.inner.adapters.borrow().iter() {
					if let Some(observer) = adapter.get_observer(object, key) {
						return Ok(observer);
					}
				}
				let Some((get, set, reconfigurable)) = object.accessor_parts(key) else {
					return Err(ObservationError::invariant(format!(
						"accessor slot for '{key}' disappeared during lookup"
					)));
				};
				if reconfigurable {
					let weak = object.downgrade();
					let getter = move || match weak.upgrade() {
						Some(object) => (*get)(&object),
						None => Ok(Value::Null),
					};
					let setter = set.map(|set| {
						let weak = object.downgrade();
						move |value: Value| match weak.upgrade() {
							Some(object) => (*set)(&object, value),
							None => Ok(()),
						}
					});
					let observer = match setter {
						Some(setter) => ComputedObserver::named(
							self,
							key.to_string(),
							Rc::new(getter),
							Some(Rc::new(setter)),
						),
						None => {
							ComputedObserver::named(self, key.to_string(), Rc::new(getter), None)
						}
					};
					Ok(observer as Rc<dyn Observable>)
				} else {
					let strict = with_dirty_checker(|checker| checker.settings().throw_on_dirty_check);
					if strict {
						return Err(ObservationError::DirtyCheckDisallowed {
							property: key.to_string(),
						});
					}
					Ok(DirtyCheckProperty::new(object.downgrade(), key.to_string())
						as Rc<dyn Observable>)
				}
			}
		}
	}

	/// A non-observing read/write pair for `(target, key)`.
	pub fn get_accessor(&self, target: &Value, key: &str) -> Result<Rc<dyn PropertyAccessor>> {
		if let Some(node_locator) = self.inner.node_locator.borrow().clone() {
			if node_locator.handles(target, key) {
				return node_locator.get_accessor(target, key);
			}
		}
		Ok(Rc::new(ValuePropertyAccessor {
			target: target.clone(),
			key: key.to_string(),
		}))
	}

	/// Structural observer of an array instance.
	pub fn get_array_observer(&self, array: &ObservedArray) -> Rc<ArrayObserver> {
		array.observer()
	}

	/// Structural observer of a map instance.
	pub fn get_map_observer(&self, map: &ObservedMap) -> Rc<MapObserver> {
		map.observer()
	}

	/// Structural observer of a set instance.
	pub fn get_set_observer(&self, set: &ObservedSet) -> Rc<SetObserver> {
		set.observer()
	}

	/// Structural observer of any collection value; fails with
	/// [`ObservationError::NotImplemented`] for non-collections.
	pub fn get_collection_observer(&self, target: &Value) -> Result<Rc<dyn Observable>> {
		match target {
			Value::Array(array) => Ok(array.observer() as Rc<dyn Observable>),
			Value::Map(map) => Ok(map.observer() as Rc<dyn Observable>),
			Value::Set(set) => Ok(set.observer() as Rc<dyn Observable>),
			other => Err(ObservationError::not_implemented(format!(
				"collection observer for {}",
				other.type_name()
			))),
		}
	}

	fn array_key_observer(&self, array: &ObservedArray, key: &str) -> Rc<dyn Observable> {
		if key == "length" {
			return array.observer().length_observer() as Rc<dyn Observable>;
		}
		if let Ok(index) = key.parse::<usize>() {
			return array.observer().index_observer(index) as Rc<dyn Observable>;
		}
		PrimitiveObserver::new(Value::Array(array.clone()), key) as Rc<dyn Observable>
	}
}

/// Default [`PropertyAccessor`]: direct reads, writes routed through the
/// target's ordinary write semantics.
struct ValuePropertyAccessor {
	target: Value,
	key: String,
}

impl PropertyAccessor for ValuePropertyAccessor {
	fn get_value(&self) -> Result<Value> {
		match &self.target {
			Value::Object(object) => object.get_untracked(&self.key),
			Value::Array(array) => match self.key.as_str() {
				"length" => Ok(Value::from(array.len_untracked())),
				key => match key.parse::<usize>() {
					Ok(index) => Ok(array.get_untracked(index).unwrap_or(Value::Null)),
					Err(_) => Ok(Value::Null),
				},
			},
			Value::Map(map) if self.key == "size" => Ok(Value::from(map.size_untracked())),
			Value::Set(set) if self.key == "size" => Ok(Value::from(set.size_untracked())),
			_ => Ok(Value::Null),
		}
	}

	fn set_value(&self, value: Value) -> Result<()> {
		match &self.target {
			Value::Object(object) => object.set(&self.key, value),
			Value::Array(array) => match self.key.as_str() {
				"length" => {
					let Some(new_len) = value.as_array_length() else {
						return Err(ObservationError::invalid_write(
							"length",
							format!("expected a non-negative integer, got {}", value.type_name()),
						));
					};
					array.set_length(new_len)
				}
				key => match key.parse::<usize>() {
					Ok(index) => array.set_index(index, value),
					Err(_) => Ok(()),
				},
			},
			Value::Map(_) | Value::Set(_) if self.key == "size" => {
				Err(ObservationError::read_only("size"))
			}
			_ => Ok(()),
		}
	}
}
