//! Observed objects: named property storage built at registration time.
//!
//! There is no runtime property reflection in Rust, so the shape of an
//! observed object is declared up front with [`ObjectBuilder`]: plain data
//! fields, observable fields (optional coercion and change callback) and
//! accessor properties (computed, optionally writable, optionally sealed).
//! Every read and write goes through the object handle from the start, so
//! "upgrading" a property to an observed one is an internal state change
//! rather than a shape mutation.
//!
//! Reads performed while a dependency record is collecting resolve the
//! property's observer through the record's locator and read through it,
//! which registers the dependency.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{ObservationError, Result};
use crate::flags::ChangeFlags;
use crate::observers::notifier::SetterNotifier;
use crate::subscriber::Observable;
use crate::tracker;
use crate::value::Value;

/// Getter of an accessor property.
pub type GetterFn = dyn Fn(&ObservedObject) -> Result<Value>;
/// Setter of an accessor property.
pub type SetterFn = dyn Fn(&ObservedObject, Value) -> Result<()>;
/// Coercion applied to every value written to an observable field.
pub type CoerceFn = dyn Fn(Value) -> Value;
/// Change callback of an observable field, invoked with (new, old).
pub type ChangedFn = dyn Fn(&Value, &Value);

pub(crate) enum PropertySlot {
	/// Plain data field.
	Data(Value),
	/// Observable field declared at build time; writes run through a
	/// [`SetterNotifier`].
	Observable {
		value: Value,
		coerce: Option<Rc<CoerceFn>>,
		changed: Option<Rc<ChangedFn>>,
	},
	/// Accessor property. Reconfigurable accessors are observed as
	/// computed values; sealed ones fall back to dirty checking.
	Accessor {
		get: Rc<GetterFn>,
		set: Option<Rc<SetterFn>>,
		reconfigurable: bool,
	},
}

/// Kind of a property slot, used by the locator to pick a strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotKind {
	Data,
	Observable,
	Accessor,
}

pub(crate) struct ObjectInner {
	slots: RefCell<BTreeMap<String, PropertySlot>>,
	/// Private observer lookup table: one cached observer per key.
	observers: RefCell<BTreeMap<String, Rc<dyn Observable>>>,
}

/// Handle to a shared observed object. Clones share the same storage and
/// compare equal by identity.
#[derive(Clone)]
pub struct ObservedObject {
	inner: Rc<ObjectInner>,
}

#[derive(Clone)]
pub(crate) struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
	pub(crate) fn upgrade(&self) -> Option<ObservedObject> {
		self.0.upgrade().map(|inner| ObservedObject { inner })
	}
}

impl Default for ObservedObject {
	fn default() -> Self {
		Self::new()
	}
}

impl ObservedObject {
	/// An object with no declared properties. Writes to unknown keys
	/// define plain data fields on demand.
	pub fn new() -> Self {
		Self {
			inner: Rc::new(ObjectInner {
				slots: RefCell::new(BTreeMap::new()),
				observers: RefCell::new(BTreeMap::new()),
			}),
		}
	}

	pub fn builder() -> ObjectBuilder {
		ObjectBuilder {
			slots: BTreeMap::new(),
		}
	}

	/// Identity comparison of handles.
	pub fn handle_eq(&self, other: &ObservedObject) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakObject {
		WeakObject(Rc::downgrade(&self.inner))
	}

	/// Read a property. During an active evaluation the read resolves the
	/// property's observer through the collecting record's locator and
	/// registers it as a dependency.
	pub fn get(&self, key: &str) -> Result<Value> {
		if let Some(record) = tracker::current_connecting() {
			let observer = record.locator().get_object_observer(self, key)?;
			return observer.get_value();
		}
		self.read_raw(key)
	}

	/// Read a property without registering a dependency.
	pub fn get_untracked(&self, key: &str) -> Result<Value> {
		self.read_raw(key)
	}

	/// Write a property, routing through its observer semantics: observed
	/// data fields short-circuit SameValue-equal writes and notify,
	/// observable fields coerce and invoke their change callback, computed
	/// accessors run their setter, sealed accessors without a setter are
	/// read-only.
	pub fn set(&self, key: &str, value: Value) -> Result<()> {
		self.set_with_flags(key, value, ChangeFlags::NONE)
	}

	pub fn set_with_flags(&self, key: &str, value: Value, flags: ChangeFlags) -> Result<()> {
		match self.slot_kind(key) {
			None | Some(SlotKind::Data) => {
				if let Some(observer) = self.cached_observer(key) {
					observer.set_value(value, flags)
				} else {
					self.write_data(key, value);
					Ok(())
				}
			}
			Some(SlotKind::Observable) => self.ensure_notifier(key)?.set_value(value, flags),
			Some(SlotKind::Accessor) => {
				if let Some(observer) = self.cached_observer(key) {
					return observer.set_value(value, flags);
				}
				let setter = {
					let slots = self.inner.slots.borrow();
					match slots.get(key) {
						Some(PropertySlot::Accessor { set, .. }) => set.clone(),
						_ => None,
					}
				};
				match setter {
					Some(set) => (*set)(self, value),
					None => Err(ObservationError::read_only(key)),
				}
			}
		}
	}

	/// Whether the property is declared (or was defined by a write).
	pub fn has(&self, key: &str) -> bool {
		self.inner.slots.borrow().contains_key(key)
	}

	/// Declared property names, in sorted order.
	pub fn keys(&self) -> Vec<String> {
		self.inner.slots.borrow().keys().cloned().collect()
	}

	fn read_raw(&self, key: &str) -> Result<Value> {
		let getter = {
			let slots = self.inner.slots.borrow();
			match slots.get(key) {
				None => return Ok(Value::Null),
				Some(PropertySlot::Data(value)) => return Ok(value.clone()),
				Some(PropertySlot::Observable { value, .. }) => return Ok(value.clone()),
				Some(PropertySlot::Accessor { get, .. }) => Rc::clone(get),
			}
		};
		// The accessor getter may read other properties of this object;
		// the slot borrow is released first.
		(*getter)(self)
	}

	pub(crate) fn slot_kind(&self, key: &str) -> Option<SlotKind> {
		self.inner.slots.borrow().get(key).map(|slot| match slot {
			PropertySlot::Data(_) => SlotKind::Data,
			PropertySlot::Observable { .. } => SlotKind::Observable,
			PropertySlot::Accessor { .. } => SlotKind::Accessor,
		})
	}

	/// Raw value of a data or observable slot, defining a `Null` data slot
	/// on demand.
	pub(crate) fn read_data(&self, key: &str) -> Value {
		match self.inner.slots.borrow().get(key) {
			Some(PropertySlot::Data(value)) | Some(PropertySlot::Observable { value, .. }) => {
				value.clone()
			}
			_ => Value::Null,
		}
	}

	/// Raw write to a data or observable slot: no comparison, no
	/// notification. Defines a data slot if the key is unknown.
	pub(crate) fn write_data(&self, key: &str, new_value: Value) {
		let mut slots = self.inner.slots.borrow_mut();
		match slots.get_mut(key) {
			Some(PropertySlot::Data(value)) => *value = new_value,
			Some(PropertySlot::Observable { value, .. }) => *value = new_value,
			_ => {
				slots.insert(key.to_string(), PropertySlot::Data(new_value));
			}
		}
	}

	/// Define a `Null` data slot for an unknown key, so it can be observed
	/// before it is first written.
	pub(crate) fn ensure_data_slot(&self, key: &str) {
		let mut slots = self.inner.slots.borrow_mut();
		slots
			.entry(key.to_string())
			.or_insert(PropertySlot::Data(Value::Null));
	}

	pub(crate) fn accessor_parts(
		&self,
		key: &str,
	) -> Option<(Rc<GetterFn>, Option<Rc<SetterFn>>, bool)> {
		match self.inner.slots.borrow().get(key) {
			Some(PropertySlot::Accessor {
				get,
				set,
				reconfigurable,
			}) => Some((Rc::clone(get), set.clone(), *reconfigurable)),
			_ => None,
		}
	}

	pub(crate) fn cached_observer(&self, key: &str) -> Option<Rc<dyn Observable>> {
		self.inner.observers.borrow().get(key).cloned()
	}

	pub(crate) fn cache_observer(&self, key: &str, observer: Rc<dyn Observable>) {
		self.inner
			.observers
			.borrow_mut()
			.insert(key.to_string(), observer);
	}

	/// The setter notifier backing an observable field, created and cached
	/// on first use so unobserved writes still run coercion and callbacks.
	pub(crate) fn ensure_notifier(&self, key: &str) -> Result<Rc<dyn Observable>> {
		if let Some(observer) = self.cached_observer(key) {
			return Ok(observer);
		}
		let (coerce, changed) = {
			let slots = self.inner.slots.borrow();
			match slots.get(key) {
				Some(PropertySlot::Observable {
					coerce, changed, ..
				}) => (coerce.clone(), changed.clone()),
				_ => {
					return Err(ObservationError::invariant(format!(
						"property '{key}' is not an observable field"
					)));
				}
			}
		};
		let notifier =
			SetterNotifier::new(self.downgrade(), key.to_string(), coerce, changed) as Rc<dyn Observable>;
		self.cache_observer(key, Rc::clone(&notifier));
		Ok(notifier)
	}
}

impl fmt::Debug for ObservedObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObservedObject")
			.field("keys", &self.keys())
			.finish()
	}
}

/// Declares the shape of an [`ObservedObject`].
pub struct ObjectBuilder {
	slots: BTreeMap<String, PropertySlot>,
}

impl ObjectBuilder {
	/// Plain data field.
	pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.slots.insert(key.into(), PropertySlot::Data(value.into()));
		self
	}

	/// Observable field with no coercion or callback.
	pub fn observable(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.observable_slot(key.into(), value.into(), None, None)
	}

	/// Observable field whose writes are coerced before comparison.
	pub fn observable_coerced(
		self,
		key: impl Into<String>,
		value: impl Into<Value>,
		coerce: impl Fn(Value) -> Value + 'static,
	) -> Self {
		self.observable_slot(key.into(), value.into(), Some(Rc::new(coerce)), None)
	}

	/// Observable field with a change callback invoked with (new, old) on
	/// every effective write, before subscribers are notified.
	pub fn observable_changed(
		self,
		key: impl Into<String>,
		value: impl Into<Value>,
		changed: impl Fn(&Value, &Value) + 'static,
	) -> Self {
		self.observable_slot(key.into(), value.into(), None, Some(Rc::new(changed)))
	}

	/// Observable field with both a coercion and a change callback.
	pub fn observable_with(
		self,
		key: impl Into<String>,
		value: impl Into<Value>,
		coerce: impl Fn(Value) -> Value + 'static,
		changed: impl Fn(&Value, &Value) + 'static,
	) -> Self {
		self.observable_slot(
			key.into(),
			value.into(),
			Some(Rc::new(coerce)),
			Some(Rc::new(changed)),
		)
	}

	fn observable_slot(
		mut self,
		key: String,
		value: Value,
		coerce: Option<Rc<CoerceFn>>,
		changed: Option<Rc<ChangedFn>>,
	) -> Self {
		self.slots.insert(
			key,
			PropertySlot::Observable {
				value,
				coerce,
				changed,
			},
		);
		self
	}

	/// Read-only computed accessor, observed as a computed value.
	pub fn computed(
		mut self,
		key: impl Into<String>,
		get: impl Fn(&ObservedObject) -> Result<Value> + 'static,
	) -> Self {
		self.slots.insert(
			key.into(),
			PropertySlot::Accessor {
				get: Rc::new(get),
				set: None,
				reconfigurable: true,
			},
		);
		self
	}

	/// Writable computed accessor.
	pub fn computed_writable(
		mut self,
		key: impl Into<String>,
		get: impl Fn(&ObservedObject) -> Result<Value> + 'static,
		set: impl Fn(&ObservedObject, Value) -> Result<()> + 'static,
	) -> Self {
		self.slots.insert(
			key.into(),
			PropertySlot::Accessor {
				get: Rc::new(get),
				set: Some(Rc::new(set)),
				reconfigurable: true,
			},
		);
		self
	}

	/// Sealed accessor: opaque to dependency tracking, observed only
	/// through the dirty-check fallback.
	pub fn sealed(
		mut self,
		key: impl Into<String>,
		get: impl Fn(&ObservedObject) -> Result<Value> + 'static,
	) -> Self {
		self.slots.insert(
			key.into(),
			PropertySlot::Accessor {
				get: Rc::new(get),
				set: None,
				reconfigurable: false,
			},
		);
		self
	}

	pub fn build(self) -> ObservedObject {
		ObservedObject {
			inner: Rc::new(ObjectInner {
				slots: RefCell::new(self.slots),
				observers: RefCell::new(BTreeMap::new()),
			}),
		}
	}
}
