//! Default observer for a plain data property.
//!
//! The property's storage always lives in the owning object's slot; the
//! observer carries an `observing` flag that is flipped on by the first
//! subscriber (`start`) and back off when the last one leaves (`stop`).
//! While not observing, writes pass through untouched, so a property that
//! nobody watches pays nothing for interception.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::Result;
use crate::flags::ChangeFlags;
use crate::object::WeakObject;
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value};

pub struct SetterObserver {
	object: WeakObject,
	key: String,
	observing: Cell<bool>,
	registry: SubscriberRecord,
	self_ref: Weak<SetterObserver>,
}

impl SetterObserver {
	pub(crate) fn new(object: WeakObject, key: String) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			object,
			key,
			observing: Cell::new(false),
			registry: SubscriberRecord::new(),
			self_ref: self_ref.clone(),
		})
	}

	/// Whether writes are currently intercepted and compared.
	pub fn is_observing(&self) -> bool {
		self.observing.get()
	}

	fn start(&self) {
		self.observing.set(true);
		trace!(key = %self.key, "setter observer started");
	}

	/// Revert to a plain pass-through field holding the last value.
	fn stop(&self) {
		self.observing.set(false);
		trace!(key = %self.key, "setter observer stopped");
	}
}

impl Observable for SetterObserver {
	fn get_value(&self) -> Result<Value> {
		if let Some(this) = self.self_ref.upgrade() {
			tracker::track_read(this as Rc<dyn Observable>);
		}
		Ok(self
			.object
			.upgrade()
			.map(|obj| obj.read_data(&self.key))
			.unwrap_or(Value::Null))
	}

	fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
		let Some(object) = self.object.upgrade() else {
			return Ok(());
		};
		if !self.observing.get() {
			object.write_data(&self.key, value);
			return Ok(());
		}
		let current = object.read_data(&self.key);
		if same_value(&value, &current) {
			return Ok(());
		}
		object.write_data(&self.key, value.clone());
		self.registry.notify(&value, &current, flags)
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		if !self.observing.get() {
			self.start();
		}
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
		if !self.registry.any() {
			self.stop();
		}
	}
}
