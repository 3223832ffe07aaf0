//! Push-configured observer for a builder-declared observable field.
//!
//! Unlike the setter observer, a notifier intercepts from the first write:
//! the optional coercion is applied to every incoming value before
//! comparison, and the optional change callback runs even with no
//! subscribers. The stored value is re-read after the callback, so a
//! callback that writes the field again cannot make the final notification
//! carry a stale value.

use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::flags::ChangeFlags;
use crate::object::{ChangedFn, CoerceFn, WeakObject};
use crate::subscriber::{Observable, Subscriber, SubscriberRecord};
use crate::tracker;
use crate::value::{Value, same_value};

pub struct SetterNotifier {
	object: WeakObject,
	key: String,
	coerce: Option<Rc<CoerceFn>>,
	changed: Option<Rc<ChangedFn>>,
	registry: SubscriberRecord,
	self_ref: Weak<SetterNotifier>,
}

impl SetterNotifier {
	pub(crate) fn new(
		object: WeakObject,
		key: String,
		coerce: Option<Rc<CoerceFn>>,
		changed: Option<Rc<ChangedFn>>,
	) -> Rc<Self> {
		Rc::new_cyclic(|self_ref| Self {
			object,
			key,
			coerce,
			changed,
			registry: SubscriberRecord::new(),
			self_ref: self_ref.clone(),
		})
	}
}

impl Observable for SetterNotifier {
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
		let value = match &self.coerce {
			Some(coerce) => (**coerce)(value),
			None => value,
		};
		let current = object.read_data(&self.key);
		if same_value(&value, &current) {
			return Ok(());
		}
		object.write_data(&self.key, value.clone());
		if let Some(changed) = &self.changed {
			(**changed)(&value, &current);
		}
		// The callback may have written the field again; notify with what
		// is actually stored.
		let latest = object.read_data(&self.key);
		self.registry.notify(&latest, &current, flags)
	}

	fn subscribe_flagged(&self, subscriber: Rc<dyn Subscriber>, own_flags: ChangeFlags) {
		self.registry.add_flagged(subscriber, own_flags);
	}

	fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
		self.registry.remove(subscriber);
	}
}
