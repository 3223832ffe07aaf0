//! Observer for a property of a primitive value.
//!
//! Primitives cannot change in place, so writes and subscriptions are
//! no-ops. The locator never caches these: a fresh wrapper is created for
//! each distinct primitive value it is attached to.

use std::rc::Rc;

use crate::error::Result;
use crate::flags::ChangeFlags;
use crate::subscriber::{Observable, Subscriber};
use crate::value::Value;

pub struct PrimitiveObserver {
	value: Value,
	key: String,
}

impl PrimitiveObserver {
	pub fn new(value: Value, key: impl Into<String>) -> Rc<Self> {
		Rc::new(Self {
			value,
			key: key.into(),
		})
	}
}

impl Observable for PrimitiveObserver {
	fn get_value(&self) -> Result<Value> {
		match (&self.value, self.key.as_str()) {
			(Value::Text(text), "length") => Ok(Value::from(text.chars().count())),
			_ => Ok(Value::Null),
		}
	}

	fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
		Ok(())
	}

	fn subscribe_flagged(&self, _subscriber: Rc<dyn Subscriber>, _own_flags: ChangeFlags) {}

	fn unsubscribe(&self, _subscriber: &Rc<dyn Subscriber>) {}
}
