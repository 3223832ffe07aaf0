//! Dynamic value model observed by the engine.
//!
//! Observed properties and collections hold [`Value`]s: primitives plus
//! reference-counted handles to observable collections and objects. Handles
//! compare by identity; primitives compare by the SameValue rules
//! (`NaN` equals `NaN`, `+0` and `-0` are distinct), with SameValueZero
//! (`+0` equals `-0`) used for map keys and set membership.

use std::rc::Rc;

use crate::collections::{ObservedArray, ObservedMap, ObservedSet};
use crate::object::ObservedObject;

/// Largest value an array length may take (2^32 - 1).
const MAX_ARRAY_LENGTH: f64 = 4_294_967_295.0;

/// A dynamically-typed observed value.
///
/// Cloning is cheap: text is a shared `Rc<str>`, and collection/object
/// variants are handles to shared interior state.
#[derive(Clone, Debug)]
pub enum Value {
	/// Absent / cleared value.
	Null,
	/// Boolean.
	Bool(bool),
	/// Double-precision number; integers are represented exactly up to 2^53.
	Number(f64),
	/// Immutable shared text.
	Text(Rc<str>),
	/// Handle to an observable array.
	Array(ObservedArray),
	/// Handle to an observable keyed map.
	Map(ObservedMap),
	/// Handle to an observable set.
	Set(ObservedSet),
	/// Handle to an observed object with named properties.
	Object(ObservedObject),
}

impl Value {
	/// Shorthand text constructor.
	pub fn text(s: impl AsRef<str>) -> Value {
		Value::Text(Rc::from(s.as_ref()))
	}

	/// Whether this value is a primitive (not an object or collection
	/// handle). Primitive values can never change in place, so observing
	/// them is a no-op.
	pub fn is_primitive(&self) -> bool {
		matches!(
			self,
			Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_)
		)
	}

	/// Short name of the variant, used in error messages.
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Number(_) => "number",
			Value::Text(_) => "text",
			Value::Array(_) => "array",
			Value::Map(_) => "map",
			Value::Set(_) => "set",
			Value::Object(_) => "object",
		}
	}

	/// If this value is a valid array length (a non-negative integer no
	/// greater than 2^32 - 1), return it.
	pub fn as_array_length(&self) -> Option<usize> {
		match self {
			Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_ARRAY_LENGTH => {
				Some(*n as usize)
			}
			_ => None,
		}
	}

	/// If this value is a valid array index, return it.
	pub fn as_array_index(&self) -> Option<usize> {
		match self.as_array_length() {
			Some(n) if (n as f64) < MAX_ARRAY_LENGTH => Some(n),
			_ => None,
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Value {
		Value::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Value {
		Value::Number(n)
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Value {
		Value::Number(n as f64)
	}
}

impl From<usize> for Value {
	fn from(n: usize) -> Value {
		Value::Number(n as f64)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Value {
		Value::Text(Rc::from(s))
	}
}

impl From<String> for Value {
	fn from(s: String) -> Value {
		Value::Text(Rc::from(s.as_str()))
	}
}

/// `PartialEq` follows the SameValue rules, so `Value` equality is exactly
/// the equality observers use to decide whether a write is a no-op.
impl PartialEq for Value {
	fn eq(&self, other: &Value) -> bool {
		same_value(self, other)
	}
}

/// SameValue comparison: `NaN` equals `NaN`, `+0` and `-0` are distinct,
/// handles compare by identity.
///
/// This is the equality every observer uses to decide whether a write is a
/// no-op.
pub fn same_value(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Null, Value::Null) => true,
		(Value::Bool(x), Value::Bool(y)) => x == y,
		// Bit equality gives SameValue for finite numbers and zeros; the
		// NaN check collapses all NaN payloads into one value.
		(Value::Number(x), Value::Number(y)) => {
			(x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits()
		}
		(Value::Text(x), Value::Text(y)) => x == y,
		(Value::Array(x), Value::Array(y)) => x.handle_eq(y),
		(Value::Map(x), Value::Map(y)) => x.handle_eq(y),
		(Value::Set(x), Value::Set(y)) => x.handle_eq(y),
		(Value::Object(x), Value::Object(y)) => x.handle_eq(y),
		_ => false,
	}
}

/// SameValueZero comparison: like [`same_value`] but `+0` equals `-0`.
/// Used for map-key lookup and set membership.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Number(x), Value::Number(y)) => (x.is_nan() && y.is_nan()) || x == y,
		_ => same_value(a, b),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_same_value_nan() {
		let a = Value::Number(f64::NAN);
		let b = Value::Number(f64::NAN);
		assert!(same_value(&a, &b));
		assert!(same_value_zero(&a, &b));
	}

	#[test]
	fn test_same_value_signed_zero() {
		let pos = Value::Number(0.0);
		let neg = Value::Number(-0.0);
		assert!(!same_value(&pos, &neg));
		assert!(same_value_zero(&pos, &neg));
	}

	#[test]
	fn test_same_value_mixed_types() {
		assert!(!same_value(&Value::Number(0.0), &Value::Null));
		assert!(!same_value(&Value::Bool(false), &Value::Number(0.0)));
		assert!(!same_value(&Value::text(""), &Value::Null));
	}

	#[test]
	fn test_handle_identity() {
		let a = ObservedArray::from_values(vec![Value::from(1i64)]);
		let b = a.clone();
		let c = ObservedArray::from_values(vec![Value::from(1i64)]);

		assert!(same_value(&Value::Array(a.clone()), &Value::Array(b)));
		assert!(!same_value(&Value::Array(a), &Value::Array(c)));
	}

	#[test]
	fn test_array_length_validation() {
		assert_eq!(Value::Number(3.0).as_array_length(), Some(3));
		assert_eq!(Value::Number(0.0).as_array_length(), Some(0));
		assert_eq!(Value::Number(-1.0).as_array_length(), None);
		assert_eq!(Value::Number(1.5).as_array_length(), None);
		assert_eq!(Value::Number(f64::NAN).as_array_length(), None);
		assert_eq!(Value::Number(f64::INFINITY).as_array_length(), None);
		assert_eq!(Value::text("4").as_array_length(), None);
	}

	#[test]
	fn test_text_equality_is_by_content() {
		let a = Value::text("hello");
		let b = Value::text("hello");
		assert!(same_value(&a, &b));
	}
}
