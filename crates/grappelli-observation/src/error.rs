//! Error taxonomy for the observation engine.
//!
//! Every failure in this crate is a local precondition violation surfaced
//! synchronously to the caller. Nothing is retried or swallowed internally:
//! a subscriber that fails during notification aborts the rest of the pass
//! and the error propagates out of the mutating call.

/// Convenience alias used throughout the engine.
pub type Result<T> = core::result::Result<T, ObservationError>;

/// Error type for observation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
	/// Attempted to write through an observer that has no setter
	/// (a computed without a setter, a map/set `size`, a dirty-checked
	/// property).
	#[error("cannot assign to readonly property '{property}'")]
	ReadOnly {
		/// Property or pseudo-property that rejected the write
		property: String,
	},

	/// Structurally invalid write, such as a negative or non-integer
	/// array length.
	#[error("invalid write to '{property}': {reason}")]
	InvalidWrite {
		/// Property that rejected the write
		property: String,
		/// Why the value was rejected
		reason: String,
	},

	/// A consumer was notified without implementing the required handler,
	/// or an unsupported value was handed to a collection-observer factory.
	#[error("{operation} not implemented")]
	NotImplemented {
		/// The missing handler or unsupported operation
		operation: String,
	},

	/// Evaluation context stack misuse: double-enter, exiting a record
	/// that is not current, or similar.
	#[error("invariant violation: {message}")]
	InvariantViolation {
		/// Description of the violated invariant
		message: String,
	},

	/// An effect exceeded its maximum allowed re-run count within one
	/// external trigger.
	#[error("effect exceeded maximum run count of {max_run_count}")]
	RecursiveEffect {
		/// Configured bound that was exceeded
		max_run_count: u32,
	},

	/// `run()` was called on a stopped effect.
	#[error("effect has been stopped and cannot run again")]
	EffectStopped,

	/// Strict dirty-check mode refused to fall back to polling for a
	/// property that cannot be observed any other way.
	#[error("property '{property}' cannot be observed without dirty checking, which is disallowed")]
	DirtyCheckDisallowed {
		/// Property that would have required polling
		property: String,
	},
}

impl ObservationError {
	pub(crate) fn read_only(property: impl Into<String>) -> Self {
		Self::ReadOnly {
			property: property.into(),
		}
	}

	pub(crate) fn invalid_write(property: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidWrite {
			property: property.into(),
			reason: reason.into(),
		}
	}

	pub(crate) fn not_implemented(operation: impl Into<String>) -> Self {
		Self::NotImplemented {
			operation: operation.into(),
		}
	}

	pub(crate) fn invariant(message: impl Into<String>) -> Self {
		Self::InvariantViolation {
			message: message.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_messages() {
		let err = ObservationError::read_only("size");
		assert_eq!(err.to_string(), "cannot assign to readonly property 'size'");

		let err = ObservationError::invalid_write("length", "expected a non-negative integer");
		assert_eq!(
			err.to_string(),
			"invalid write to 'length': expected a non-negative integer"
		);

		let err = ObservationError::not_implemented("handleChange");
		assert_eq!(err.to_string(), "handleChange not implemented");

		let err = ObservationError::RecursiveEffect { max_run_count: 10 };
		assert_eq!(err.to_string(), "effect exceeded maximum run count of 10");
	}
}
