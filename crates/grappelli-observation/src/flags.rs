//! Change-provenance flags carried with every notification.
//!
//! A subscriber registry combines the caller's flags with the "own flags" the
//! registry's owner stored against a subscriber entry. This lets one physical
//! observable notify different subscribers with different provenance: a
//! dependency record subscribes with [`ChangeFlags::UPDATE_TARGET`] so its
//! owner can tell a tracked-dependency notification from a direct one.

use core::fmt;
use core::ops::{BitAnd, BitOr, Not};

/// Bitset describing why a subscriber is being notified.
///
/// The two `UPDATE_*` bits form the update mask: when caller flags and
/// per-subscriber own flags are combined, the caller's update bits are
/// cleared first so the stored provenance wins.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
	/// No provenance information.
	pub const NONE: ChangeFlags = ChangeFlags(0);

	/// The change reaches this subscriber because it tracked the source as
	/// a dependency (the binding-target direction).
	pub const UPDATE_TARGET: ChangeFlags = ChangeFlags(0b0000_0001);

	/// The change originated from the consumer side and is flowing back to
	/// the data source (the binding-source direction).
	pub const UPDATE_SOURCE: ChangeFlags = ChangeFlags(0b0000_0010);

	/// Mask covering both update-direction bits.
	pub const UPDATE_MASK: ChangeFlags = ChangeFlags(0b0000_0011);

	/// The change was detected by the dirty checker's polling tick rather
	/// than an intercepted write.
	pub const FROM_DIRTY_CHECK: ChangeFlags = ChangeFlags(0b0000_0100);

	/// Whether every bit of `other` is set in `self`.
	pub fn contains(self, other: ChangeFlags) -> bool {
		self.0 & other.0 == other.0
	}

	/// Whether no bits are set.
	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Combine caller flags with a subscriber entry's own flags: the
	/// caller's update-direction bits are cleared, then the own flags are
	/// OR-ed in.
	pub fn combined_with(self, own_flags: ChangeFlags) -> ChangeFlags {
		(self & !ChangeFlags::UPDATE_MASK) | own_flags
	}
}

impl BitOr for ChangeFlags {
	type Output = ChangeFlags;

	fn bitor(self, rhs: ChangeFlags) -> ChangeFlags {
		ChangeFlags(self.0 | rhs.0)
	}
}

impl BitAnd for ChangeFlags {
	type Output = ChangeFlags;

	fn bitand(self, rhs: ChangeFlags) -> ChangeFlags {
		ChangeFlags(self.0 & rhs.0)
	}
}

impl Not for ChangeFlags {
	type Output = ChangeFlags;

	fn not(self) -> ChangeFlags {
		ChangeFlags(!self.0)
	}
}

impl fmt::Debug for ChangeFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<&str> = Vec::new();
		if self.contains(ChangeFlags::UPDATE_TARGET) {
			names.push("UPDATE_TARGET");
		}
		if self.contains(ChangeFlags::UPDATE_SOURCE) {
			names.push("UPDATE_SOURCE");
		}
		if self.contains(ChangeFlags::FROM_DIRTY_CHECK) {
			names.push("FROM_DIRTY_CHECK");
		}
		if names.is_empty() {
			write!(f, "ChangeFlags(NONE)")
		} else {
			write!(f, "ChangeFlags({})", names.join(" | "))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_combine_clears_update_mask() {
		let caller = ChangeFlags::UPDATE_SOURCE | ChangeFlags::FROM_DIRTY_CHECK;
		let own = ChangeFlags::UPDATE_TARGET;

		let combined = caller.combined_with(own);
		assert!(combined.contains(ChangeFlags::UPDATE_TARGET));
		assert!(!combined.contains(ChangeFlags::UPDATE_SOURCE));
		assert!(combined.contains(ChangeFlags::FROM_DIRTY_CHECK));
	}

	#[test]
	fn test_combine_with_empty_own_flags() {
		let caller = ChangeFlags::UPDATE_TARGET;
		let combined = caller.combined_with(ChangeFlags::NONE);
		assert!(combined.is_empty());
	}

	#[test]
	fn test_debug_format() {
		assert_eq!(format!("{:?}", ChangeFlags::NONE), "ChangeFlags(NONE)");
		assert_eq!(
			format!("{:?}", ChangeFlags::UPDATE_TARGET | ChangeFlags::FROM_DIRTY_CHECK),
			"ChangeFlags(UPDATE_TARGET | FROM_DIRTY_CHECK)"
		);
	}
}
