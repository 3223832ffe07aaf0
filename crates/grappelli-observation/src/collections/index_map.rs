//! Structural delta of one collection mutation.
//!
//! An [`IndexMap`] has one slot per element of the *new* collection state:
//! either the prior index of a surviving element or [`IndexSlot::New`] for an
//! insertion. A side list records the prior indices that no longer have a
//! surviving slot. Downstream consumers use it to apply a minimal sequence of
//! remove/insert/move operations instead of rebuilding.
//!
//! Invariants:
//! 1. `slots.len()` equals the new collection size.
//! 2. Every retained index is a valid prior index and appears at most once.
//! 3. `deleted` contains exactly the prior indices with no surviving slot
//!    that were removed by the operation.

/// One slot of an [`IndexMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexSlot {
	/// The element at this position survived from the given prior index.
	Retained(usize),
	/// The element at this position is newly inserted.
	New,
}

impl IndexSlot {
	/// Prior index of a surviving element, or `None` for an insertion.
	pub fn prior_index(self) -> Option<usize> {
		match self {
			IndexSlot::Retained(i) => Some(i),
			IndexSlot::New => None,
		}
	}
}

/// Minimal edit script between two states of an observed collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMap {
	slots: Vec<IndexSlot>,
	deleted: Vec<usize>,
}

impl IndexMap {
	/// An empty map (empty collection, nothing deleted).
	pub fn new() -> Self {
		Self::default()
	}

	/// The identity map over `len` elements: everything survives in place.
	pub fn identity(len: usize) -> Self {
		Self {
			slots: (0..len).map(IndexSlot::Retained).collect(),
			deleted: Vec::new(),
		}
	}

	pub fn from_parts(slots: Vec<IndexSlot>, deleted: Vec<usize>) -> Self {
		Self { slots, deleted }
	}

	/// Slots of the new collection state, in order.
	pub fn slots(&self) -> &[IndexSlot] {
		&self.slots
	}

	/// Prior indices removed by the operation, in removal order.
	pub fn deleted_items(&self) -> &[usize] {
		&self.deleted
	}

	/// Number of slots (the new collection size).
	pub fn len(&self) -> usize {
		self.slots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	/// Replace the slot at `position` with an insertion, recording the
	/// previously mapped prior index (if any) as deleted.
	pub(crate) fn mark_replaced(&mut self, position: usize) {
		if let Some(prior) = self.slots[position].prior_index() {
			self.deleted.push(prior);
		}
		self.slots[position] = IndexSlot::New;
	}

	/// Verify the structural invariants against a prior collection size.
	/// Used by tests and debug assertions.
	pub fn is_consistent(&self, old_len: usize) -> bool {
		let mut seen = vec![false; old_len];
		for slot in &self.slots {
			if let IndexSlot::Retained(i) = slot {
				if *i >= old_len || seen[*i] {
					return false;
				}
				seen[*i] = true;
			}
		}
		for i in &self.deleted {
			if *i >= old_len || seen[*i] {
				return false;
			}
			seen[*i] = true;
		}
		true
	}
}
