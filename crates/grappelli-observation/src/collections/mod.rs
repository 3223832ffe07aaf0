//! Observable collections and their structural diffing.
//!
//! Each collection kind is a typed wrapper owning the raw storage. Mutators
//! perform the native mutation and, when the instance has an observer,
//! record an [`IndexMap`] describing the exact structural delta and deliver
//! it to subscribers. Unobserved instances pay a single branch per mutation.

pub mod array;
pub mod index_map;
pub mod length;
pub mod map;
pub mod set;

pub use array::{ArrayIndexObserver, ArrayObserver, ObservedArray};
pub use index_map::{IndexMap, IndexSlot};
pub use length::{CollectionLengthObserver, CollectionSizeObserver};
pub use map::{MapObserver, ObservedMap};
pub use set::{ObservedSet, SetObserver};
