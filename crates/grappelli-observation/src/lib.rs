//! # Grappelli Observation
//!
//! Fine-grained reactive observation engine: tracks which data a computed
//! value or binding depends on, re-evaluates only what changed, and diffs
//! mutable collections into minimal edit scripts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐      get/set       ┌─────────────────────┐
//! │  ObservedObject  │ ◄────────────────► │  property observers  │
//! │  ObservedArray   │                    │  collection observers│
//! │  ObservedMap/Set │                    └──────────┬──────────┘
//! └──────────────────┘                               │ notify
//!          ▲ tracked reads                           ▼
//! ┌────────┴─────────┐    enter/exit      ┌─────────────────────┐
//! │ evaluation stack │ ◄────────────────► │ DependencyRecord     │
//! │    (tracker)     │                    │ (computed / effect)  │
//! └──────────────────┘                    └─────────────────────┘
//! ```
//!
//! ## Key Pieces
//!
//! - [`SubscriberRecord`]: fixed-slot + overflow storage of one
//!   observable's subscribers.
//! - Observable primitives: [`SetterObserver`], [`SetterNotifier`],
//!   [`PrimitiveObserver`], the dirty-check fallback.
//! - Collection wrappers ([`ObservedArray`], [`ObservedMap`],
//!   [`ObservedSet`]) whose mutators record exact [`IndexMap`] edit
//!   scripts.
//! - The thread-local evaluation context stack ([`tracker`]) and the
//!   versioned, self-pruning [`DependencyRecord`].
//! - [`ComputedObserver`] and [`Effect`] consumers.
//! - The [`ObserverLocator`] strategy factory.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use grappelli_observation::{Effect, ObservedObject, ObserverLocator, Value};
//!
//! let locator = ObserverLocator::new();
//! let user = ObservedObject::builder().data("name", "django").build();
//!
//! let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
//! let seen_in_body = Rc::clone(&seen);
//! let source = user.clone();
//! let _effect = Effect::new(&locator, move || {
//! 	seen_in_body.borrow_mut().push(source.get("name")?);
//! 	Ok(())
//! })?;
//!
//! user.set("name", Value::from("stéphane"))?;
//! assert_eq!(seen.borrow().len(), 2);
//! # Ok::<(), grappelli_observation::ObservationError>(())
//! ```

pub mod collections;
pub mod connectable;
pub mod error;
pub mod flags;
pub mod locator;
pub mod object;
pub mod observers;
pub mod subscriber;
pub mod tracker;
pub mod value;

pub use collections::{
	ArrayIndexObserver, ArrayObserver, CollectionLengthObserver, CollectionSizeObserver, IndexMap,
	IndexSlot, MapObserver, ObservedArray, ObservedMap, ObservedSet, SetObserver,
};
pub use connectable::DependencyRecord;
pub use error::{ObservationError, Result};
pub use flags::ChangeFlags;
pub use locator::{NodeObserverLocator, ObservationAdapter, ObserverLocator, PropertyAccessor};
pub use object::{ObjectBuilder, ObservedObject};
pub use observers::{
	ComputedObserver, DEFAULT_MAX_RUN_COUNT, DirtyCheckSettings, DirtyChecker, Effect,
	PrimitiveObserver, ScheduledTask, SetterNotifier, SetterObserver, TickScheduler,
	with_dirty_checker,
};
pub use subscriber::{Observable, Subscriber, SubscriberRecord};
pub use tracker::{PauseGuard, TrackingGuard, begin_tracking, is_connecting, pause_tracking};
pub use value::{Value, same_value, same_value_zero};
