//! # Grappelli
//!
//! A fine-grained reactive observation engine for Rust.
//!
//! Grappelli tracks which data a computed value or binding depends on,
//! re-evaluates only what changed, and diffs mutable collections into
//! minimal edit scripts. It is the data-observation half of a UI stack:
//! template compilers, renderers and routers consume it purely through the
//! observable/subscriber contract.
//!
//! ## Core Principles
//!
//! - **Automatic dependency tracking**: reads performed during an
//!   evaluation register themselves; untaken branches are pruned on the
//!   next pass with no bookkeeping from calling code.
//! - **Exact collection diffs**: array/map/set mutations produce index
//!   maps describing exactly which elements survived, moved, were deleted
//!   or are new.
//! - **Pay for what you observe**: unobserved properties and collections
//!   run at plain-storage cost; interception starts with the first
//!   subscriber and stops with the last.
//!
//! ## Example
//!
//! ```
//! use grappelli::{Effect, ObservedObject, ObserverLocator, Value};
//! use std::rc::Rc;
//!
//! let locator = ObserverLocator::new();
//! let profile = ObservedObject::builder()
//! 	.data("first", "Django")
//! 	.data("last", "Reinhardt")
//! 	.build();
//!
//! let rendered = Rc::new(std::cell::RefCell::new(String::new()));
//! let out = Rc::clone(&rendered);
//! let source = profile.clone();
//! let _effect = Effect::new(&locator, move || {
//! 	let first = source.get("first")?;
//! 	let last = source.get("last")?;
//! 	*out.borrow_mut() = format!("{first:?} {last:?}");
//! 	Ok(())
//! })?;
//!
//! profile.set("first", Value::from("Stéphane"))?;
//! assert!(rendered.borrow().contains("Stéphane"));
//! # Ok::<(), grappelli::ObservationError>(())
//! ```

pub use grappelli_observation as observation;

pub use grappelli_observation::{
	ChangeFlags, CollectionLengthObserver, CollectionSizeObserver, ComputedObserver,
	DependencyRecord, DirtyCheckSettings, DirtyChecker, Effect, IndexMap, IndexSlot,
	NodeObserverLocator, Observable, ObservationAdapter, ObservationError, ObservedArray,
	ObservedMap, ObservedObject, ObservedSet, ObserverLocator, PrimitiveObserver,
	PropertyAccessor, Result, ScheduledTask, SetterNotifier, SetterObserver, Subscriber,
	SubscriberRecord, TickScheduler, Value, same_value, same_value_zero, with_dirty_checker,
};
