//! Leaf observable implementations and the consumers built on them.

pub mod computed;
pub mod dirty;
pub mod effect;
pub mod notifier;
pub mod primitive;
pub mod setter;

pub use computed::ComputedObserver;
pub use dirty::{
	DirtyCheckSettings, DirtyChecker, ScheduledTask, TickScheduler, with_dirty_checker,
};
pub use effect::{DEFAULT_MAX_RUN_COUNT, Effect};
pub use notifier::SetterNotifier;
pub use primitive::PrimitiveObserver;
pub use setter::SetterObserver;
