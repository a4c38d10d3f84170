//! Registry module - the engine's shared routing state.
//!
//! Provides:
//! - [`CallbackRegistry`] - sequence ids and one-shot request callbacks
//! - [`SubscriptionRegistry`] - persistent push callbacks by URI
//!
//! Both guard their tables with a lock and hand callbacks back to the caller,
//! who invokes them after the lock is released.

mod callbacks;
mod subscriptions;

pub use callbacks::{CallbackRegistry, ResponseCallback};
pub use subscriptions::{MatchPolicy, PushCallback, SubscriptionRegistry};
