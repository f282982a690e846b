pub mod event_bus;
pub mod types;

pub use event_bus::{GeoNearEventBus, SubscriberRef};
pub use types::{atomic, get_current_time_or_zero, Atomic, ReadExecutor, WriteExecutor};

/// Opaque unique identifier for a point entity, immutable once assigned.
///
/// The original product identified sightings by stringified numeric ids; the
/// engine treats keys as opaque strings throughout.
pub type EntityKey = String;
