use std::fmt::Debug;
use std::sync::Arc;

use crate::common::EntityKey;
use crate::errors::GeoNearResult;
use crate::geometry::GeoPoint;

/// The kind of change observed on an indexed entity.
///
/// # Variants
/// - `Added`: the key gained a location it did not have before
/// - `Removed`: the key's location was deleted; the event carries the last
///   known location
/// - `Relocated`: the key's location changed, possibly moving it between
///   geohash buckets; subscribers observe this as a single atomic event,
///   never as a remove-then-add pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChangeKind {
    Added,
    Removed,
    Relocated,
}

/// Information about a single location change, delivered to change
/// subscribers whose prefix set matches the entity's old or new geohash.
#[derive(Debug, Clone)]
pub struct StoreChangeInfo {
    key: EntityKey,
    location: GeoPoint,
    kind: StoreChangeKind,
}

impl StoreChangeInfo {
    /// Creates a new change notification.
    pub fn new(key: EntityKey, location: GeoPoint, kind: StoreChangeKind) -> Self {
        StoreChangeInfo {
            key,
            location,
            kind,
        }
    }

    /// The key of the changed entity.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entity's location: the new location for `Added`/`Relocated`, the
    /// last known location for `Removed`.
    pub fn location(&self) -> &GeoPoint {
        &self.location
    }

    /// The kind of change.
    pub fn kind(&self) -> StoreChangeKind {
        self.kind
    }
}

/// A trait for closures that handle store change notifications.
///
/// Automatically implemented for any `Send + Sync` closure taking a
/// [`StoreChangeInfo`] and returning `GeoNearResult<()>`.
pub trait StoreChangeCallback: Send + Sync + Fn(StoreChangeInfo) -> GeoNearResult<()> {}

impl<F> StoreChangeCallback for F where F: Send + Sync + Fn(StoreChangeInfo) -> GeoNearResult<()> {}

/// A listener for location changes, registered against a set of geohash
/// prefixes via `subscribe_changes`.
///
/// Callbacks are invoked synchronously on the mutating thread, in mutation
/// order, so per-key delivery is causal: a `Removed` for a key is never
/// seen before its `Added`. Callbacks must return promptly and must not
/// mutate the store or index from inside the callback.
#[derive(Clone)]
pub struct StoreChangeListener {
    on_change: Arc<dyn StoreChangeCallback>,
}

impl StoreChangeListener {
    /// Creates a new change listener wrapping the provided callback.
    pub fn new(on_change: impl StoreChangeCallback + 'static) -> Self {
        StoreChangeListener {
            on_change: Arc::new(on_change),
        }
    }

    /// Invokes the callback with a change notification.
    pub fn notify(&self, info: StoreChangeInfo) -> GeoNearResult<()> {
        (self.on_change)(info)
    }
}

impl Debug for StoreChangeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreChangeListener").finish()
    }
}

/// Handle returned by `subscribe_changes`, passed back to `unsubscribe` to
/// stop delivery. Deliberately not `Clone`: consuming the handle on
/// unsubscribe makes double-unsubscription unrepresentable.
#[derive(Debug)]
pub struct ChangeSubscription {
    pub(crate) id: u64,
}

impl ChangeSubscription {
    pub(crate) fn new(id: u64) -> Self {
        ChangeSubscription { id }
    }
}
