pub mod event;
pub mod memory;

pub use event::{
    ChangeSubscription, StoreChangeCallback, StoreChangeInfo, StoreChangeKind, StoreChangeListener,
};
pub use memory::InMemoryProximityStore;

use indexmap::IndexMap;
use std::ops::Deref;
use std::sync::Arc;

use crate::common::EntityKey;
use crate::errors::GeoNearResult;
use crate::geometry::GeoPoint;

/// Low-level interface to the durable location backend.
///
/// # Purpose
/// Defines the contract every proximity store implementation must follow.
/// The engine owns no persistence format; the shipped product backs this
/// with a live cloud database while tests and stand-alone hosts use the
/// bundled [`InMemoryProximityStore`]. The engine only requires the
/// operations below.
///
/// # Key Responsibilities
/// - **Location CRUD**: put, get, and remove an entity's location by key
/// - **Prefix Scans**: return all entities under a set of geohash prefixes
/// - **Change Notifications**: deliver `Added`/`Removed`/`Relocated` changes
///   to prefix-filtered subscribers with causal per-key ordering
///
/// `scan` and `subscribe_changes` are potentially latent operations: a
/// remote implementation may block on the network, and failures surface to
/// the caller as recoverable `StoreUnavailable` errors. The engine never
/// retries on its own; retry policy belongs to the store or the caller.
///
/// # Thread Safety
/// Implementers must be `Send + Sync` for safe use in concurrent contexts.
pub trait ProximityStoreProvider: Send + Sync {
    /// Stores or replaces the location of an entity.
    ///
    /// # Returns
    /// * `Ok(())` if the location was stored
    /// * `Err(GeoNearError)` if the operation fails
    fn put(&self, key: &str, location: GeoPoint) -> GeoNearResult<()>;

    /// Retrieves the current location of an entity, if any.
    fn get(&self, key: &str) -> GeoNearResult<Option<GeoPoint>>;

    /// Removes the location of an entity.
    ///
    /// # Returns
    /// * `Ok(true)` if a location was removed
    /// * `Ok(false)` if the key had no location
    fn remove(&self, key: &str) -> GeoNearResult<bool>;

    /// Returns every entity whose geohash starts with any of the given
    /// prefixes, with its current location.
    fn scan(&self, prefixes: &[String]) -> GeoNearResult<IndexMap<EntityKey, GeoPoint>>;

    /// Registers a listener for changes under the given prefixes.
    ///
    /// # Returns
    /// * `Ok(ChangeSubscription)` handle used to stop delivery
    /// * `Err(GeoNearError)` if the subscription cannot be established
    fn subscribe_changes(
        &self,
        prefixes: &[String],
        listener: StoreChangeListener,
    ) -> GeoNearResult<ChangeSubscription>;

    /// Drops a change subscription.
    fn unsubscribe(&self, subscription: ChangeSubscription) -> GeoNearResult<()>;

    /// Whether the backend is currently reachable. Remote implementations
    /// override this; the bundled in-memory store is always available.
    fn is_available(&self) -> bool {
        true
    }
}

/// Shareable handle to a proximity store implementation.
///
/// Wraps any [`ProximityStoreProvider`] behind an `Arc` so the engine, its
/// queries, and the hosting application can all hold the same backend.
/// Clones share state.
#[derive(Clone)]
pub struct ProximityStore {
    inner: Arc<dyn ProximityStoreProvider>,
}

impl ProximityStore {
    /// Wraps a provider implementation.
    pub fn new(provider: impl ProximityStoreProvider + 'static) -> Self {
        ProximityStore {
            inner: Arc::new(provider),
        }
    }
}

impl Deref for ProximityStore {
    type Target = dyn ProximityStoreProvider;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::fmt::Debug for ProximityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityStore").finish()
    }
}
