use indexmap::IndexMap;
use std::sync::Arc;

use crate::common::EntityKey;
use crate::errors::GeoNearResult;
use crate::geometry::GeoPoint;
use crate::index::SpatialIndex;
use crate::store::event::{ChangeSubscription, StoreChangeListener};
use crate::store::ProximityStoreProvider;

/// In-memory implementation of the proximity store.
///
/// # Purpose
/// `InMemoryProximityStore` backs the store contract with a local
/// [`SpatialIndex`], making the engine usable stand-alone and giving tests
/// a deterministic backend. All data is lost when the last clone is
/// dropped.
///
/// # Characteristics
/// - **Thread-Safe**: clones share the same index across threads
/// - **Synchronous**: scans and notifications never block on I/O
/// - **Always Available**: `is_available` is constantly true
///
/// # Usage
/// ```rust
/// use geonear::geometry::GeoPoint;
/// use geonear::store::{InMemoryProximityStore, ProximityStoreProvider};
///
/// let store = InMemoryProximityStore::new(6).unwrap();
/// store.put("42", GeoPoint::new(0.001, 0.001).unwrap()).unwrap();
/// assert!(store.get("42").unwrap().is_some());
/// ```
#[derive(Clone)]
pub struct InMemoryProximityStore {
    inner: Arc<InMemoryStoreInner>,
}

struct InMemoryStoreInner {
    index: SpatialIndex,
}

impl InMemoryProximityStore {
    /// Creates an empty store indexing locations at the given geohash
    /// precision.
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidPrecision` if the precision is outside the
    /// supported range.
    pub fn new(precision: usize) -> GeoNearResult<Self> {
        Ok(InMemoryProximityStore {
            inner: Arc::new(InMemoryStoreInner {
                index: SpatialIndex::new(precision)?,
            }),
        })
    }

    /// The backing spatial index.
    pub fn index(&self) -> &SpatialIndex {
        &self.inner.index
    }
}

impl ProximityStoreProvider for InMemoryProximityStore {
    fn put(&self, key: &str, location: GeoPoint) -> GeoNearResult<()> {
        self.inner.index.set_location(key, location)
    }

    fn get(&self, key: &str) -> GeoNearResult<Option<GeoPoint>> {
        Ok(self.inner.index.get(key).map(|entry| entry.location().clone()))
    }

    fn remove(&self, key: &str) -> GeoNearResult<bool> {
        self.inner.index.remove_location(key)
    }

    fn scan(&self, prefixes: &[String]) -> GeoNearResult<IndexMap<EntityKey, GeoPoint>> {
        self.inner.index.scan(prefixes)
    }

    fn subscribe_changes(
        &self,
        prefixes: &[String],
        listener: StoreChangeListener,
    ) -> GeoNearResult<ChangeSubscription> {
        self.inner.index.subscribe(prefixes, listener)
    }

    fn unsubscribe(&self, subscription: ChangeSubscription) -> GeoNearResult<()> {
        self.inner.index.unsubscribe(subscription)
    }
}
